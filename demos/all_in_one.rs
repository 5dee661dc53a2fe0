//! All-in-one generation for one video
//!
//! Usage: `cargo run --example all_in_one -- <config.toml> <video_id> [transcript.txt]`

use genflow::prelude::*;
use genflow::{init_tracing, ContentSuite, GenflowConfig, VideoContext};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next();
    let video_id = args.next().unwrap_or_else(|| "demo-video".to_string());
    let transcript = match args.next() {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };

    let config = GenflowConfig::load(config_path.as_deref().map(Path::new))?;
    init_tracing(&config.logging)?;

    println!("=== genflow all-in-one ===\n");
    let suite = ContentSuite::from_config(&config)?;
    println!("✓ Providers loaded");

    let mut ctx = VideoContext::new(video_id);
    if let Some(transcript) = transcript {
        ctx = ctx.with_transcript(transcript);
    }

    let report = suite.all_in_one(ctx).await?;
    println!("\n{}\n", report.message);

    for result in &report.orchestration.results {
        let status = if result.success { "✅" } else { "❌" };
        println!("{status} {}: {}", result.name, result.message);
        if let Some(error) = result.error_text() {
            println!("   error: {error}");
        }
    }

    println!("\n📊 Statistics:");
    println!("  - Completed: {}/{}", report.orchestration.completed_tasks, report.orchestration.total_tasks);
    println!("  - Elapsed: {:.2}s", report.orchestration.elapsed_seconds);
    println!("\n{}", serde_json::to_string_pretty(&report)?);

    if !report.success() {
        return Err(Error::Orchestration(report.message).into());
    }
    Ok(())
}
