//! Title generation job

use super::VideoContext;
use crate::fallback::FallbackChain;
use crate::job::JobOutput;
use crate::provider::GenerationRequest;
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Job name
pub const JOB_NAME: &str = "titles";

/// Titles longer than this many characters are dropped
pub const MAX_TITLE_CHARS: usize = 80;

pub(crate) const INSTRUCTIONS: &str = "You are a YouTube title generator for educational content. \
Respond with a JSON object {\"titles\": [...]} holding 10 distinct English titles, each under 80 characters.";

/// Structured provider output
#[derive(Debug, Clone, Deserialize)]
pub struct TitleOutput {
    /// Candidate titles
    pub titles: Vec<String>,
}

/// Request sent to the text providers
pub fn request(ctx: &VideoContext) -> GenerationRequest {
    let mut prompt = format!(
        "Generate the title of the YouTube video for the following transcript: {}",
        ctx.transcript()
    );
    if let Some(requirements) = ctx.user_requirements() {
        prompt.push_str(&format!("\n\nAdditional requirements: {requirements}"));
    }
    GenerationRequest::new(INSTRUCTIONS, prompt).with_temperature(0.5)
}

/// Trim, drop empty and overlong entries, dedupe keeping first occurrence
pub fn clean_titles(titles: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    titles
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TITLE_CHARS)
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// Generate titles through the text chain
pub async fn generate(chain: FallbackChain, ctx: Arc<VideoContext>) -> anyhow::Result<JobOutput> {
    let success = chain
        .run_as::<TitleOutput>(&request(&ctx))
        .await
        .context("Title generation failed")?;

    let titles = clean_titles(success.output.titles);
    anyhow::ensure!(!titles.is_empty(), "Title generation failed: {} returned no usable titles", success.provider);

    Ok(JobOutput::succeeded(format!("Generated {} titles", titles.len()))
        .with_payload(json!({ "titles": titles, "provider": success.provider })))
}
