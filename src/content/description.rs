//! Description generation job
//!
//! The rendered description is laid out as keywords, a summary section, the
//! channel footer and a tags section, with inline markdown removed and the
//! result capped at [`MAX_DESCRIPTION_CHARS`].

use super::{truncate_chars, VideoContext};
use crate::fallback::FallbackChain;
use crate::job::JobOutput;
use crate::provider::GenerationRequest;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, OnceLock};

/// Job name
pub const JOB_NAME: &str = "description";

/// Longest rendered description, below the platform limit of 5000
pub const MAX_DESCRIPTION_CHARS: usize = 4900;

/// Footer placed between the summary and the tags when none is configured
pub const DEFAULT_FOOTER: &str = "🔔 Subscribe for more educational content!
👍 Like this video if it helped you
💬 Comment below with your questions
📱 Follow us on social media for updates

#Education #Learning #Tutorial";

const RULE_WIDTH: usize = 50;

pub(crate) const INSTRUCTIONS: &str = "You summarize YouTube videos for their description box. \
Respond with a JSON object {\"summary\": string, \"hashtags\": [string], \"keywords\": [string]}.";

/// Structured provider output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionOutput {
    /// Summary paragraph
    #[serde(alias = "summary_of_the_video")]
    pub summary: String,
    /// Topic hashtags
    #[serde(default, alias = "topics_as_hastages", alias = "topics_as_hashtags")]
    pub hashtags: Vec<String>,
    /// SEO keywords
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl DescriptionOutput {
    /// Hashtags with a single leading `#` and no inner spaces
    pub fn tags(&self) -> Vec<String> {
        self.hashtags
            .iter()
            .map(|t| t.trim().trim_start_matches('#').replace(' ', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("#{t}"))
            .collect()
    }

    /// Render the description text around `footer`
    pub fn render(&self, footer: &str) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut parts: Vec<String> = Vec::new();

        let keywords: Vec<&str> = self.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()).collect();
        if !keywords.is_empty() {
            parts.push(keywords.join(" "));
            parts.push(String::new());
        }

        let summary = self.summary.trim();
        if !summary.is_empty() {
            parts.push("📚 VIDEO SUMMARY".to_string());
            parts.push(rule.clone());
            parts.push(summary.to_string());
            parts.push(String::new());
        }

        let footer = footer.trim();
        if !footer.is_empty() {
            parts.push(footer.to_string());
            parts.push(String::new());
        }

        let tags = self.tags();
        if !tags.is_empty() {
            parts.push("🏷️ TAGS".to_string());
            parts.push(rule);
            parts.push(tags.join(" "));
        }

        let cleaned = strip_markdown(&parts.join("\n"));
        truncate_chars(cleaned.trim(), MAX_DESCRIPTION_CHARS)
    }
}

fn markdown_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"\*\*(.*?)\*\*", "$1"),
            (r"\*(.*?)\*", "$1"),
            (r"`(.*?)`", "$1"),
            (r"\[(.*?)\]\(.*?\)", "$1"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid markdown regex"), replacement))
        .collect()
    })
}

/// Remove inline bold, italics, code and links; headings and `#` tags stay
pub fn strip_markdown(text: &str) -> String {
    markdown_patterns()
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// Request sent to the text providers
pub fn request(ctx: &VideoContext) -> GenerationRequest {
    GenerationRequest::new(
        INSTRUCTIONS,
        format!("Summarize the following YouTube video transcript: {}", ctx.transcript()),
    )
    .with_temperature(0.7)
}

/// Generate a description through the text chain
pub async fn generate(chain: FallbackChain, footer: Arc<str>, ctx: Arc<VideoContext>) -> anyhow::Result<JobOutput> {
    let success = chain
        .run_as::<DescriptionOutput>(&request(&ctx))
        .await
        .context("Description generation failed")?;

    let output = success.output;
    anyhow::ensure!(
        !output.summary.trim().is_empty(),
        "Description generation failed: {} returned an empty summary",
        success.provider
    );

    Ok(JobOutput::succeeded("Description generated").with_payload(json!({
        "description": output.render(&footer),
        "summary": output.summary.trim(),
        "hashtags": output.tags(),
        "keywords": output.keywords,
        "provider": success.provider,
    })))
}
