//! Thumbnail generation job
//!
//! Each fan-out attempt runs two chains in sequence: the text chain writes a
//! detailed image prompt, then the image chain renders it. The job payload
//! has one `{thumbnail_id, image_url, prompt, provider, success, error}` entry
//! per attempt.

use super::VideoContext;
use crate::fallback::FallbackChain;
use crate::fanout::{SubAttemptResult, SubFanOut};
use crate::job::JobOutput;
use crate::provider::GenerationRequest;
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Job name
pub const JOB_NAME: &str = "thumbnails";

/// Transcript characters included in the prompt request
pub const PROMPT_EXCERPT_CHARS: usize = 2000;

pub(crate) const PROMPT_INSTRUCTIONS: &str = "You write image-generation prompts for YouTube thumbnails. \
Describe exactly one striking thumbnail in 150-250 words: subject, visual style, color palette, lighting, \
background, composition and materials. Prefer symbols and icons over text; use at most one or two short \
words. Respond with a JSON object {\"prompt\": string}.";

/// Image prompt written by a text provider
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailPrompt {
    /// Prompt text
    #[serde(alias = "thumbnail_prompt")]
    pub prompt: PromptText,
}

/// Prompt given directly or wrapped in `{"prompt": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptText {
    /// Plain string
    Text(String),
    /// Nested object
    Wrapped {
        /// Prompt text
        prompt: String,
    },
}

impl ThumbnailPrompt {
    /// Trimmed prompt text
    pub fn text(&self) -> &str {
        match &self.prompt {
            PromptText::Text(text) | PromptText::Wrapped { prompt: text } => text.trim(),
        }
    }
}

/// Structured image provider output
#[derive(Debug, Clone, Deserialize)]
pub struct ImageOutput {
    /// Rendered image location
    pub image_url: String,
}

/// Request sent to the text providers for one image prompt
pub fn prompt_request(ctx: &VideoContext) -> GenerationRequest {
    let excerpt: String = ctx.transcript().chars().take(PROMPT_EXCERPT_CHARS).collect();
    GenerationRequest::new(
        PROMPT_INSTRUCTIONS,
        format!("Write one detailed, eye-catching thumbnail prompt for the video: {excerpt}"),
    )
    .with_temperature(0.7)
}

/// Request sent to the image providers
pub fn image_request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new("", prompt)
}

async fn attempt(text: &FallbackChain, images: &FallbackChain, request: &GenerationRequest) -> anyhow::Result<Value> {
    let written = text
        .run_as::<ThumbnailPrompt>(request)
        .await
        .context("Thumbnail prompt generation failed")?;
    let prompt = written.output.text();
    anyhow::ensure!(!prompt.is_empty(), "{} returned an empty thumbnail prompt", written.provider);

    let rendered = images
        .run_as::<ImageOutput>(&image_request(prompt))
        .await
        .context("Thumbnail image generation failed")?;

    Ok(json!({
        "image_url": rendered.output.image_url,
        "prompt": prompt,
        "provider": rendered.provider,
    }))
}

fn entry(attempt: &SubAttemptResult) -> Value {
    let field = |key: &str| {
        attempt
            .payload
            .as_ref()
            .and_then(|p| p.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    };
    json!({
        "thumbnail_id": attempt.attempt_id,
        "image_url": field("image_url"),
        "prompt": field("prompt"),
        "provider": field("provider"),
        "success": attempt.success,
        "error": attempt.error,
    })
}

/// Generate thumbnails; every fan-out attempt writes its own prompt and renders it
pub async fn generate(
    text: FallbackChain,
    images: FallbackChain,
    fan_out: SubFanOut,
    ctx: Arc<VideoContext>,
) -> anyhow::Result<JobOutput> {
    let request = prompt_request(&ctx);
    tracing::info!(count = fan_out.count(), "Generating thumbnails");

    let report = fan_out
        .run(|thumbnail_id| {
            let (text, images, request) = (&text, &images, &request);
            async move {
                tracing::debug!(thumbnail_id, "Generating thumbnail");
                attempt(text, images, request).await
            }
        })
        .await;

    Ok(report.into_job_output_with(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::provider::FnProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn chain(providers: Vec<crate::provider::SharedProvider>) -> FallbackChain {
        FallbackChain::new(providers).unwrap().with_delay(Duration::ZERO)
    }

    #[test]
    fn prompt_request_uses_bounded_excerpt() {
        let ctx = VideoContext::new("v").with_transcript("é".repeat(5000));
        let req = prompt_request(&ctx);
        assert_eq!(req.prompt.matches('é').count(), PROMPT_EXCERPT_CHARS);
        assert_eq!(req.instructions, PROMPT_INSTRUCTIONS);
    }

    #[test]
    fn accepts_flat_and_nested_prompts() {
        let flat: ThumbnailPrompt = serde_json::from_value(json!({ "prompt": " neon crab " })).unwrap();
        assert_eq!(flat.text(), "neon crab");

        let nested: ThumbnailPrompt =
            serde_json::from_value(json!({ "thumbnail_prompt": { "prompt": "glass gears" } })).unwrap();
        assert_eq!(nested.text(), "glass gears");
    }

    #[tokio::test]
    async fn every_attempt_writes_a_prompt_then_renders_it() {
        let prompts = Arc::new(AtomicUsize::new(0));
        let renders = Arc::new(AtomicUsize::new(0));

        let writer = {
            let prompts = Arc::clone(&prompts);
            FnProvider::new("writer", move |_req| {
                let n = prompts.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(json!({ "prompt": format!("scene {n}") })) }
            })
            .shared()
        };
        let painter = {
            let renders = Arc::clone(&renders);
            FnProvider::new("painter", move |req: GenerationRequest| {
                renders.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!({ "image_url": format!("https://img.example.com/{}", req.prompt) })) }
            })
            .shared()
        };

        let output = generate(
            chain(vec![writer]),
            chain(vec![painter]),
            SubFanOut::default(),
            Arc::new(VideoContext::new("v")),
        )
        .await
        .unwrap();

        assert_eq!(prompts.load(Ordering::SeqCst), 5);
        assert_eq!(renders.load(Ordering::SeqCst), 5);
        assert!(output.success);
        assert_eq!(output.message, "5/5 succeeded");

        let entries = output.payload.unwrap();
        let first = &entries[0];
        assert_eq!(first["thumbnail_id"], 1);
        assert_eq!(first["success"], true);
        assert_eq!(first["provider"], "painter");
        assert!(first["image_url"].as_str().unwrap().starts_with("https://img.example.com/scene "));
        assert_eq!(first["error"], Value::Null);
    }

    #[tokio::test]
    async fn failed_prompt_skips_the_image_chain() {
        let renders = Arc::new(AtomicUsize::new(0));
        let writer = FnProvider::new("writer", |_req| async { Err(Error::provider("writer", "overloaded")) }).shared();
        let painter = {
            let renders = Arc::clone(&renders);
            FnProvider::new("painter", move |_req| {
                renders.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!({ "image_url": "https://img.example.com/x" })) }
            })
            .shared()
        };

        let output = generate(
            chain(vec![writer]),
            chain(vec![painter]),
            SubFanOut::new(2).unwrap(),
            Arc::new(VideoContext::new("v")),
        )
        .await
        .unwrap();

        assert!(!output.success);
        assert_eq!(renders.load(Ordering::SeqCst), 0);
        let entries = output.payload.unwrap();
        assert_eq!(entries[1]["thumbnail_id"], 2);
        assert_eq!(entries[1]["image_url"], Value::Null);
        assert!(entries[1]["error"]
            .as_str()
            .unwrap()
            .starts_with("Thumbnail prompt generation failed"));
    }
}
