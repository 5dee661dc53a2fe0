//! All-in-one content generation
//!
//! Four independent jobs run in one orchestration:
//!
//! - **titles**: text chain, `{"titles": [...]}`
//! - **description**: text chain, summary with hashtags and keywords
//! - **timestamps**: text chain, normalised `MM:SS` chapter markers
//! - **thumbnails**: fan-out of prompt-then-image runs, at least one must succeed
//!
//! [`ContentSuite::replies`] drafts comment replies on the same text chain.
//!
//! # Example
//!
//! ```rust,ignore
//! use genflow::content::{ContentSuite, VideoContext};
//!
//! let config = GenflowConfig::load(Some(Path::new("genflow.toml")))?;
//! let suite = ContentSuite::from_config(&config)?;
//! let report = suite
//!     .all_in_one(VideoContext::new("dQw4w9WgXcQ").with_transcript(transcript))
//!     .await?;
//! println!("{}", report.message);
//! ```

pub mod description;
pub mod replies;
pub mod thumbnails;
pub mod timestamps;
pub mod titles;

use crate::config::GenflowConfig;
use crate::error::Result;
use crate::fallback::FallbackChain;
use crate::fanout::SubFanOut;
use crate::job::Job;
use crate::orchestrator::{OrchestrationResult, Orchestrator, SuccessPolicy};
use replies::{Comment, GeneratedReply};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Stand-in used when a video has no transcript
pub const NO_TRANSCRIPT: &str = "No transcript available";

/// Input shared by every job of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoContext {
    /// Video identifier
    pub video_id: String,
    /// Transcript text
    #[serde(default)]
    pub transcript: Option<String>,
    /// Extra instructions from the user
    #[serde(default)]
    pub user_requirements: Option<String>,
}

impl VideoContext {
    /// Create a context without transcript
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            transcript: None,
            user_requirements: None,
        }
    }

    /// Set the transcript
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    /// Set user requirements
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.user_requirements = Some(requirements.into());
        self
    }

    /// Transcript, or [`NO_TRANSCRIPT`] when missing or blank
    pub fn transcript(&self) -> &str {
        self.transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_TRANSCRIPT)
    }

    /// Non-blank user requirements
    pub fn user_requirements(&self) -> Option<&str> {
        self.user_requirements
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Outcome of an all-in-one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllInOneReport {
    /// Video the run was for
    pub video_id: String,
    /// `"All-in-one processing completed: ..."` summary
    pub message: String,
    /// Aggregated job outcomes
    pub orchestration: OrchestrationResult,
}

impl AllInOneReport {
    /// Wrap an orchestration result for one video
    pub fn new(video_id: impl Into<String>, orchestration: OrchestrationResult) -> Self {
        Self {
            video_id: video_id.into(),
            message: format!("All-in-one processing completed: {}", orchestration.message),
            orchestration,
        }
    }

    /// Overall success under the suite's policy
    pub fn success(&self) -> bool {
        self.orchestration.overall_success
    }
}

/// Provider chains and run settings for all-in-one generation
#[derive(Debug, Clone)]
pub struct ContentSuite {
    text: FallbackChain,
    images: FallbackChain,
    fan_out: SubFanOut,
    footer: Arc<str>,
    policy: SuccessPolicy,
    job_timeout: Option<Duration>,
    deadline: Option<Duration>,
}

impl ContentSuite {
    /// Create a suite from a text chain and an image chain
    pub fn new(text: FallbackChain, images: FallbackChain) -> Self {
        Self {
            text,
            images,
            fan_out: SubFanOut::default(),
            footer: Arc::from(description::DEFAULT_FOOTER),
            policy: SuccessPolicy::default(),
            job_timeout: None,
            deadline: None,
        }
    }

    /// Build chains and settings from configuration
    pub fn from_config(config: &GenflowConfig) -> Result<Self> {
        let orchestration = &config.orchestration;
        let mut suite = Self::new(config.text_chain()?, config.image_chain()?)
            .with_fan_out(SubFanOut::new(orchestration.thumbnail_count)?)
            .with_policy(orchestration.success_policy);
        if let Some(footer) = &config.content.description_footer {
            suite = suite.with_description_footer(footer.as_str());
        }
        suite.job_timeout = orchestration.job_timeout();
        suite.deadline = orchestration.deadline();
        Ok(suite)
    }

    /// Set the thumbnail fan-out
    pub fn with_fan_out(mut self, fan_out: SubFanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Set the footer placed in every rendered description
    pub fn with_description_footer(mut self, footer: impl Into<Arc<str>>) -> Self {
        self.footer = footer.into();
        self
    }

    /// Set the success policy
    pub fn with_policy(mut self, policy: SuccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-job timeout
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Set the whole-run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Job descriptors for one video, in submission order
    pub fn jobs(&self, ctx: VideoContext) -> Vec<Job> {
        let ctx = Arc::new(ctx);
        vec![
            Job::with_input(titles::JOB_NAME, (self.text.clone(), Arc::clone(&ctx)), |(chain, ctx)| {
                titles::generate(chain, ctx)
            }),
            Job::with_input(
                description::JOB_NAME,
                (self.text.clone(), Arc::clone(&self.footer), Arc::clone(&ctx)),
                |(chain, footer, ctx)| description::generate(chain, footer, ctx),
            ),
            Job::with_input(timestamps::JOB_NAME, (self.text.clone(), Arc::clone(&ctx)), |(chain, ctx)| {
                timestamps::generate(chain, ctx)
            }),
            Job::with_input(
                thumbnails::JOB_NAME,
                (self.text.clone(), self.images.clone(), self.fan_out.clone(), ctx),
                |(text, images, fan_out, ctx)| thumbnails::generate(text, images, fan_out, ctx),
            ),
        ]
    }

    /// Orchestrator loaded with every job for one video
    pub fn orchestrator(&self, ctx: VideoContext) -> Result<Orchestrator> {
        let mut orchestrator = Orchestrator::from_jobs(self.jobs(ctx))?.with_policy(self.policy);
        if let Some(timeout) = self.job_timeout {
            orchestrator = orchestrator.with_job_timeout(timeout);
        }
        if let Some(deadline) = self.deadline {
            orchestrator = orchestrator.with_deadline(deadline);
        }
        Ok(orchestrator)
    }

    /// Run all generation jobs for one video concurrently
    pub async fn all_in_one(&self, ctx: VideoContext) -> Result<AllInOneReport> {
        let video_id = ctx.video_id.clone();
        tracing::info!(video_id = %video_id, "Starting all-in-one processing");

        let orchestration = self.orchestrator(ctx)?.run().await?;
        let report = AllInOneReport::new(video_id, orchestration);
        tracing::info!(video_id = %report.video_id, "{}", report.message);
        Ok(report)
    }

    /// Draft one reply per comment on the text chain
    pub async fn replies(&self, comments: &[Comment]) -> Result<Vec<GeneratedReply>> {
        replies::generate(&self.text, comments).await
    }
}

/// First `max` characters of `text`
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
