//! # genflow
//!
//! Generation orchestration core for content backends.
//!
//! - **Providers**: interchangeable generation backends behind one [`Provider`] trait
//! - **Fallback chains**: ordered providers, first success wins, last error reported
//! - **Orchestration**: named jobs run concurrently with per-job failure isolation
//! - **Fan-out**: fixed batches of identical attempts reduced to "at least one succeeded"
//! - **Content suite**: titles, description, timestamps and thumbnails in one run, plus comment replies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genflow::{FallbackChain, FnProvider, GenerationRequest, Job, JobOutput, Orchestrator};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let chain = FallbackChain::new(vec![
//!         FnProvider::new("primary", |_req| async { Ok(json!({ "titles": ["Hello"] })) }).shared(),
//!     ])?;
//!
//!     let mut orchestrator = Orchestrator::new();
//!     orchestrator.add_job(Job::with_input("titles", chain, |chain| async move {
//!         let success = chain.run(&GenerationRequest::new("", "transcript")).await?;
//!         Ok(JobOutput::succeeded("done").with_payload(success.output))
//!     }))?;
//!
//!     let result = orchestrator.run().await?;
//!     println!("{}", result.message);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod content;
pub mod error;
pub mod fallback;
pub mod fanout;
pub mod image;
pub mod job;
pub mod logging;
pub mod openai_compat;
pub mod orchestrator;
pub mod provider;

// Re-exports for convenience
pub use config::{ContentConfig, GenflowConfig, LoggingConfig, OrchestrationConfig};
pub use content::replies::{Comment, GeneratedReply};
pub use content::{AllInOneReport, ContentSuite, VideoContext};
pub use error::{AttemptFailure, Error, Result};
pub use fallback::{ChainSuccess, FallbackChain, DEFAULT_ATTEMPT_DELAY};
pub use fanout::{FanOutReport, SubAttemptResult, SubFanOut, DEFAULT_FAN_OUT};
pub use image::{ImageUrlConfig, ImageUrlProvider};
pub use job::{Job, JobOutput, JobResult};
pub use logging::init_tracing;
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use orchestrator::{OrchestrationResult, Orchestrator, SuccessPolicy};
pub use provider::{FnProvider, GenerationRequest, Provider, SharedProvider};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::fallback::FallbackChain;
    pub use crate::fanout::SubFanOut;
    pub use crate::job::{Job, JobOutput, JobResult};
    pub use crate::orchestrator::{OrchestrationResult, Orchestrator};
    pub use crate::provider::{GenerationRequest, Provider};
}
