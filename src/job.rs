//! Job descriptors and per-job results
//!
//! A [`Job`] is a name plus a deferred async function. Settling a job never
//! fails: errors, panics and deadline overruns all become a [`JobResult`] with
//! `success == false`.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

/// What a job function reports when it returns normally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Whether the job produced a usable result
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Structured result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error text when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutput {
    /// Successful output
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
            error: None,
        }
    }

    /// Failed output; the message doubles as the error text
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(message.clone()),
            message,
            payload: None,
        }
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Outcome of one job, always produced even on total failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job name
    pub name: String,
    /// Whether the job succeeded
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Structured result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error text for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Build from the output a job returned
    pub fn from_output(name: impl Into<String>, output: JobOutput) -> Self {
        Self {
            name: name.into(),
            success: output.success,
            message: output.message,
            payload: output.payload,
            error: output.error,
        }
    }

    /// Failed result for a job that errored, panicked or overran its deadline
    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        let name = name.into();
        let error = error.into();
        Self {
            message: format!("{name} failed: {error}"),
            name,
            success: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Error text, falling back to the message for failures that carry none
    pub fn error_text(&self) -> Option<&str> {
        if self.success {
            return None;
        }
        Some(self.error.as_deref().unwrap_or(&self.message))
    }

    /// Payload of a successful job, or [`Error::Job`] for a failed one
    pub fn into_payload(self) -> Result<Option<serde_json::Value>> {
        if self.success {
            Ok(self.payload)
        } else {
            let message = self.error.unwrap_or(self.message);
            Err(Error::job(self.name, message))
        }
    }
}

/// Boxed job future
pub type JobFuture = BoxFuture<'static, anyhow::Result<JobOutput>>;

/// A named, deferred unit of orchestrated work
pub struct Job {
    name: String,
    timeout: Option<Duration>,
    task: Box<dyn FnOnce() -> JobFuture + Send>,
}

impl Job {
    /// Create a job from a zero-argument async function
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: None,
            // keep the call inside the future so a panicking body is caught on poll
            task: Box::new(move || Box::pin(async move { f().await })),
        }
    }

    /// Create a job from an input payload and a function consuming it
    pub fn with_input<I, F, Fut>(name: impl Into<String>, input: I, f: F) -> Self
    where
        I: Send + 'static,
        F: FnOnce(I) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
    {
        Self::new(name, move || f(input))
    }

    /// Bound the job's run time
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run this job on its own with failure isolation
    pub async fn execute(self) -> JobResult {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        self.settle(deadline).await
    }

    /// Run to completion, converting every failure mode into a result
    pub(crate) async fn settle(self, deadline: Option<Instant>) -> JobResult {
        let Job { name, task, .. } = self;
        let started = Instant::now();
        tracing::info!(job = %name, "Starting job");

        let guarded = AssertUnwindSafe(task()).catch_unwind();
        let outcome = match deadline {
            Some(at) => match tokio::time::timeout_at(at, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let err = Error::timeout(format!("job {name} did not finish before its deadline"));
                    tracing::error!(job = %name, error = %err, "Job timed out");
                    return JobResult::failure(name, err.to_string());
                }
            },
            None => guarded.await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(output)) => {
                if output.success {
                    tracing::info!(job = %name, elapsed_ms, "Job completed");
                } else {
                    tracing::warn!(job = %name, elapsed_ms, message = %output.message, "Job reported failure");
                }
                JobResult::from_output(name, output)
            }
            Ok(Err(err)) => {
                let error = format!("{err:#}");
                tracing::error!(job = %name, elapsed_ms, error = %error, "Job failed");
                JobResult::failure(name, error)
            }
            Err(panic) => {
                let message = format!("panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(job = %name, elapsed_ms, error = %message, "Job panicked");
                JobResult::failure(name, message)
            }
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
