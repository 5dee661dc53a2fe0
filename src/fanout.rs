//! Homogeneous concurrent sub-attempts
//!
//! [`SubFanOut`] launches a fixed number of identical attempts at once, waits
//! for every one of them and reduces the batch to "at least one succeeded".

use crate::error::{Error, Result};
use crate::job::{panic_message, JobOutput};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Attempts per fan-out unless configured otherwise
pub const DEFAULT_FAN_OUT: usize = 5;

/// Outcome of one sub-attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAttemptResult {
    /// 1-based attempt id
    pub attempt_id: usize,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Attempt output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error text for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubAttemptResult {
    /// Successful attempt
    pub fn succeeded(attempt_id: usize, payload: serde_json::Value) -> Self {
        Self {
            attempt_id,
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed attempt
    pub fn failed(attempt_id: usize, error: impl Into<String>) -> Self {
        Self {
            attempt_id,
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Reduced outcome of a fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutReport {
    /// Every attempt, ordered by attempt id
    pub attempts: Vec<SubAttemptResult>,
    /// Number of successful attempts
    pub succeeded: usize,
}

impl FanOutReport {
    /// Build a report, sorting attempts by id
    pub fn new(mut attempts: Vec<SubAttemptResult>) -> Self {
        attempts.sort_by_key(|a| a.attempt_id);
        let succeeded = attempts.iter().filter(|a| a.success).count();
        Self { attempts, succeeded }
    }

    /// At least one attempt succeeded
    pub fn success(&self) -> bool {
        self.succeeded > 0
    }

    /// `"{succeeded}/{total} succeeded"`
    pub fn message(&self) -> String {
        format!("{}/{} succeeded", self.succeeded, self.attempts.len())
    }

    /// Look up an attempt by id
    pub fn attempt(&self, attempt_id: usize) -> Option<&SubAttemptResult> {
        self.attempts.iter().find(|a| a.attempt_id == attempt_id)
    }

    /// Reduce to a job output whose payload is the ordered attempt list
    pub fn into_job_output(self) -> Result<JobOutput> {
        let payload = serde_json::to_value(&self.attempts)?;
        Ok(self.reduce(payload))
    }

    /// Reduce to a job output, rendering each attempt with `entry`.
    ///
    /// The payload keeps one entry per attempt in attempt id order.
    pub fn into_job_output_with<F>(self, entry: F) -> JobOutput
    where
        F: Fn(&SubAttemptResult) -> serde_json::Value,
    {
        let payload = serde_json::Value::Array(self.attempts.iter().map(entry).collect());
        self.reduce(payload)
    }

    fn reduce(&self, payload: serde_json::Value) -> JobOutput {
        let message = self.message();
        let output = if self.success() {
            JobOutput::succeeded(message)
        } else {
            let last = self
                .attempts
                .iter()
                .rev()
                .find_map(|a| a.error.as_deref())
                .unwrap_or("no attempts ran");
            JobOutput {
                success: false,
                message,
                payload: None,
                error: Some(format!("no attempt succeeded. Last error: {last}")),
            }
        };
        output.with_payload(payload)
    }
}

/// Fixed-size batch of concurrent, independent attempts
#[derive(Debug, Clone)]
pub struct SubFanOut {
    count: usize,
    attempt_timeout: Option<Duration>,
}

impl Default for SubFanOut {
    fn default() -> Self {
        Self {
            count: DEFAULT_FAN_OUT,
            attempt_timeout: None,
        }
    }
}

impl SubFanOut {
    /// Create a fan-out of `count` attempts
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::config("fan-out requires at least one attempt"));
        }
        Ok(Self {
            count,
            attempt_timeout: None,
        })
    }

    /// Bound every attempt
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Number of attempts
    pub fn count(&self) -> usize {
        self.count
    }

    /// Run all attempts concurrently and wait for every one of them.
    ///
    /// `attempt` receives the 1-based attempt id. Errors, panics and timeouts
    /// are converted into failed [`SubAttemptResult`]s.
    pub async fn run<F, Fut>(&self, attempt: F) -> FanOutReport
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = anyhow::Result<serde_json::Value>>,
    {
        let total = self.count;
        let attempt = &attempt;
        let attempts = (1..=total).map(|attempt_id| {
            let fut = AssertUnwindSafe(async move { attempt(attempt_id).await }).catch_unwind();
            async move {
                let outcome = match self.attempt_timeout {
                    Some(limit) => match tokio::time::timeout(limit, fut).await {
                        Ok(outcome) => outcome,
                        Err(_) => Ok(Err(anyhow::Error::new(Error::timeout(format!(
                            "attempt {attempt_id} did not finish within {limit:?}"
                        ))))),
                    },
                    None => fut.await,
                };

                match outcome {
                    Ok(Ok(payload)) => {
                        tracing::info!(attempt_id, total, "Sub-attempt succeeded");
                        SubAttemptResult::succeeded(attempt_id, payload)
                    }
                    Ok(Err(err)) => {
                        let error = format!("{err:#}");
                        tracing::warn!(attempt_id, total, error = %error, "Sub-attempt failed");
                        SubAttemptResult::failed(attempt_id, error)
                    }
                    Err(panic) => {
                        let error = format!("panicked: {}", panic_message(panic.as_ref()));
                        tracing::warn!(attempt_id, total, error = %error, "Sub-attempt panicked");
                        SubAttemptResult::failed(attempt_id, error)
                    }
                }
            }
        });

        let report = FanOutReport::new(join_all(attempts).await);
        tracing::info!(succeeded = report.succeeded, total, "Fan-out settled");
        report
    }
}
