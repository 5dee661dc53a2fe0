//! Concurrent job orchestration
//!
//! All submitted jobs are launched together and awaited with
//! [`futures::future::join_all`]. Each job settles into its own
//! [`JobResult`]; no job can cancel or block a sibling. The aggregate is an
//! [`OrchestrationResult`] whose result list keeps submission order.

use crate::error::{Error, Result};
use crate::job::{Job, JobResult};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// How the overall success flag is derived from per-job outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// At least one job ran and none failed
    #[default]
    AllSucceeded,
    /// At least one job succeeded
    AnySucceeded,
}

impl SuccessPolicy {
    /// Evaluate the policy for the given counts
    pub fn evaluate(self, completed: usize, failed: usize) -> bool {
        match self {
            Self::AllSucceeded => completed > 0 && failed == 0,
            Self::AnySucceeded => completed > 0,
        }
    }
}

/// Aggregate outcome of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Run identifier used in logs
    pub run_id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Per-job results keyed by name, in submission order
    #[serde(with = "ordered_results")]
    pub results: Vec<JobResult>,
    /// Number of submitted jobs
    pub total_tasks: usize,
    /// Jobs that succeeded
    pub completed_tasks: usize,
    /// Jobs that failed
    pub failed_tasks: usize,
    /// Outcome under the configured [`SuccessPolicy`]
    pub overall_success: bool,
    /// Seconds from start until the last job settled
    pub elapsed_seconds: f64,
    /// Error text of failed jobs, in submission order
    pub errors: Vec<String>,
    /// Summary line, `"{completed}/{total} tasks successful"` plus the failure count
    pub message: String,
}

impl OrchestrationResult {
    /// Aggregate settled job results
    pub fn from_results(results: Vec<JobResult>, elapsed: Duration, policy: SuccessPolicy) -> Self {
        let total_tasks = results.len();
        let completed_tasks = results.iter().filter(|r| r.success).count();
        let failed_tasks = total_tasks - completed_tasks;
        let errors = results
            .iter()
            .filter_map(|r| r.error_text().map(str::to_string))
            .collect();

        let mut message = format!("{completed_tasks}/{total_tasks} tasks successful");
        if failed_tasks > 0 {
            message.push_str(&format!(", {failed_tasks} failed"));
        }

        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            results,
            total_tasks,
            completed_tasks,
            failed_tasks,
            overall_success: policy.evaluate(completed_tasks, failed_tasks),
            elapsed_seconds: elapsed.as_secs_f64(),
            errors,
            message,
        }
    }

    /// Look up a job result by name
    pub fn get(&self, name: &str) -> Option<&JobResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Job names in submission order
    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    /// Check the count invariants
    pub fn is_consistent(&self) -> bool {
        self.total_tasks == self.results.len()
            && self.total_tasks == self.completed_tasks + self.failed_tasks
            && self.completed_tasks == self.results.iter().filter(|r| r.success).count()
    }
}

/// Runs a fixed set of named jobs concurrently
#[derive(Debug, Default)]
pub struct Orchestrator {
    jobs: Vec<Job>,
    policy: SuccessPolicy,
    job_timeout: Option<Duration>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Create an empty orchestrator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an orchestrator from a job list
    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Result<Self> {
        let mut orchestrator = Self::new();
        for job in jobs {
            orchestrator.add_job(job)?;
        }
        Ok(orchestrator)
    }

    /// Submit a job; names must be unique
    pub fn add_job(&mut self, job: Job) -> Result<()> {
        if self.jobs.iter().any(|j| j.name() == job.name()) {
            return Err(Error::invalid_input(format!("duplicate job name: {}", job.name())));
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Set the success policy
    pub fn with_policy(mut self, policy: SuccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Default timeout for jobs that do not set their own
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Bound the whole run; jobs still running at the deadline are failed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Number of submitted jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Run every job and aggregate the outcome
    pub async fn run(self) -> Result<OrchestrationResult> {
        let Orchestrator {
            jobs,
            policy,
            job_timeout,
            deadline,
        } = self;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = jobs.len();
        let names: Vec<String> = jobs.iter().map(|j| j.name().to_string()).collect();
        let span = tracing::info_span!("orchestration", %run_id, tasks = total);

        async move {
            tracing::info!(jobs = ?names, "Starting parallel execution");
            let start = Instant::now();
            let run_deadline = deadline.map(|d| start + d);

            let settled = jobs.into_iter().map(|job| {
                let job_deadline = job.timeout().or(job_timeout).map(|t| start + t);
                job.settle(earliest(job_deadline, run_deadline))
            });
            let results = join_all(settled).await;
            let elapsed = start.elapsed();

            if results.len() != total || results.iter().zip(&names).any(|(r, n)| &r.name != n) {
                return Err(Error::Orchestration(format!(
                    "expected {total} results in submission order, got {}",
                    results.len()
                )));
            }

            let mut outcome = OrchestrationResult::from_results(results, elapsed, policy);
            outcome.run_id = run_id;
            outcome.started_at = started_at;

            tracing::info!(
                completed = outcome.completed_tasks,
                failed = outcome.failed_tasks,
                elapsed_seconds = outcome.elapsed_seconds,
                overall_success = outcome.overall_success,
                "{}",
                outcome.message
            );
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Serializes job results as a name-keyed map while keeping list order
mod ordered_results {
    use crate::job::JobResult;
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    }

    pub fn serialize<S: Serializer>(results: &[JobResult], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(results.iter().map(|r| {
            (
                &r.name,
                Entry {
                    success: r.success,
                    message: r.message.clone(),
                    payload: r.payload.clone(),
                    error: r.error.clone(),
                },
            )
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<JobResult>, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Vec<JobResult>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of job name to job result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut results = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, Entry>()? {
                    results.push(JobResult {
                        name,
                        success: entry.success,
                        message: entry.message,
                        payload: entry.payload,
                        error: entry.error,
                    });
                }
                Ok(results)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOutput;
    use serde_json::json;

    fn ok_job(name: &str) -> Job {
        let owned = name.to_string();
        Job::new(name, move || async move {
            Ok(JobOutput::succeeded(format!("{owned} generated")).with_payload(json!({ "job": owned })))
        })
    }

    fn failing_job(name: &str, error: &'static str) -> Job {
        Job::new(name, move || async move { Err(anyhow::anyhow!(error)) })
    }

    fn delayed(name: &str, secs: u64, succeed: bool) -> Job {
        Job::new(name, move || async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if succeed {
                Ok(JobOutput::succeeded("done"))
            } else {
                Err(anyhow::anyhow!("failed after {secs}s"))
            }
        })
    }

    #[tokio::test]
    async fn all_jobs_succeed() {
        let orchestrator = Orchestrator::from_jobs(vec![
            ok_job("titles"),
            ok_job("description"),
            ok_job("timestamps"),
            ok_job("thumbnails"),
        ])
        .unwrap();

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.total_tasks, 4);
        assert_eq!(result.completed_tasks, 4);
        assert_eq!(result.failed_tasks, 0);
        assert!(result.overall_success);
        assert!(result.errors.is_empty());
        assert!(result.is_consistent());
        assert_eq!(result.message, "4/4 tasks successful");
    }

    #[tokio::test]
    async fn one_failure_is_isolated() {
        let orchestrator = Orchestrator::from_jobs(vec![
            failing_job("titles", "quota exceeded"),
            ok_job("description"),
            ok_job("timestamps"),
            ok_job("thumbnails"),
        ])
        .unwrap();

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.results.len(), 4);
        assert_eq!(result.completed_tasks, 3);
        assert_eq!(result.failed_tasks, 1);
        assert!(!result.overall_success);
        assert_eq!(result.errors, vec!["quota exceeded".to_string()]);
        assert!(!result.get("titles").unwrap().success);
        assert_eq!(
            result.get("description").unwrap().payload,
            Some(json!({ "job": "description" }))
        );
        assert_eq!(result.message, "3/4 tasks successful, 1 failed");
    }

    #[tokio::test]
    async fn panicking_job_does_not_abort_siblings() {
        let boom = Job::new("boom", || async {
            let empty: Vec<u8> = Vec::new();
            let _ = empty[3];
            Ok(JobOutput::succeeded("unreachable"))
        });
        let orchestrator = Orchestrator::from_jobs(vec![boom, ok_job("a"), ok_job("b")]).unwrap();

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.total_tasks, 3);
        assert_eq!(result.completed_tasks, 2);
        assert!(result.errors[0].starts_with("panicked:"));
        assert!(result.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_concurrently() {
        let orchestrator = Orchestrator::from_jobs(vec![
            delayed("a", 3, true),
            delayed("b", 3, true),
            delayed("c", 3, true),
        ])
        .unwrap();

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.completed_tasks, 3);
        assert!(result.elapsed_seconds >= 3.0 && result.elapsed_seconds < 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_follow_submission_order_not_completion_order() {
        let orchestrator = Orchestrator::from_jobs(vec![
            delayed("slow", 5, false),
            delayed("fast", 1, false),
            delayed("ok", 2, true),
        ])
        .unwrap();

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.names(), vec!["slow", "fast", "ok"]);
        assert_eq!(result.errors, vec!["failed after 5s", "failed after 1s"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_only_unfinished_jobs() {
        let orchestrator = Orchestrator::from_jobs(vec![delayed("quick", 1, true), delayed("stuck", 600, true)])
            .unwrap()
            .with_deadline(Duration::from_secs(10));

        let result = orchestrator.run().await.unwrap();
        assert!(result.get("quick").unwrap().success);
        let stuck = result.get("stuck").unwrap();
        assert!(!stuck.success);
        assert!(stuck.error_text().unwrap().contains("deadline"));
        assert!(result.elapsed_seconds < 11.0);
    }

    #[tokio::test(start_paused = true)]
    async fn per_job_timeout_overrides_default() {
        let orchestrator = Orchestrator::from_jobs(vec![
            delayed("patient", 20, true).with_timeout(Duration::from_secs(30)),
            delayed("default", 20, true),
        ])
        .unwrap()
        .with_job_timeout(Duration::from_secs(5));

        let result = orchestrator.run().await.unwrap();
        assert!(result.get("patient").unwrap().success);
        assert!(!result.get("default").unwrap().success);
    }

    #[tokio::test]
    async fn any_succeeded_policy() {
        let orchestrator = Orchestrator::from_jobs(vec![failing_job("a", "x"), ok_job("b")])
            .unwrap()
            .with_policy(SuccessPolicy::AnySucceeded);

        let result = orchestrator.run().await.unwrap();
        assert!(result.overall_success);
        assert_eq!(result.failed_tasks, 1);
    }

    #[tokio::test]
    async fn empty_run_is_not_a_success() {
        let result = Orchestrator::new().run().await.unwrap();
        assert_eq!(result.total_tasks, 0);
        assert!(!result.overall_success);
        assert!(result.is_consistent());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Orchestrator::from_jobs(vec![ok_job("titles"), ok_job("titles")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn serializes_results_as_ordered_map() {
        let orchestrator = Orchestrator::from_jobs(vec![ok_job("zeta"), failing_job("alpha", "nope")]).unwrap();
        let result = orchestrator.run().await.unwrap();

        let text = serde_json::to_string(&result).unwrap();
        assert!(text.find("\"zeta\"").unwrap() < text.find("\"alpha\"").unwrap());

        let back: OrchestrationResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back.names(), vec!["zeta", "alpha"]);
        assert_eq!(back.results, result.results);
    }
}
