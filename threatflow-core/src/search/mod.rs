//! Search backend access: one job per fetch, always released.

/// Splunk REST backend.
pub mod splunk;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    alert::AlertRecord,
    error::{BackendError, PipelineError, Result},
    retry::RetryPolicy,
};

pub use splunk::{SplunkBackend, SplunkSettings};

/// Interval between two job status checks.
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for a search job to complete.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Index searched unless configured otherwise.
pub const DEFAULT_INDEX: &str = "test_detection_rule";

/// Event codes selected by the detection rule.
pub const DETECTION_EVENT_CODES: [u32; 21] = [
    4625, 4624, 4648, 4675, 4720, 4726, 4732, 4740, 4672, 4697, 4688, 4698, 7045, 5156, 5158,
    4663, 4670, 1102, 4719, 7030, 7040,
];

/// Builds the fixed detection query for `index`.
///
/// `_time` is always projected; deduplication depends on it.
pub fn detection_query(index: &str) -> String {
    let codes = DETECTION_EVENT_CODES
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "search index={index} EventCode IN ({codes})\n\
         | fields EventCode, host, SourceName, _time\n\
         | lookup windows_event_code.csv event_code AS EventCode OUTPUT event_description\n\
         | table _time EventCode event_description host SourceName\n\
         | where isnotnull(event_description)"
    )
}

/// Server-side handle of a search job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a search job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// Results are ready.
    pub is_done: bool,
    /// The job failed server-side.
    pub is_failed: bool,
    /// Raw dispatch state, for logs.
    pub dispatch_state: Option<String>,
}

impl JobStatus {
    /// Status of a job still running.
    pub fn running() -> Self {
        Self {
            is_done: false,
            is_failed: false,
            dispatch_state: Some("RUNNING".to_string()),
        }
    }

    /// Status of a finished job.
    pub fn done() -> Self {
        Self {
            is_done: true,
            is_failed: false,
            dispatch_state: Some("DONE".to_string()),
        }
    }
}

/// Minimal job lifecycle the search client drives.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Cheap authenticated request used to validate the session.
    async fn ping(&self) -> std::result::Result<(), BackendError>;

    /// Dispatches `query` as a new job.
    async fn create_job(&self, query: &str) -> std::result::Result<JobId, BackendError>;

    /// Current status of `job`.
    async fn job_status(&self, job: &JobId) -> std::result::Result<JobStatus, BackendError>;

    /// Result rows, newest first. Only the first row is ever used.
    async fn results(&self, job: &JobId) -> std::result::Result<Vec<Value>, BackendError>;

    /// Cancels `job` and frees its server-side resources.
    async fn cancel(&self, job: &JobId) -> std::result::Result<(), BackendError>;

    /// Name used in logs and errors.
    fn name(&self) -> &'static str;
}

enum Wait {
    Done,
    TimedOut,
    Cancelled,
}

/// Fetches the most recent alert matching the detection rule.
#[derive(Debug)]
pub struct SearchClient<B> {
    backend: B,
    query: String,
    poll_interval: Duration,
}

impl<B: SearchBackend> SearchClient<B> {
    /// Client running the detection query against `index`.
    pub fn new(backend: B, index: &str) -> Self {
        Self {
            backend,
            query: detection_query(index),
            poll_interval: JOB_POLL_INTERVAL,
        }
    }

    /// Overrides the job status polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The query dispatched for every fetch.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Validates the session, retrying per `policy` until `shutdown` fires.
    pub async fn connect(&self, policy: &RetryPolicy, shutdown: &CancellationToken) -> Result<()> {
        policy
            .run(self.backend.name(), shutdown, || self.backend.ping())
            .await
    }

    /// Runs the detection query once and decodes the first row.
    ///
    /// Returns `Ok(None)` when the search matched nothing. The job is
    /// cancelled on every path once it has been created.
    pub async fn fetch_latest(
        &self,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Option<AlertRecord>> {
        let job = self
            .backend
            .create_job(&self.query)
            .await
            .map_err(|e| PipelineError::Search(format!("failed to create search job: {e}")))?;
        debug!(sid = %job, "search job created");

        let outcome = self.collect(&job, timeout, shutdown).await;

        if let Err(err) = self.backend.cancel(&job).await {
            warn!(sid = %job, error = %err, "failed to release search job");
        } else {
            debug!(sid = %job, "search job released");
        }

        outcome
    }

    async fn collect(
        &self,
        job: &JobId,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Option<AlertRecord>> {
        match self.wait_for_completion(job, timeout, shutdown).await? {
            Wait::Done => {}
            Wait::TimedOut => {
                return Err(PipelineError::Timeout {
                    sid: job.0.clone(),
                    waited: timeout,
                });
            }
            Wait::Cancelled => return Err(PipelineError::Cancelled),
        }

        let rows = self
            .backend
            .results(job)
            .await
            .map_err(|e| PipelineError::Search(format!("failed to read results of {job}: {e}")))?;

        let Some(first) = rows.first() else {
            warn!(sid = %job, "no results returned from detection query");
            return Ok(None);
        };

        AlertRecord::from_search_row(first).map(Some)
    }

    async fn wait_for_completion(
        &self,
        job: &JobId,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Wait> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self
                .backend
                .job_status(job)
                .await
                .map_err(|e| PipelineError::Search(format!("failed to poll {job}: {e}")))?;

            if status.is_failed {
                return Err(PipelineError::Search(format!(
                    "search job {job} failed (state {})",
                    status.dispatch_state.as_deref().unwrap_or("unknown")
                )));
            }
            if status.is_done {
                return Ok(Wait::Done);
            }
            if Instant::now() >= deadline {
                return Ok(Wait::TimedOut);
            }

            let pause = self
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(Wait::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_projects_time_and_lists_every_code() {
        let query = detection_query("test_detection_rule");

        assert!(query.starts_with("search index=test_detection_rule EventCode IN (4625, 4624,"));
        assert!(query.contains("| fields EventCode, host, SourceName, _time"));
        assert!(query.contains("| where isnotnull(event_description)"));
        for code in DETECTION_EVENT_CODES {
            assert!(query.contains(&code.to_string()), "missing {code}");
        }
    }
}
