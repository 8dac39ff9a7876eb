use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    alert::AlertRecord,
    case::{CaseBackend, CaseClient},
    error::{PipelineError, Result},
    lookup::LookupTable,
    retry::RetryPolicy,
    search::{DEFAULT_FETCH_TIMEOUT, SearchBackend, SearchClient},
};

/// Pause between poll cycles unless configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Timing settings of the polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause between two poll cycles.
    pub poll_interval: Duration,
    /// Deadline for one search job.
    pub fetch_timeout: Duration,
    /// Startup connection policy for both backends.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Last alert submitted during this process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    /// Timestamp of the last successfully submitted alert.
    pub last_seen_timestamp: Option<String>,
}

/// Lifecycle of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Built, not started.
    Idle,
    /// Validating backend sessions.
    Connecting,
    /// Fetching or waiting for the next cycle.
    Polling,
    /// Sending an incident.
    Submitting,
    /// Shut down.
    Stopped,
}

/// What a single poll cycle ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing fetched, or the fetch failed.
    Idle,
    /// The fetched alert was already submitted.
    Duplicate,
    /// A new incident was created with this `sourceRef`.
    Submitted { source_ref: String },
    /// Submission failed; the alert will be offered again next cycle.
    SubmissionFailed,
}

/// Drives fetch → compare → enrich → submit → sleep.
#[derive(Debug)]
pub struct Orchestrator<S, C> {
    search: SearchClient<S>,
    case: CaseClient<C>,
    table: LookupTable,
    config: OrchestratorConfig,
    poll_state: PollState,
    state: OrchestratorState,
}

impl<S, C> Orchestrator<S, C>
where
    S: SearchBackend,
    C: CaseBackend,
{
    /// Idle orchestrator over the given clients and table.
    pub fn new(
        search: SearchClient<S>,
        case: CaseClient<C>,
        table: LookupTable,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            search,
            case,
            table,
            config,
            poll_state: PollState::default(),
            state: OrchestratorState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Dedup state.
    pub fn poll_state(&self) -> &PollState {
        &self.poll_state
    }

    /// Timing settings in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Search side.
    pub fn search(&self) -> &SearchClient<S> {
        &self.search
    }

    /// Case side.
    pub fn case(&self) -> &CaseClient<C> {
        &self.case
    }

    /// Connects both backends, then polls until `shutdown` fires.
    ///
    /// Only startup failures are returned; the loop itself never ends on a
    /// cycle error. A shutdown during startup retries stops cleanly.
    pub async fn start(&mut self, shutdown: &CancellationToken) -> Result<()> {
        match self.connect(shutdown).await {
            Ok(()) => {}
            Err(PipelineError::Cancelled) => {
                self.state = OrchestratorState::Stopped;
                info!("shutdown requested before backends connected");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.run(shutdown).await;
        Ok(())
    }

    /// Connects TheHive first, then Splunk, each under the retry policy.
    pub async fn connect(&mut self, shutdown: &CancellationToken) -> Result<()> {
        self.state = OrchestratorState::Connecting;
        let retry = self.config.retry;

        self.case.connect(&retry, shutdown).await?;
        self.search.connect(&retry, shutdown).await?;

        self.state = OrchestratorState::Polling;
        Ok(())
    }

    /// Runs cycles `poll_interval` apart until `shutdown` fires.
    pub async fn run(&mut self, shutdown: &CancellationToken) {
        info!(
            poll_interval = ?self.config.poll_interval,
            fetch_timeout = ?self.config.fetch_timeout,
            lookup_entries = self.table.len(),
            "alert polling started"
        );

        while !shutdown.is_cancelled() {
            let outcome = self.run_cycle(shutdown).await;
            debug!(?outcome, "poll cycle finished");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.state = OrchestratorState::Stopped;
        info!("alert polling stopped");
    }

    /// A record is new unless its timestamp equals the last submitted one.
    pub fn is_new(&self, alert: &AlertRecord) -> bool {
        self.poll_state.last_seen_timestamp.as_deref() != Some(alert.dedup_key())
    }

    /// One fetch, dedup and submit pass. Errors are logged, never returned.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> CycleOutcome {
        self.state = OrchestratorState::Polling;

        let alert = match self
            .search
            .fetch_latest(self.config.fetch_timeout, shutdown)
            .await
        {
            Ok(Some(alert)) => alert,
            Ok(None) => return CycleOutcome::Idle,
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "fetch failed, idling this cycle");
                return CycleOutcome::Idle;
            }
        };

        if !self.is_new(&alert) {
            debug!(timestamp = %alert.timestamp, "alert already submitted");
            return CycleOutcome::Duplicate;
        }

        self.state = OrchestratorState::Submitting;
        let outcome = match self.case.submit(&alert, &self.table).await {
            Ok(incident) => {
                self.poll_state.last_seen_timestamp = Some(alert.timestamp);
                CycleOutcome::Submitted {
                    source_ref: incident.source_ref,
                }
            }
            Err(err) => {
                error!(
                    kind = err.kind(),
                    error = %err,
                    event_code = alert.event_code,
                    timestamp = %alert.timestamp,
                    "failed to submit alert, will retry next cycle"
                );
                CycleOutcome::SubmissionFailed
            }
        };
        self.state = OrchestratorState::Polling;

        outcome
    }
}
