//! Splunk to TheHive alert forwarding.
//!
//! [`Orchestrator`] polls Splunk through a [`SearchClient`] for the newest
//! detection hit, drops it when its timestamp matches the last submitted alert,
//! enriches it from the [`LookupTable`] and submits it through a
//! [`CaseClient`]. Both clients talk to their backend through a narrow async
//! trait so the pipeline can run against in-memory fakes.

/// Decoded search results.
pub mod alert;
/// Incident construction and the case-management backend.
pub mod case;
/// Pipeline and backend error types.
pub mod error;
/// Payload submitted to TheHive.
pub mod incident;
/// Event code enrichment table.
pub mod lookup;
/// The polling loop.
pub mod orchestrator;
/// Startup connection retry.
pub mod retry;
/// Search backend access.
pub mod search;

pub use alert::AlertRecord;
pub use case::{CaseBackend, CaseClient, TheHiveBackend, TheHiveSettings};
pub use error::{BackendError, PipelineError, Result};
pub use incident::{Artifact, Incident};
pub use lookup::{LookupBuilder, LookupEntry, LookupError, LookupTable};
pub use orchestrator::{
    CycleOutcome, Orchestrator, OrchestratorConfig, OrchestratorState, PollState,
};
pub use retry::RetryPolicy;
pub use search::{JobId, JobStatus, SearchBackend, SearchClient, SplunkBackend, SplunkSettings};
