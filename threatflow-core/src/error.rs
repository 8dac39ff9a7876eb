use std::time::Duration;

use thiserror::Error;

use crate::lookup::LookupError;

/// Failures surfaced by the ingestion pipeline.
///
/// Only [`PipelineError::Configuration`] and [`PipelineError::Connection`] are
/// fatal; everything else is scoped to a single poll cycle.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Required settings are missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A backend stayed unreachable through every startup attempt.
    #[error("could not connect to {backend} after {attempts} attempts: {source}")]
    Connection {
        /// Backend name.
        backend: &'static str,
        /// Attempts made before giving up.
        attempts: u32,
        /// Failure of the last attempt.
        #[source]
        source: BackendError,
    },

    /// The search job did not finish before the deadline.
    #[error("search job {sid} did not complete within {waited:?}")]
    Timeout {
        /// Search job id.
        sid: String,
        /// How long the job was waited on.
        waited: Duration,
    },

    /// A result row lacked a usable field.
    #[error("malformed alert data: {0}")]
    MalformedData(String),

    /// A record handed to submission lacks a required field.
    #[error("alert record is missing required field `{0}`")]
    MissingField(&'static str),

    /// The case backend rejected or never received the incident.
    #[error("incident submission failed: {0}")]
    Submission(String),

    /// The search backend failed to create, run or report a job.
    #[error("search backend error: {0}")]
    Search(String),

    /// Shutdown interrupted the operation.
    #[error("fetch interrupted by shutdown")]
    Cancelled,

    /// The lookup table could not be read or built.
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl PipelineError {
    /// Short label used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Connection { .. } => "connection",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::MalformedData(_) => "malformed_data",
            PipelineError::MissingField(_) => "missing_field",
            PipelineError::Submission(_) => "submission",
            PipelineError::Search(_) => "search",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Lookup(_) => "lookup",
        }
    }

    /// Whether the error must abort startup instead of idling the cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::Connection { .. }
        )
    }
}

/// Transport-level failures reported by a backend implementation.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport failure.
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        /// Request path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Anything else a backend wants to report.
    #[error("{0}")]
    Other(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_startup_failures_are_fatal() {
        let connection = PipelineError::Connection {
            backend: "splunk",
            attempts: 3,
            source: BackendError::Other("refused".into()),
        };
        assert!(connection.is_fatal());
        assert!(PipelineError::Configuration("missing key".into()).is_fatal());

        assert!(!PipelineError::MissingField("EventCode").is_fatal());
        assert!(!PipelineError::Submission("502".into()).is_fatal());
        assert!(
            !PipelineError::Timeout {
                sid: "1".into(),
                waited: Duration::from_secs(60)
            }
            .is_fatal()
        );
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(PipelineError::Cancelled.kind(), "cancelled");
        assert_eq!(
            PipelineError::MalformedData("no rows".into()).kind(),
            "malformed_data"
        );
    }
}
