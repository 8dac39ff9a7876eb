//! Case-management side: incident construction and submission.

/// TheHive REST backend.
pub mod thehive;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    alert::AlertRecord,
    error::{BackendError, PipelineError, Result},
    incident::{Artifact, Incident},
    lookup::LookupTable,
    retry::RetryPolicy,
};

pub use thehive::{TheHiveBackend, TheHiveSettings};

/// Alert `type` sent with every incident.
pub const INCIDENT_TYPE: &str = "external";
/// Alert `source` sent with every incident.
pub const INCIDENT_SOURCE: &str = "Splunk";
/// Description used when the event code is not in the lookup table.
pub const NO_DESCRIPTION: &str = "No description available";
/// Reference used when the event code is not in the lookup table.
pub const NO_REFERENCE: &str = "No reference available";

const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Case-management operations the pipeline needs.
#[async_trait]
pub trait CaseBackend: Send + Sync {
    /// Authenticated no-op used to validate credentials.
    async fn ping(&self) -> std::result::Result<(), BackendError>;

    /// Creates one alert.
    async fn create_alert(&self, incident: &Incident) -> std::result::Result<(), BackendError>;

    /// Whether the endpoint and credentials are present at all.
    fn is_configured(&self) -> bool {
        true
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str;
}

/// Turns enriched alert records into incidents and submits them.
#[derive(Debug)]
pub struct CaseClient<B> {
    backend: B,
}

impl<B: CaseBackend> CaseClient<B> {
    /// Wraps `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Checks the backend is configured, then pings it per `policy`.
    pub async fn connect(&self, policy: &RetryPolicy, shutdown: &CancellationToken) -> Result<()> {
        if !self.backend.is_configured() {
            return Err(PipelineError::Configuration(format!(
                "{} endpoint or API key not configured",
                self.backend.name()
            )));
        }

        policy
            .run(self.backend.name(), shutdown, || self.backend.ping())
            .await
    }

    /// Submits one incident for `record`. Never retried here; the caller owns
    /// the retry decision so dedup state stays consistent.
    pub async fn submit(&self, record: &AlertRecord, table: &LookupTable) -> Result<Incident> {
        if record.event_code == 0 {
            return Err(PipelineError::MissingField("EventCode"));
        }

        let incident = build_incident(record, table, Uuid::new_v4());
        self.backend
            .create_alert(&incident)
            .await
            .map_err(|e| PipelineError::Submission(e.to_string()))?;

        info!(
            event_code = record.event_code,
            host = %record.host,
            source_ref = %incident.source_ref,
            "incident created"
        );
        Ok(incident)
    }
}

/// Builds the incident for `record`. Enrichment is best effort: an unknown
/// event code yields placeholder text instead of an error.
pub fn build_incident(record: &AlertRecord, table: &LookupTable, reference: Uuid) -> Incident {
    let (description, reference_url) = match table.get(record.event_code) {
        Some(entry) => (entry.description.as_str(), entry.reference_url.as_str()),
        None => {
            warn!(
                event_code = record.event_code,
                "event code missing from lookup table"
            );
            (NO_DESCRIPTION, NO_REFERENCE)
        }
    };

    let event_code = record.event_code.to_string();

    Incident {
        title: format!("Splunk Alert {event_code}"),
        kind: INCIDENT_TYPE.to_string(),
        source: INCIDENT_SOURCE.to_string(),
        source_ref: format!("splunk-{reference}"),
        description: format!("Description: {description}\n\nSee more on: {reference_url}"),
        artifacts: vec![
            Artifact::new("host", record.host.clone()),
            Artifact::new("datetime", display_timestamp(&record.timestamp)),
            Artifact::new("SourceName", record.source_name.clone()),
            Artifact::new("EventCode", event_code).with_message("EventCode"),
        ],
    }
}

/// Reformats a search timestamp as `dd/mm/YYYY HH:MM:SS`, falling back to the
/// raw value when it cannot be parsed.
pub fn display_timestamp(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format(DISPLAY_FORMAT).to_string();
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.format(DISPLAY_FORMAT).to_string();
        }
    }

    warn!(timestamp = raw, "could not parse alert timestamp, using raw value");
    raw.to_string()
}
