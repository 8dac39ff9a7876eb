use serde::{Deserialize, Serialize};

/// A typed fact attached to an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Artifact kind, e.g. `host`.
    pub data_type: String,
    /// Artifact value.
    pub data: String,
    /// Optional annotation shown next to the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Artifact {
    /// Artifact of `data_type` carrying `data`, without a message.
    pub fn new(data_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            data: data.into(),
            message: None,
        }
    }

    /// Attaches `message`.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Alert payload accepted by TheHive's `POST /api/alert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// `Splunk Alert <code>`.
    pub title: String,
    /// Alert type, always `external`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Originating system.
    pub source: String,
    /// Unique per submission.
    pub source_ref: String,
    /// Enrichment text and reference link.
    pub description: String,
    /// Host, datetime, source name and event code.
    pub artifacts: Vec<Artifact>,
}

impl Incident {
    /// First artifact of `data_type`.
    pub fn artifact(&self, data_type: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.data_type == data_type)
    }
}
