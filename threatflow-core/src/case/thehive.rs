use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::CaseBackend;
use crate::{
    error::{BackendError, PipelineError},
    incident::Incident,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for TheHive.
#[derive(Clone, Serialize, Deserialize)]
pub struct TheHiveSettings {
    /// Base URL, e.g. `https://thehive.local:9000`.
    pub endpoint: String,
    /// Bearer API key.
    pub api_key: String,
}

impl std::fmt::Debug for TheHiveSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TheHiveSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// TheHive alert API.
#[derive(Debug, Clone)]
pub struct TheHiveBackend {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl TheHiveBackend {
    /// Validates `settings` and builds the HTTP client. Does not connect.
    pub fn new(settings: &TheHiveSettings) -> Result<Self, PipelineError> {
        if settings.endpoint.trim().is_empty() || settings.api_key.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "TheHive API key or endpoint not configured".to_string(),
            ));
        }

        let mut raw = settings.endpoint.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|e| {
            PipelineError::Configuration(format!("invalid TheHive endpoint {raw}: {e}"))
        })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Decode(format!("invalid endpoint {path}: {e}")))
    }

    async fn check(response: reqwest::Response, url: &Url) -> Result<(), BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            endpoint: url.path().to_string(),
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        })
    }
}

#[async_trait]
impl CaseBackend for TheHiveBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let url = self.endpoint("api/user/current")?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::check(response, &url).await
    }

    async fn create_alert(&self, incident: &Incident) -> Result<(), BackendError> {
        let url = self.endpoint("api/alert")?;
        debug!(title = %incident.title, source_ref = %incident.source_ref, "posting alert");
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(incident)
            .send()
            .await?;
        Self::check(response, &url).await
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn name(&self) -> &'static str {
        "thehive"
    }
}
