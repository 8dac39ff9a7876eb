use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{DEFAULT_INDEX, JobId, JobStatus, SearchBackend};
use crate::error::{BackendError, PipelineError};

/// Splunk management port.
pub const DEFAULT_PORT: u16 = 8089;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the Splunk management API.
#[derive(Clone, Serialize, Deserialize)]
pub struct SplunkSettings {
    /// `http` or `https`.
    pub scheme: String,
    /// Host name or address.
    pub host: String,
    /// Management port.
    pub port: u16,
    /// Bearer token.
    pub token: String,
    /// Splunk ships with a self-signed certificate on the management port.
    pub verify_tls: bool,
    /// Index the detection query searches.
    pub index: String,
}

impl std::fmt::Debug for SplunkSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplunkSettings")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("index", &self.index)
            .finish()
    }
}

impl SplunkSettings {
    /// Defaults for everything but `host` and `token`.
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scheme: "https".to_string(),
            host: host.into(),
            port: DEFAULT_PORT,
            token: token.into(),
            verify_tls: true,
            index: DEFAULT_INDEX.to_string(),
        }
    }

    /// Management API root.
    pub fn base_url(&self) -> Result<Url, PipelineError> {
        Url::parse(&format!("{}://{}:{}/", self.scheme, self.host, self.port)).map_err(|e| {
            PipelineError::Configuration(format!("invalid Splunk address {}: {e}", self.host))
        })
    }
}

/// Splunk REST search job API, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct SplunkBackend {
    client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    entry: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    content: JobContent,
}

#[derive(Debug, Deserialize)]
struct JobContent {
    #[serde(rename = "isDone", default)]
    is_done: bool,
    #[serde(rename = "isFailed", default)]
    is_failed: bool,
    #[serde(rename = "dispatchState")]
    dispatch_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<Value>,
}

impl SplunkBackend {
    /// Validates `settings` and builds the HTTP client. Does not connect.
    pub fn new(settings: &SplunkSettings) -> Result<Self, PipelineError> {
        if settings.host.trim().is_empty() || settings.token.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "Splunk host or token not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url()?,
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Decode(format!("invalid endpoint {path}: {e}")))
    }

    fn job_endpoint(&self, job: &JobId, suffix: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!("services/search/jobs/{}{suffix}", job.0))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(endpoint, status, response.text().await.unwrap_or_default()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(format!("{}: {e}", endpoint.path())))
    }
}

fn status_error(endpoint: &Url, status: StatusCode, body: String) -> BackendError {
    BackendError::Status {
        endpoint: endpoint.path().to_string(),
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    }
}

fn decode_job_status(response: JobResponse) -> Result<JobStatus, BackendError> {
    let entry = response
        .entry
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Decode("job status has no entry".to_string()))?;

    Ok(JobStatus {
        is_done: entry.content.is_done,
        is_failed: entry.content.is_failed,
        dispatch_state: entry.content.dispatch_state,
    })
}

#[async_trait]
impl SearchBackend for SplunkBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let url = self.endpoint("services/server/info")?;
        let request = self.client.get(url.clone()).query(&[("output_mode", "json")]);
        self.send::<Value>(&url, request).await.map(|_| ())
    }

    async fn create_job(&self, query: &str) -> Result<JobId, BackendError> {
        let url = self.endpoint("services/search/jobs")?;
        let request = self
            .client
            .post(url.clone())
            .form(&[("search", query), ("output_mode", "json")]);
        let created: CreateJobResponse = self.send(&url, request).await?;
        Ok(JobId(created.sid))
    }

    async fn job_status(&self, job: &JobId) -> Result<JobStatus, BackendError> {
        let url = self.job_endpoint(job, "")?;
        let request = self.client.get(url.clone()).query(&[("output_mode", "json")]);
        decode_job_status(self.send(&url, request).await?)
    }

    async fn results(&self, job: &JobId) -> Result<Vec<Value>, BackendError> {
        let url = self.job_endpoint(job, "/results")?;
        let request = self
            .client
            .get(url.clone())
            .query(&[("output_mode", "json"), ("count", "1")]);
        let results: ResultsResponse = self.send(&url, request).await?;
        Ok(results.results)
    }

    async fn cancel(&self, job: &JobId) -> Result<(), BackendError> {
        let url = self.job_endpoint(job, "/control")?;
        let request = self
            .client
            .post(url.clone())
            .form(&[("action", "cancel"), ("output_mode", "json")]);
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        // A job that already expired is as good as cancelled.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(status_error(&url, status, response.text().await.unwrap_or_default()))
    }

    fn name(&self) -> &'static str {
        "splunk"
    }
}
