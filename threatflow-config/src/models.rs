use std::path::PathBuf;

use threatflow_core::{OrchestratorConfig, SplunkSettings, TheHiveSettings};

/// Lookup table location unless configured.
pub const DEFAULT_LOOKUP_PATH: &str = "data/windows_eventcode.csv";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Search backend connection.
    pub splunk: SplunkSettings,
    /// Case backend connection.
    pub thehive: TheHiveSettings,
    /// Polling, timeout and retry timing.
    pub orchestrator: OrchestratorConfig,
    /// Enrichment table location and source.
    pub lookup: LookupConfig,
    /// Optional log file appended to alongside console output.
    pub log_file: Option<PathBuf>,
}

/// Where the enrichment table lives and where it is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    /// CSV enrichment table read at startup.
    pub path: PathBuf,
    /// Page scraped by `refresh-lookup`.
    pub source_url: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOOKUP_PATH),
            source_url: threatflow_core::lookup::builder::DEFAULT_SOURCE_URL.to_string(),
        }
    }
}

/// Non-fatal findings collected while loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings {
    /// Messages in the order they were found.
    pub items: Vec<String>,
}

impl ConfigWarnings {
    /// Records one warning.
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(message.into());
    }

    /// Whether loading was clean.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    /// Resolved configuration.
    pub config: Config,
    /// The `.env` file that contributed values, if any.
    pub env_file: Option<PathBuf>,
    /// Non-fatal findings to log once tracing is up.
    pub warnings: ConfigWarnings,
}
