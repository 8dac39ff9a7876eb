use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use threatflow_core::{
    OrchestratorConfig, RetryPolicy, SplunkSettings, TheHiveSettings,
    search::{DEFAULT_INDEX, splunk::DEFAULT_PORT},
};
use url::Url;

use crate::{
    error::ConfigLoadError,
    models::{Config, ConfigLoad, ConfigWarnings, LookupConfig},
};

const DEFAULT_ENV_FILE: &str = ".env";

/// Resolves [`Config`] from the process environment, falling back to values
/// from a `.env` file. Process variables always win; the file is read without
/// touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_file: Option<PathBuf>,
}

struct Source<'a> {
    process: &'a dyn Fn(&str) -> Option<String>,
    file: &'a HashMap<String, String>,
}

impl Source<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.process)(key)
            .or_else(|| self.file.get(key).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Looks up `key`, then the legacy lower-case name.
    fn get_with_legacy(
        &self,
        key: &'static str,
        legacy: &'static str,
        warnings: &mut ConfigWarnings,
    ) -> Option<String> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let value = self.get(legacy)?;
        warnings.push(format!("{legacy} is deprecated, set {key} instead"));
        Some(value)
    }

    fn require(
        &self,
        key: &'static str,
        legacy: &'static str,
        warnings: &mut ConfigWarnings,
    ) -> Result<String, ConfigLoadError> {
        self.get_with_legacy(key, legacy, warnings)
            .ok_or(ConfigLoadError::Missing { key })
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigLoadError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigLoadError::Invalid {
                key,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn duration(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigLoadError> {
        match self.get(key) {
            Some(raw) => parse_duration(&raw).map_err(|reason| ConfigLoadError::Invalid { key, reason }),
            None => Ok(default),
        }
    }

    fn lookup(&self) -> LookupConfig {
        let defaults = LookupConfig::default();
        LookupConfig {
            path: self
                .get("LOOKUP_TABLE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            source_url: self.get("LOOKUP_SOURCE_URL").unwrap_or(defaults.source_url),
        }
    }
}

/// Accepts humantime strings (`90s`, `2m`) or a bare number of seconds.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

impl ConfigLoader {
    /// Loader reading `./.env` when it exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of an optional `./.env`. The file must exist.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Resolves configuration from the process environment and the env file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with(&|key| env::var(key).ok())
    }

    /// Resolves only the lookup table settings, which need no credentials.
    pub fn load_lookup(&self) -> Result<LookupConfig, ConfigLoadError> {
        let (_, file) = self.read_env_file()?;
        let source = Source {
            process: &|key| env::var(key).ok(),
            file: &file,
        };
        Ok(source.lookup())
    }

    /// Like [`ConfigLoader::load`], reading process variables through `process`.
    pub fn load_with(
        &self,
        process: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_file, file) = self.read_env_file()?;
        let source = Source {
            process,
            file: &file,
        };
        let mut warnings = ConfigWarnings::default();

        let splunk = load_splunk(&source, &mut warnings)?;
        let thehive = load_thehive(&source, &mut warnings)?;

        let max_retries: u32 = source.parse("MAX_RETRIES", RetryPolicy::default().max_retries)?;
        if max_retries == 0 {
            return Err(ConfigLoadError::Invalid {
                key: "MAX_RETRIES",
                reason: "must be at least 1".to_string(),
            });
        }
        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            poll_interval: source.duration("POLL_INTERVAL", defaults.poll_interval)?,
            fetch_timeout: source.duration("FETCH_TIMEOUT", defaults.fetch_timeout)?,
            retry: RetryPolicy::new(
                max_retries,
                source.duration("RETRY_DELAY", defaults.retry.retry_delay)?,
            ),
        };
        if orchestrator.poll_interval.is_zero() {
            warnings.push("POLL_INTERVAL is zero; the search backend will be polled continuously");
        }

        Ok(ConfigLoad {
            config: Config {
                splunk,
                thehive,
                orchestrator,
                lookup: source.lookup(),
                log_file: source.get("LOG_FILE").map(PathBuf::from),
            },
            env_file,
            warnings,
        })
    }

    fn read_env_file(&self) -> Result<(Option<PathBuf>, HashMap<String, String>), ConfigLoadError> {
        let path = match &self.env_file {
            Some(path) => path.clone(),
            None if Path::new(DEFAULT_ENV_FILE).is_file() => PathBuf::from(DEFAULT_ENV_FILE),
            None => return Ok((None, HashMap::new())),
        };

        let env_err = |source| ConfigLoadError::EnvFile {
            path: path.clone(),
            source,
        };
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(&path).map_err(env_err)? {
            let (key, value) = item.map_err(env_err)?;
            vars.insert(key, value);
        }
        Ok((Some(path), vars))
    }
}

fn load_splunk(
    source: &Source<'_>,
    warnings: &mut ConfigWarnings,
) -> Result<SplunkSettings, ConfigLoadError> {
    let host = source.require("SPLUNK_HOST", "splunk_ip", warnings)?;
    let token = source.require("SPLUNK_TOKEN", "splunk_token", warnings)?;

    let scheme = source.get("SPLUNK_SCHEME").unwrap_or_else(|| "https".to_string());
    if scheme != "https" && scheme != "http" {
        return Err(ConfigLoadError::Invalid {
            key: "SPLUNK_SCHEME",
            reason: format!("expected http or https, got {scheme}"),
        });
    }

    let verify_tls: bool = source.parse("SPLUNK_VERIFY_TLS", true)?;
    if !verify_tls {
        warnings.push("SPLUNK_VERIFY_TLS=false: the Splunk certificate will not be verified");
    }

    let settings = SplunkSettings {
        scheme,
        host,
        port: source.parse("SPLUNK_PORT", DEFAULT_PORT)?,
        token,
        verify_tls,
        index: source
            .get("SPLUNK_INDEX")
            .unwrap_or_else(|| DEFAULT_INDEX.to_string()),
    };
    settings
        .base_url()
        .map_err(|e| ConfigLoadError::Invalid {
            key: "SPLUNK_HOST",
            reason: e.to_string(),
        })?;
    Ok(settings)
}

fn load_thehive(
    source: &Source<'_>,
    warnings: &mut ConfigWarnings,
) -> Result<TheHiveSettings, ConfigLoadError> {
    let endpoint = source.require("THEHIVE_URL", "thehive_ip", warnings)?;
    let api_key = source.require("THEHIVE_API_KEY", "thehive_api", warnings)?;

    let url = Url::parse(&endpoint).map_err(|e| ConfigLoadError::Invalid {
        key: "THEHIVE_URL",
        reason: e.to_string(),
    })?;
    if url.scheme() == "http" {
        warnings.push("THEHIVE_URL uses plain http; the API key is sent unencrypted");
    }

    Ok(TheHiveSettings { endpoint, api_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_numbers_are_seconds() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("soon").is_err());
    }
}
