use std::{collections::HashMap, io::Write, path::PathBuf, time::Duration};

use tempfile::NamedTempFile;
use threatflow_config::{ConfigLoadError, ConfigLoader};

fn required() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("SPLUNK_HOST", "10.0.0.5"),
        ("SPLUNK_TOKEN", "splunk-secret"),
        ("THEHIVE_URL", "https://thehive.local:9000"),
        ("THEHIVE_API_KEY", "hive-secret"),
    ])
}

fn from_map(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
    move |key| vars.get(key).map(|v| v.to_string())
}

fn env_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_fill_optional_settings() {
    let load = ConfigLoader::new().load_with(&from_map(required())).unwrap();
    let config = load.config;

    assert_eq!(config.splunk.scheme, "https");
    assert_eq!(config.splunk.port, 8089);
    assert!(config.splunk.verify_tls);
    assert_eq!(config.splunk.index, "test_detection_rule");
    assert_eq!(config.orchestrator.poll_interval, Duration::from_secs(60));
    assert_eq!(config.orchestrator.fetch_timeout, Duration::from_secs(60));
    assert_eq!(config.orchestrator.retry.max_retries, 3);
    assert_eq!(config.orchestrator.retry.retry_delay, Duration::from_secs(5));
    assert_eq!(config.lookup.path, PathBuf::from("data/windows_eventcode.csv"));
    assert!(config.log_file.is_none());
    assert!(load.warnings.is_empty());
}

#[test]
fn each_required_key_is_reported_when_missing() {
    for key in ["SPLUNK_HOST", "SPLUNK_TOKEN", "THEHIVE_URL", "THEHIVE_API_KEY"] {
        let mut vars = required();
        vars.remove(key);

        let err = ConfigLoader::new().load_with(&from_map(vars)).unwrap_err();

        match err {
            ConfigLoadError::Missing { key: missing } => assert_eq!(missing, key),
            other => panic!("expected missing {key}, got {other}"),
        }
    }
}

#[test]
fn blank_values_count_as_missing() {
    let mut vars = required();
    vars.insert("THEHIVE_API_KEY", "   ");

    let err = ConfigLoader::new().load_with(&from_map(vars)).unwrap_err();

    assert!(matches!(
        err,
        ConfigLoadError::Missing {
            key: "THEHIVE_API_KEY"
        }
    ));
}

#[test]
fn legacy_lowercase_keys_are_accepted_with_warning() {
    let vars = HashMap::from([
        ("splunk_ip", "10.0.0.5"),
        ("splunk_token", "splunk-secret"),
        ("thehive_ip", "https://thehive.local:9000"),
        ("thehive_api", "hive-secret"),
    ]);

    let load = ConfigLoader::new().load_with(&from_map(vars)).unwrap();

    assert_eq!(load.config.splunk.host, "10.0.0.5");
    assert_eq!(load.config.thehive.api_key, "hive-secret");
    assert_eq!(load.warnings.items.len(), 4);
    assert!(load.warnings.items[0].contains("SPLUNK_HOST"));
}

#[test]
fn durations_accept_humantime_and_seconds() {
    let mut vars = required();
    vars.insert("POLL_INTERVAL", "2m");
    vars.insert("FETCH_TIMEOUT", "45");
    vars.insert("RETRY_DELAY", "500ms");
    vars.insert("MAX_RETRIES", "5");

    let config = ConfigLoader::new().load_with(&from_map(vars)).unwrap().config;

    assert_eq!(config.orchestrator.poll_interval, Duration::from_secs(120));
    assert_eq!(config.orchestrator.fetch_timeout, Duration::from_secs(45));
    assert_eq!(config.orchestrator.retry.retry_delay, Duration::from_millis(500));
    assert_eq!(config.orchestrator.retry.max_retries, 5);
}

#[test]
fn invalid_values_name_the_key() {
    let cases = [
        ("SPLUNK_PORT", "eighty"),
        ("SPLUNK_VERIFY_TLS", "maybe"),
        ("SPLUNK_SCHEME", "ftp"),
        ("POLL_INTERVAL", "soon"),
        ("MAX_RETRIES", "0"),
        ("THEHIVE_URL", "not a url"),
    ];

    for (key, value) in cases {
        let mut vars = required();
        vars.insert(key, value);

        let err = ConfigLoader::new().load_with(&from_map(vars)).unwrap_err();

        match err {
            ConfigLoadError::Invalid { key: invalid, .. } => assert_eq!(invalid, key),
            other => panic!("expected invalid {key}, got {other}"),
        }
    }
}

#[test]
fn disabled_tls_verification_is_warned() {
    let mut vars = required();
    vars.insert("SPLUNK_VERIFY_TLS", "false");

    let load = ConfigLoader::new().load_with(&from_map(vars)).unwrap();

    assert!(!load.config.splunk.verify_tls);
    assert!(
        load.warnings
            .items
            .iter()
            .any(|w| w.contains("SPLUNK_VERIFY_TLS"))
    );
}

#[test]
fn env_file_supplies_values_under_process_env() {
    let file = env_file(
        "SPLUNK_HOST=file-host\n\
         SPLUNK_TOKEN=file-token\n\
         THEHIVE_URL=https://hive.example\n\
         THEHIVE_API_KEY=file-key\n\
         LOG_FILE=/var/log/threatflow.log\n",
    );
    let process = from_map(HashMap::from([("SPLUNK_HOST", "process-host")]));

    let load = ConfigLoader::new()
        .with_env_file(file.path())
        .load_with(&process)
        .unwrap();

    assert_eq!(load.env_file.as_deref(), Some(file.path()));
    assert_eq!(load.config.splunk.host, "process-host");
    assert_eq!(load.config.splunk.token, "file-token");
    assert_eq!(load.config.thehive.endpoint, "https://hive.example");
    assert_eq!(
        load.config.log_file,
        Some(PathBuf::from("/var/log/threatflow.log"))
    );
}

#[test]
fn explicit_env_file_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.env");

    let err = ConfigLoader::new()
        .with_env_file(&path)
        .load_with(&from_map(required()))
        .unwrap_err();

    match err {
        ConfigLoadError::EnvFile { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected env file error, got {other}"),
    }
}
