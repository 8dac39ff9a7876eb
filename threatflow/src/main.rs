//! # threatflow
//!
//! Polls a Splunk detection index and raises each newly seen alert in
//! TheHive, enriched from a Windows event code lookup table.
//!
//! Configuration is read from the environment and an optional `.env` file;
//! see the README for the full list of keys.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use threatflow_config::{Config, ConfigLoad, ConfigLoader, LookupConfig};
use threatflow_core::{
    CaseClient, LookupBuilder, LookupTable, Orchestrator, SearchClient, SplunkBackend,
    TheHiveBackend,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn";

const LOG_FILES_KEPT: usize = 3;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "threatflow")]
#[command(about = "Forward new Splunk detection alerts to TheHive")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct RunArgs {
    /// Read settings from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll Splunk and submit alerts until interrupted (default)
    Run,
    /// Rebuild the event code lookup table from the online encyclopedia and exit
    RefreshLookup {
        /// Write the table here instead of LOOKUP_TABLE_PATH
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loader = loader_for(&cli.run);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(loader).await,
        Command::RefreshLookup { output } => {
            let lookup = loader
                .load_lookup()
                .context("failed to load configuration")?;
            let _guard = init_tracing(None)?;
            refresh_lookup(&lookup, output.as_deref()).await
        }
    }
}

fn loader_for(args: &RunArgs) -> ConfigLoader {
    match &args.env_file {
        Some(path) => ConfigLoader::new().with_env_file(path),
        None => ConfigLoader::new(),
    }
}

/// Console logging plus, when `log_file` is set, a daily-rotated file kept
/// to [`LOG_FILES_KEPT`] generations. The returned guard flushes the file
/// writer on drop and must live as long as the process.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn file_appender(path: &Path) -> anyhow::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .with_context(|| format!("LOG_FILE {} has no file name", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix.to_string_lossy())
        .max_log_files(LOG_FILES_KEPT)
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

async fn run_pipeline(loader: ConfigLoader) -> anyhow::Result<()> {
    let ConfigLoad {
        config,
        env_file,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    let _log_guard = init_tracing(config.log_file.as_deref())?;

    if let Some(path) = &env_file {
        info!(path = %path.display(), "loaded .env file");
    }
    for warning in &warnings.items {
        warn!(message = %warning, "configuration warning");
    }
    log_effective_config(&config);

    let table = load_lookup_table(&config.lookup).await;

    let search = SearchClient::new(
        SplunkBackend::new(&config.splunk).context("invalid Splunk settings")?,
        &config.splunk.index,
    );
    let case = CaseClient::new(
        TheHiveBackend::new(&config.thehive).context("invalid TheHive settings")?,
    );
    let mut orchestrator = Orchestrator::new(search, case, table, config.orchestrator);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    orchestrator
        .start(&shutdown)
        .await
        .context("pipeline stopped")?;
    info!("threatflow stopped");
    Ok(())
}

fn log_effective_config(config: &Config) {
    let orchestrator = &config.orchestrator;
    info!(
        splunk.url = %format!("{}://{}:{}", config.splunk.scheme, config.splunk.host, config.splunk.port),
        splunk.index = %config.splunk.index,
        splunk.verify_tls = config.splunk.verify_tls,
        thehive.url = %config.thehive.endpoint,
        poll_interval = ?orchestrator.poll_interval,
        fetch_timeout = ?orchestrator.fetch_timeout,
        max_retries = orchestrator.retry.max_retries,
        retry_delay = ?orchestrator.retry.retry_delay,
        "configuration in effect"
    );
}

/// Loads the table from disk, building it first when the file is absent.
///
/// Enrichment is best effort: any failure leaves an empty table and every
/// incident carries the placeholder description.
async fn load_lookup_table(lookup: &LookupConfig) -> LookupTable {
    if !lookup.path.exists() {
        warn!(
            path = %lookup.path.display(),
            "lookup table not found, building it from the encyclopedia"
        );
        return match build_lookup_table(lookup).await {
            Ok(table) => table,
            Err(err) => {
                error!(
                    path = %lookup.path.display(),
                    error = %format!("{err:#}"),
                    "could not build lookup table, continuing without enrichment"
                );
                LookupTable::default()
            }
        };
    }

    match LookupTable::load(&lookup.path) {
        Ok(table) => table,
        Err(err) => {
            error!(
                path = %lookup.path.display(),
                error = %err,
                "could not load lookup table, continuing without enrichment"
            );
            LookupTable::default()
        }
    }
}

async fn build_lookup_table(lookup: &LookupConfig) -> anyhow::Result<LookupTable> {
    builder(lookup)?
        .refresh(&lookup.path)
        .await
        .context("failed to build lookup table")
}

async fn refresh_lookup(lookup: &LookupConfig, output: Option<&Path>) -> anyhow::Result<()> {
    let path = output.unwrap_or(&lookup.path);
    let table = builder(lookup)?
        .refresh(path)
        .await
        .context("failed to refresh lookup table")?;
    info!(path = %path.display(), entries = table.len(), "lookup table refreshed");
    Ok(())
}

fn builder(lookup: &LookupConfig) -> anyhow::Result<LookupBuilder> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("threatflow/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    Ok(LookupBuilder::new(client, lookup.source_url.clone()))
}

async fn watch_signals(shutdown: CancellationToken) {
    wait_for_signal().await;
    info!("shutdown requested, finishing current cycle");
    shutdown.cancel();
}

/// Resolves when `listener` fires. A listener that cannot be installed
/// never resolves, so it cannot be mistaken for a shutdown request.
async fn until_signal(name: &'static str, listener: impl Future<Output = std::io::Result<()>>) {
    if let Err(err) = listener.await {
        warn!(signal = name, error = %err, "signal listener unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let terminate = until_signal("SIGTERM", async {
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    });

    tokio::select! {
        _ = until_signal("Ctrl-C", tokio::signal::ctrl_c()) => {}
        _ = terminate => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    until_signal("Ctrl-C", tokio::signal::ctrl_c()).await;
}
