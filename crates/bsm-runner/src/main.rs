//! # bsm-runner
//!
//! Command-line entry point for the Binance stream monitor.
//!
//! Parses alerts from the command line (and optionally a JSON config file),
//! connects one multiplexed trade stream, and logs a warning whenever a
//! watched symbol trades above its limit. Runs until Ctrl+C / SIGTERM or a
//! fatal upstream error.
//!
//! # Usage
//!
//! ```bash
//! bsm-runner --alert-on 'BTCUSDT>51000' --alert-on 'ETHUSDT>3000' --verbose
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use bsm_alert::AlertEvaluator;
use bsm_core::config::{AppConfig, load_config};
use bsm_core::logging::{TracingLogger, init_logging};
use bsm_core::{Logger, WatchError, parse_alerts};
use bsm_md::{TradeSource, TradeWatcher};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Binance trade stream monitor.
#[derive(Parser)]
#[command(name = "bsm-runner", about = "Binance trade stream monitor with price alerts")]
struct Cli {
    /// Alert in the form SYMBOL>LIMIT (repeatable).
    #[arg(long = "alert-on", value_name = "SYMBOL>LIMIT")]
    alert_on: Vec<String>,

    /// Optional configuration file path (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    init_logging(level, log_dir.as_deref(), &config.module_name());

    let alerts = match parse_alerts(cli.alert_on.iter().chain(&config.alerts)) {
        Ok(alerts) => alerts,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let upstream = config.upstream.to_conn_config();
    info!("bsm-runner starting: url={}, {} alert(s)", upstream.url, alerts.len());
    if alerts.is_empty() {
        warn!("no alerts configured, nothing is watched");
    }

    let root = CancellationToken::new();
    tokio::spawn(cancel_on_signal(root.clone()));

    let log: Arc<dyn Logger> = Arc::new(TracingLogger);
    let watcher = Arc::new(TradeWatcher::new(upstream, Arc::clone(&log)));
    let source: Arc<dyn TradeSource> = Arc::clone(&watcher) as Arc<dyn TradeSource>;
    let evaluator = AlertEvaluator::new(source, log);

    // The first failure on either side stops the other.
    let group = root.child_token();
    let ingestion = supervised(&group, watcher.start(group.clone()));
    let evaluation = supervised(&group, evaluator.run(group.clone(), alerts));
    let (ingested, evaluated) = tokio::join!(ingestion, evaluation);

    match ingested.and(evaluated) {
        Ok(()) => {
            info!("stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn supervised(
    group: &CancellationToken,
    task: impl Future<Output = Result<(), WatchError>>,
) -> Result<(), WatchError> {
    let result = task.await;
    if result.is_err() {
        group.cancel();
    }
    result
}

async fn cancel_on_signal(root: CancellationToken) {
    match shutdown_signal().await {
        Ok(name) => info!("received {name}, stopping"),
        Err(err) => {
            error!("failed to listen for shutdown signals: {err}");
            return;
        }
    }
    root.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "interrupt"),
        _ = terminate.recv() => Ok("terminated"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "interrupt")
}
