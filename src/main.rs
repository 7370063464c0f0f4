#![forbid(unsafe_code)]

use clap::Parser;
use futures::StreamExt;
use ledgerd::config::{Config, LogLevel};
use ledgerd::server::Shutdown;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{error, info, metadata::LevelFilter};
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

mod cli;

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::None => LevelFilter::OFF,
    }
}

/// Installs the console sink and, if configured, a second sink writing to
/// `log_file_path` — the server treats logging purely as a sink (spec.md
/// §1), so this is the only place level/destination are decided.
fn enable_tracing(level: LogLevel, log_file_path: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = level_filter(level);

    let console = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(true)
        .with_filter(filter);

    let (file_layer, guard) = match log_file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok();
            match file {
                Some(file) => {
                    let (writer, guard) = tracing_appender::non_blocking(file);
                    let layer = tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(filter);
                    (Some(layer), Some(guard))
                }
                None => (None, None),
            }
        }
        None => (None, None),
    };

    tracing_subscriber::Registry::default()
        .with(console)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let mut config = Config::default();
    let _ = config.load_file(&cli.config).await;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(size) = cli.thread_pool_size {
        config.thread_pool_size = ledgerd::pool::clamp_size(size);
    }
    if let Some(path) = cli.tariff_file_path {
        config.tariff_file_path = Some(path);
    }
    if let Some(dir) = cli.server_data_root_dir {
        config.server_data_root_dir = dir;
    }
    if let Some(level) = cli.log_level.as_deref().and_then(|l| l.parse().ok()) {
        config.log_level = level;
    }
    if let Some(path) = cli.log_file_path {
        config.log_file_path = if path.is_empty() { None } else { Some(path) };
    }

    let log_level = config.log_level;
    let log_file_path = config.log_file_path.clone();
    let _tracing_guard = enable_tracing(log_level, log_file_path.as_deref());

    *ledgerd::config::CONFIG.write().await = config;

    let (shutdown, _signal) = Shutdown::new();

    let server_handle = match ledgerd::spawn(shutdown.clone()).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(%err, "failed to start server");
            return;
        }
    };

    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT]).expect("could not set signal handler");
    let signal_shutdown = shutdown.clone();
    let signals_handle = tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT | SIGQUIT => {
                    signal_shutdown.request();
                    return;
                }
                _ => unreachable!(),
            }
        }
    });

    tokio::select! {
        _ = server_handle => {}
        _ = signals_handle => {}
    }

    info!("shutting down");
    shutdown.request();
}
