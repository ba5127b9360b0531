//! Announcement queue engine - Main entry point
//!
//! Reads newline-delimited JSON control messages from stdin, applies them to
//! the zone queues and writes every bus event as one JSON line to stdout.
//! Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use announce_common::time::SystemClock;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use announce_queue::{
    ControlMessage, EngineConfig, EventBus, LoggingDispatcher, QueueManager,
};

/// Command-line arguments for announce-queue
#[derive(Parser, Debug)]
#[command(name = "announce-queue")]
#[command(about = "Per-zone announcement playback scheduler")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (overrides the config file, RUST_LOG overrides both)
    #[arg(short, long, env = "ANNOUNCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Additional zone to create (repeatable)
    #[arg(short, long = "zone")]
    zones: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("announce_queue={},announce_common={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting announce-queue v{} (gap {}s, memory {}, default duration {}s)",
        env!("CARGO_PKG_VERSION"),
        config.gap_secs,
        config.memory,
        config.default_duration_secs
    );

    let bus = EventBus::new(config.bus_capacity);
    let manager = QueueManager::new(
        config.queue_settings(),
        bus,
        Arc::new(LoggingDispatcher),
        Arc::new(SystemClock),
    );

    for zone in &config.zones {
        manager.add_zone(&zone.id, zone.gap());
    }
    for zone in &args.zones {
        manager.add_zone(zone, None);
    }
    if manager.zone_ids().is_empty() {
        warn!("No zones configured; every control message will be rejected");
    }

    let writer = spawn_bus_writer(&manager);

    run_control_loop(&manager).await;

    manager.shutdown();
    writer.abort();
    info!("Shutdown complete");
    Ok(())
}

/// Write every bus event to stdout as one JSON line
fn spawn_bus_writer(manager: &QueueManager) -> JoinHandle<()> {
    let mut rx = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        debug!(topic = event.event_type(), zone = %event.queue_id(), "Bus event");
                        println!("{}", json);
                    }
                    Err(e) => error!("Failed to serialize {}: {}", event.event_type(), e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Bus writer lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Apply control messages from stdin until EOF or a shutdown signal
async fn run_control_loop(manager: &QueueManager) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => apply_line(manager, &line),
                Ok(None) => {
                    info!("Control input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read control input: {}", e);
                    break;
                }
            },
        }
    }
}

fn apply_line(manager: &QueueManager, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let message = match ControlMessage::decode(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring control message: {}", e);
            return;
        }
    };
    let kind = message.kind();
    if let Err(e) = manager.handle_control(message) {
        warn!("{} failed: {}", kind, e);
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
