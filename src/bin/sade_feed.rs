//! sade_feed - detection feed daemon
//!
//! This daemon:
//! 1. Loads configuration (`SADE_CONFIG` file plus environment overrides)
//! 2. Opens the frame source and the configured inference backend
//! 3. Runs the connection test once, then the poll and sweep workers
//! 4. Serves the loopback feed API until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use sade_feed::{
    ConnectionStatus, FeedApiConfig, FeedApiServer, FeedConfig, FeedController, FeedRunner,
    SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seconds between feed summaries in the log.
    #[arg(long, default_value_t = 5)]
    report_interval_secs: u64,
    /// Do not start the feed API.
    #[arg(long)]
    no_api: bool,
    /// Exit instead of holding in the error state when initialization fails.
    #[arg(long)]
    exit_on_error: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.report_interval_secs == 0 {
        return Err(anyhow!("report interval must be >= 1 second"));
    }

    let config = FeedConfig::load()?;
    log::info!(
        "sade_feed starting (backend={}, source={})",
        config.backend.as_str(),
        config.source.url
    );

    let source = config.open_source()?;
    let registry = config.build_backends()?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no inference backend configured"))?;
    let controller = Arc::new(FeedController::new(
        config.feed.clone(),
        source,
        backend,
        Arc::new(SystemClock),
    )?);
    log::info!(
        "feed controller using backend {} (capacity={}, display={})",
        controller.backend_name(),
        config.feed.buffer_capacity,
        config.feed.display_limit
    );

    let api_handle = if config.api_enabled && !args.no_api {
        let api_config = FeedApiConfig {
            addr: config.api_addr.clone(),
        };
        Some(FeedApiServer::new(api_config, controller.clone()).spawn()?)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let runner = match controller.connect()? {
        ConnectionStatus::Connected => Some(FeedRunner::spawn(controller.clone())?),
        _ => {
            let message = controller
                .status()?
                .last_error
                .unwrap_or_else(|| "initialization failed".to_string());
            if args.exit_on_error {
                if let Some(handle) = api_handle {
                    handle.stop()?;
                }
                return Err(anyhow!(message));
            }
            log::warn!("feed disabled: {}; waiting for shutdown signal (Ctrl-C)", message);
            None
        }
    };

    let report_interval = Duration::from_secs(args.report_interval_secs);
    loop {
        match rx.recv_timeout(report_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping feed...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if let Some(runner) = &runner {
            if runner.is_stopped() {
                log::info!("feed workers stopped, exiting");
                break;
            }
        }
        report(&controller)?;
    }

    if let Some(runner) = runner {
        runner.stop()?;
    }
    if let Some(handle) = api_handle {
        handle.stop()?;
    }
    Ok(())
}

fn report(controller: &FeedController) -> Result<()> {
    let snapshot = controller.snapshot()?;
    log::info!(
        "feed: {} buffered, frames={} cycles={} error={}",
        snapshot.total,
        snapshot.status.frame_count,
        snapshot.status.cycles_completed,
        snapshot.status.last_error.as_deref().unwrap_or("none")
    );
    for detection in &snapshot.detections {
        log::info!(
            "  [{}] {} {:.0}% {}",
            detection.priority.map(|p| p.as_str()).unwrap_or("-"),
            detection.kind,
            detection.confidence * 100.0,
            detection.label
        );
    }
    Ok(())
}
