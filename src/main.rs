//! respkv server entry point.
//!
//! Parses configuration, sets up logging, creates the store and the
//! optional expiry sweeper, then accepts connections until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use respkv::config::Config;
use respkv::server::Server;
use respkv::storage::{ExpiryConfig, ExpirySweeper, Store};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = respkv::VERSION, "Starting respkv");

    // Created once, shared by every connection for the life of the process
    let store = Arc::new(Store::new());

    let _sweeper = config.sweep_interval().map(|interval| {
        ExpirySweeper::start(Arc::clone(&store), ExpiryConfig::with_base_interval(interval))
    });

    let server = Server::bind(config.bind_address(), store, config.mode)
        .await
        .with_context(|| format!("could not listen on {}", config.bind_address()))?
        .with_max_buffer(config.max_buffer);
    let stats = server.stats();

    info!(
        address = %server.local_addr()?,
        mode = ?config.mode,
        "Ready to accept connections"
    );

    tokio::select! {
        _ = server.run() => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
