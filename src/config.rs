//! Server configuration.
//!
//! Only the bind address and the scheduling policy come from the command
//! line. The sweep interval, buffer cap and log filter are library-level
//! settings with fixed defaults.

use crate::connection::DEFAULT_MAX_BUFFER;
use crate::server::SchedulingPolicy;
use clap::Parser;
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL_MS: u64 = 100;

const DEFAULT_LOG_LEVEL: &str = "info";

/// Server configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "respkv", version, about = "A small Redis-compatible key-value server")]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, env = "RESPKV_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "RESPKV_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// How accepted connections are scheduled
    #[arg(short, long, value_enum, default_value_t = SchedulingPolicy::Concurrent)]
    pub mode: SchedulingPolicy,

    /// Base interval of the background expiry sweep in milliseconds (0 disables it)
    #[arg(skip = DEFAULT_SWEEP_INTERVAL_MS)]
    pub sweep_interval_ms: u64,

    /// Maximum bytes of an incomplete frame buffered per connection
    #[arg(skip = DEFAULT_MAX_BUFFER)]
    pub max_buffer: usize,

    /// Log filter, e.g. "info" or "respkv=trace"
    #[arg(skip = String::from(DEFAULT_LOG_LEVEL))]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            mode: SchedulingPolicy::Concurrent,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            max_buffer: DEFAULT_MAX_BUFFER,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
