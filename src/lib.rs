//! # respkv - A Small Redis-Compatible Key-Value Server
//!
//! respkv accepts TCP connections, decodes RESP command frames from a byte
//! stream that may arrive fragmented or batched, runs them against an
//! in-memory store with per-key expiry, and writes one RESP reply back per
//! command.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               respkv                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │   Server    │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌──────────────────────────┐ │
//! │                     │FrameDecoder │    │ Store (one Mutex)        │ │
//! │                     │ per client  │    │ key -> value + expiry    │ │
//! │                     └─────────────┘    └──────────────────────────┘ │
//! │                                                       ▲             │
//! │                                        ┌──────────────┴──────────┐  │
//! │                                        │     ExpirySweeper       │  │
//! │                                        │ (Background Tokio Task) │  │
//! │                                        └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respkv::server::{SchedulingPolicy, Server};
//! use respkv::storage::{start_expiry_sweeper, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&store));
//!
//!     let server = Server::bind("127.0.0.1:6379", store, SchedulingPolicy::Concurrent).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `EXPIRE key seconds`
//!
//! ## Module Overview
//!
//! - [`protocol`]: frames, replies, the incremental decoder
//! - [`storage`]: the store and its expiry sweeper
//! - [`commands`]: the command dispatcher
//! - [`connection`]: per-client read/dispatch/write loop
//! - [`server`]: listener and scheduling policy
//! - [`client`]: a minimal client
//! - [`config`]: command-line configuration

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Frame, FrameDecoder, ProtocolError, Reply};
pub use server::{SchedulingPolicy, Server};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, Store};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
