//! Connection Module
//!
//! Per-client connection handling: one handler, one socket, one decoder.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ FrameDecoder │───>│ Dispatch    │     │
//! │  └─────────────┘    └──────────────┘    └──────┬──────┘     │
//! │                                                │            │
//! │                                                ▼            │
//! │                                       ┌─────────────┐       │
//! │                                       │ Write reply │       │
//! │                                       └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, DEFAULT_MAX_BUFFER,
};
