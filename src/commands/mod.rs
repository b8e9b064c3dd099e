//! Command Module
//!
//! Receives decoded frames, executes them against the store, and returns
//! replies.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  FrameDecoder   │  (protocol module)
//! └────────┬────────┘
//!          │ Frame
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
