//! Storage Module
//!
//! The in-memory key-value store and its background expiry sweeper.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │                Store                 │
//! │   Mutex<HashMap<key, Entry>>         │
//! │   Entry = value + optional expiry    │
//! └──────────────────────────────────────┘
//!                    ▲
//!                    │ purge_expired()
//!      ┌─────────────┴─────────────┐
//!      │       ExpirySweeper       │
//!      │  (Background Tokio Task)  │
//!      └───────────────────────────┘
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, PurgeStats, Store, StoreError};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
