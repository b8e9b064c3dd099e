//! Key-Value Store with Expiry Support
//!
//! The store maps byte-string keys to byte-string values, each with an
//! optional absolute expiry instant.
//!
//! ## Design Decisions
//!
//! 1. **One Mutex**: The value and its expiry live in the same `Entry`, and
//!    a single lock guards the whole map. A reader can never observe a new
//!    value paired with a stale expiry, or the reverse.
//! 2. **Lazy Expiry**: Every lookup re-checks the expiry against "now", and
//!    removes the entry if it has passed. The background sweeper in
//!    [`expiry`](crate::storage::expiry) only reclaims memory early.
//! 3. **Short Critical Sections**: The lock is held for the map operation
//!    itself, never across socket I/O.
//!
//! ## Time
//!
//! Expiry instants come from `tokio::time::Instant`, which is monotonic and
//! can be paused and advanced in tests. An entry whose expiry equals "now"
//! is already expired.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors for store inputs that cannot be stored.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// A TTL of zero was given
    #[error("ttl must be positive")]
    NonPositiveTtl,

    /// The TTL does not fit on the clock
    #[error("ttl out of range")]
    TtlOutOfRange,
}

/// A stored value with its optional expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Outcome of one [`Store::purge_expired`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    /// Entries removed by this pass
    pub expired: usize,
    /// Entries left in the map afterwards
    pub remaining: usize,
}

/// The process-wide key-value store.
///
/// Created once at startup, wrapped in an `Arc` and handed to every
/// connection. All operations take `&self` and are thread-safe.
///
/// # Example
///
/// ```
/// use respkv::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = Store::new();
/// store.set(Bytes::from("name"), Bytes::from("Ariz"), None).unwrap();
/// assert_eq!(store.get(b"name"), Some(Bytes::from("Ariz")));
///
/// store
///     .set(Bytes::from("session"), Bytes::from("abc"), Some(Duration::from_secs(60)))
///     .unwrap();
/// assert!(store.set(Bytes::from("bad"), Bytes::new(), Some(Duration::ZERO)).is_err());
/// ```
#[derive(Debug, Default)]
pub struct Store {
    entries: Mutex<HashMap<Bytes, Entry>>,

    /// Statistics: number of entries removed because they expired
    expired_count: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry write leaves the map consistent, so a panic elsewhere
    /// while the lock was held does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(ttl: Duration) -> Result<Instant, StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::NonPositiveTtl);
        }
        Instant::now()
            .checked_add(ttl)
            .ok_or(StoreError::TtlOutOfRange)
    }

    /// Upserts `key`.
    ///
    /// With a TTL the entry expires at now + ttl. Without one, any expiry
    /// left over from an earlier SET is dropped along with the old value.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(Self::deadline).transpose()?;
        self.lock().insert(key, Entry { value, expires_at });
        Ok(())
    }

    /// Returns the value for `key`, unless it is absent or expired.
    ///
    /// An expired entry is removed before returning `None`.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Sets a new expiry on an existing key.
    ///
    /// Returns `Ok(false)` without changing anything if the key is absent
    /// or already expired.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> Result<bool, StoreError> {
        let deadline = Self::deadline(ttl)?;
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            }
            Some(_) => {}
            None => return Ok(false),
        }

        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }
        Ok(true)
    }

    /// Remaining time to live.
    ///
    /// `None` if the key is absent, `Some(None)` if it never expires.
    pub fn ttl(&self, key: &[u8]) -> Option<Option<Duration>> {
        let now = Instant::now();
        let entries = self.lock();

        let entry = entries.get(key).filter(|e| !e.is_expired_at(now))?;
        Some(entry.expires_at.map(|exp| exp - now))
    }

    /// Deletes `key`. Returns `true` if a live entry was removed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        match self.lock().remove(key) {
            Some(entry) => !entry.is_expired_at(now),
            None => false,
        }
    }

    /// Removes every entry whose expiry has passed, under a single lock.
    pub fn purge_expired(&self) -> PurgeStats {
        let now = Instant::now();
        let mut entries = self.lock();

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let remaining = entries.len();
        let expired = before - remaining;

        self.expired_count
            .fetch_add(expired as u64, Ordering::Relaxed);
        PurgeStats { expired, remaining }
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries removed because they expired.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }
}
