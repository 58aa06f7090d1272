// crates/proposal-gate-core/src/runtime/locks.rs
// ============================================================================
// Module: Advisory Lock Table
// Description: In-process transaction-scoped locks keyed by derived lock keys.
// Purpose: Serialize read-modify-write sequences on the same tenant resource.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! [`AdvisoryLockTable`] grants exclusive ownership of a [`LockKey`] to one
//! holder at a time. Waits are bounded; a waiter that exceeds its bound gets
//! [`LockError::Timeout`] and never proceeds without the lock. Ownership is
//! held by an RAII [`AdvisoryLockGuard`], so every exit path releases it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::LockKey;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lock acquisition errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock was not released within the wait bound.
    #[error("lock {key} not acquired within {waited_ms} ms")]
    Timeout {
        /// Contended key.
        key: LockKey,
        /// Time spent waiting.
        waited_ms: u128,
    },
    /// The lock table mutex was poisoned.
    #[error("lock table mutex poisoned")]
    Poisoned,
}

impl From<LockError> for StoreError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { .. } => Self::LockTimeout(err.to_string()),
            LockError::Poisoned => Self::Store(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Lock Table
// ============================================================================

/// Shared lock state.
#[derive(Debug, Default)]
struct LockTableInner {
    /// Keys currently held.
    held: Mutex<BTreeSet<LockKey>>,
    /// Signalled whenever a key is released.
    released: Condvar,
}

/// Table of exclusive, transaction-scoped locks.
///
/// # Invariants
/// - At most one guard exists per key at any instant.
/// - Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryLockTable {
    /// Shared lock state.
    inner: Arc<LockTableInner>,
}

impl AdvisoryLockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `key`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the key stays held past the bound.
    pub fn acquire(&self, key: LockKey, timeout: Duration) -> Result<AdvisoryLockGuard, LockError> {
        let started = Instant::now();
        let mut held = self.inner.held.lock().map_err(|_| LockError::Poisoned)?;
        while held.contains(&key) {
            let waited = started.elapsed();
            let Some(remaining) = timeout.checked_sub(waited).filter(|left| !left.is_zero())
            else {
                return Err(LockError::Timeout {
                    key,
                    waited_ms: waited.as_millis(),
                });
            };
            let (next, _) = self
                .inner
                .released
                .wait_timeout(held, remaining)
                .map_err(|_| LockError::Poisoned)?;
            held = next;
        }
        held.insert(key);
        drop(held);
        Ok(AdvisoryLockGuard {
            table: Arc::clone(&self.inner),
            key,
        })
    }

    /// Returns true when `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: LockKey) -> bool {
        self.inner.held.lock().map(|held| held.contains(&key)).unwrap_or(true)
    }
}

/// Exclusive ownership of one lock key; released on drop.
#[derive(Debug)]
pub struct AdvisoryLockGuard {
    /// Table the key belongs to.
    table: Arc<LockTableInner>,
    /// Held key.
    key: LockKey,
}

impl AdvisoryLockGuard {
    /// Returns the held key.
    #[must_use]
    pub const fn key(&self) -> LockKey {
        self.key
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        let mut held = match self.table.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.key);
        drop(held);
        self.table.released.notify_all();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use std::thread;
    use std::time::Duration;

    use super::AdvisoryLockTable;
    use super::LockError;
    use crate::core::LockKey;

    #[test]
    fn contended_key_times_out() {
        let table = AdvisoryLockTable::new();
        let key = LockKey::from_raw(7);
        let _guard = table.acquire(key, Duration::from_millis(10)).unwrap();
        let err = table.acquire(key, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let table = AdvisoryLockTable::new();
        let _first = table.acquire(LockKey::from_raw(1), Duration::from_millis(10)).unwrap();
        let second = table.acquire(LockKey::from_raw(2), Duration::from_millis(10));
        assert!(second.is_ok());
    }

    #[test]
    fn release_wakes_waiter() {
        let table = AdvisoryLockTable::new();
        let key = LockKey::from_raw(-3);
        let guard = table.acquire(key, Duration::from_millis(10)).unwrap();
        let waiter = {
            let table = table.clone();
            thread::spawn(move || table.acquire(key, Duration::from_secs(5)).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(50));
        drop(guard);
        assert!(waiter.join().unwrap().is_ok());
        assert!(!table.is_held(key));
    }
}
