// crates/proposal-gate-core/src/core/time.rs
// ============================================================================
// Module: Proposal Gate Time Model
// Description: Canonical timestamps and injectable clocks.
// Purpose: Keep proposal expiry deterministic and testable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Proposal Gate stores every instant as unix epoch milliseconds. The
//! lifecycle controller never reads wall-clock time directly; hosts supply a
//! [`Clock`] so expiry can be driven deterministically in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in proposals and audit entries.
///
/// # Invariants
/// - The value is unix epoch milliseconds.
/// - Arithmetic saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a timestamp `millis` later, saturating at the representable bound.
    #[must_use]
    pub fn saturating_add_millis(self, millis: u64) -> Self {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    /// Returns whole milliseconds elapsed from `earlier` to `self` (zero when negative).
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> u64 {
        u64::try_from(self.0.saturating_sub(earlier.0)).unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Timestamp(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

/// Manually advanced clock for deterministic tests and replays.
///
/// # Invariants
/// - Clones share the same underlying instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current instant in unix milliseconds.
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a manual clock starting at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Sets the current instant.
    pub fn set(&self, now: Timestamp) {
        self.now_ms.store(now.as_unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by `millis`.
    pub fn advance_millis(&self, millis: u64) {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        let _ = self.now_ms.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(delta))
        });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
