// crates/proposal-gate-core/src/core/lock_key.rs
// ============================================================================
// Module: Lock Key Derivation
// Description: Stable 32-bit lock keys for tenant-scoped resources.
// Purpose: Map (tenant, resource, secondary keys) to a transaction lock key.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Lock keys are derived with FNV-1a (32-bit) over the UTF-8 bytes of the key
//! parts joined with `:`, then reinterpreted as a signed 32-bit integer. The
//! derivation is pure: every process computes the same key for the same
//! inputs, so writers in different processes serialize on the same lock.
//! Collisions only cause unnecessary serialization, never incorrect results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 16_777_619;
/// Separator byte between key parts.
const KEY_SEPARATOR: u8 = b':';

/// Discriminator for the storefront draft and live documents.
pub const STOREFRONT_DISCRIMINATOR: &str = "storefront:draft";
/// Discriminator for the package catalog document.
pub const CATALOG_DISCRIMINATOR: &str = "catalog:packages";
/// Discriminator for the onboarding document.
pub const ONBOARDING_DISCRIMINATOR: &str = "onboarding";
/// Discriminator prefix for per-booking balance ledgers.
pub const BALANCE_DISCRIMINATOR: &str = "balance";
/// Discriminator prefix for per-date booking slots.
pub const BOOKING_SLOTS_DISCRIMINATOR: &str = "booking:slots";

// ============================================================================
// SECTION: Lock Key
// ============================================================================

/// Transaction lock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(i32);

impl LockKey {
    /// Wraps a raw key value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Computes the FNV-1a 32-bit hash of `bytes`.
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| fnv1a_step(hash, *byte))
}

/// Folds one byte into a running FNV-1a hash.
fn fnv1a_step(hash: u32, byte: u8) -> u32 {
    (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
}

/// Derives the lock key for a tenant resource.
///
/// Equivalent to hashing `tenant:discriminator[:secondary...]`.
#[must_use]
pub fn derive_lock_key(tenant_id: &TenantId, discriminator: &str, secondary: &[&str]) -> LockKey {
    let mut hash = fnv1a_fold(FNV_OFFSET_BASIS, tenant_id.as_str().as_bytes());
    hash = fnv1a_step(hash, KEY_SEPARATOR);
    hash = fnv1a_fold(hash, discriminator.as_bytes());
    for part in secondary {
        hash = fnv1a_step(hash, KEY_SEPARATOR);
        hash = fnv1a_fold(hash, part.as_bytes());
    }
    LockKey(i32::from_be_bytes(hash.to_be_bytes()))
}

/// Folds a byte slice into a running FNV-1a hash.
fn fnv1a_fold(hash: u32, bytes: &[u8]) -> u32 {
    bytes.iter().fold(hash, |acc, byte| fnv1a_step(acc, *byte))
}

/// Lock key guarding the storefront draft and live documents.
#[must_use]
pub fn storefront_lock_key(tenant_id: &TenantId) -> LockKey {
    derive_lock_key(tenant_id, STOREFRONT_DISCRIMINATOR, &[])
}

/// Lock key guarding the package catalog.
#[must_use]
pub fn catalog_lock_key(tenant_id: &TenantId) -> LockKey {
    derive_lock_key(tenant_id, CATALOG_DISCRIMINATOR, &[])
}

/// Lock key guarding the onboarding document.
#[must_use]
pub fn onboarding_lock_key(tenant_id: &TenantId) -> LockKey {
    derive_lock_key(tenant_id, ONBOARDING_DISCRIMINATOR, &[])
}

/// Lock key guarding the balance ledger of one booking.
#[must_use]
pub fn balance_lock_key(tenant_id: &TenantId, booking_id: &str) -> LockKey {
    derive_lock_key(tenant_id, BALANCE_DISCRIMINATOR, &[booking_id])
}

/// Lock key guarding booking slots on one calendar date.
#[must_use]
pub fn booking_date_lock_key(tenant_id: &TenantId, date: &str) -> LockKey {
    derive_lock_key(tenant_id, BOOKING_SLOTS_DISCRIMINATOR, &[date])
}

// ============================================================================
// SECTION: Tests
// ============================================================================
