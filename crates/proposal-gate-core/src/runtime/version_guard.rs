// crates/proposal-gate-core/src/runtime/version_guard.rs
// ============================================================================
// Module: Guarded Document Writes
// Description: Lock-then-version read-modify-write helpers for executors.
// Purpose: Package the acquire, re-read, compute, conditional write, commit sequence.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Every executor mutation of a tenant document follows the same sequence:
//!
//! 1. acquire the transaction lock for the derived key (bounded wait),
//! 2. re-read the document and its version inside the lock,
//! 3. compute the new document,
//! 4. write it with the version guard,
//! 5. commit, which releases the lock.
//!
//! Any error drops the transaction, rolling back and releasing the lock. A
//! version conflict is reported as
//! [`ExecutionErrorKind::ConcurrentModification`](crate::interfaces::ExecutionErrorKind)
//! and is never retried here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::core::LockKey;
use crate::core::ResourceId;
use crate::core::SaveOutcome;
use crate::core::TenantId;
use crate::core::VersionedDocument;
use crate::interfaces::DocumentStore;
use crate::interfaces::DocumentTransaction;
use crate::interfaces::ExecutionError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Committed version-guarded write.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedWrite {
    /// Document written.
    pub resource: ResourceId,
    /// Version after the write.
    pub new_version: u64,
    /// Body written.
    pub document: Value,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `work` inside a lock-holding transaction and commits on success.
///
/// # Errors
///
/// Returns [`ExecutionError`] when the lock is not acquired in time, `work`
/// fails, or the commit fails. Writes are rolled back on every error.
pub fn with_locked_transaction<D, T, F>(
    store: &D,
    tenant_id: &TenantId,
    lock_key: LockKey,
    timeout: Duration,
    work: F,
) -> Result<T, ExecutionError>
where
    D: DocumentStore + ?Sized,
    F: FnOnce(&mut (dyn DocumentTransaction + Send)) -> Result<T, ExecutionError>,
{
    let mut transaction = store.begin_locked(tenant_id, lock_key, timeout)?;
    let value = work(transaction.as_mut())?;
    transaction.commit()?;
    Ok(value)
}

/// Writes `document` to `resource` inside an open transaction, mapping a
/// version conflict to a concurrent-modification error.
///
/// # Errors
///
/// Returns [`ExecutionError`] when the version guard rejects the write or the
/// store fails.
pub fn save_guarded(
    transaction: &mut (dyn DocumentTransaction + Send),
    resource: &ResourceId,
    document: Value,
    expected_version: u64,
) -> Result<GuardedWrite, ExecutionError> {
    match transaction.try_save(resource, &document, expected_version)? {
        SaveOutcome::Saved {
            new_version,
        } => Ok(GuardedWrite {
            resource: resource.clone(),
            new_version,
            document,
        }),
        SaveOutcome::Conflict {
            current_version,
        } => Err(ExecutionError::concurrent_modification(resource, current_version)),
    }
}

/// Locks `lock_key`, re-reads `resource`, applies `mutate`, and writes the
/// result with the version guard.
///
/// # Errors
///
/// Returns [`ExecutionError`] when any step fails; nothing is written.
pub fn read_modify_write<D, F>(
    store: &D,
    tenant_id: &TenantId,
    resource: &ResourceId,
    lock_key: LockKey,
    timeout: Duration,
    mutate: F,
) -> Result<GuardedWrite, ExecutionError>
where
    D: DocumentStore + ?Sized,
    F: FnOnce(&VersionedDocument) -> Result<Value, ExecutionError>,
{
    with_locked_transaction(store, tenant_id, lock_key, timeout, |transaction| {
        let current = transaction.load(resource)?;
        let next = mutate(&current)?;
        save_guarded(transaction, resource, next, current.version)
    })
}
