// crates/proposal-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Proposal Gate Interfaces
// Description: Backend-agnostic traits for stores, audit logs, and executors.
// Purpose: Define the contracts the lifecycle controller depends on.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces decouple the lifecycle controller from persistence and from the
//! business logic of individual mutations. Every lookup takes the tenant
//! identifier so backends can put it in the query predicate; a row owned by
//! another tenant is indistinguishable from a missing row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AuditLogEntry;
use crate::core::LockKey;
use crate::core::Proposal;
use crate::core::ProposalFilter;
use crate::core::ProposalId;
use crate::core::ResourceId;
use crate::core::SaveOutcome;
use crate::core::StatusTransition;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::ValidatedPayload;
use crate::core::VersionedDocument;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage errors shared by every backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("proposal store io error: {0}")]
    Io(String),
    /// Stored data fails to decode.
    #[error("proposal store corruption: {0}")]
    Corrupt(String),
    /// Stored schema version is incompatible.
    #[error("proposal store version mismatch: {0}")]
    VersionMismatch(String),
    /// Caller supplied invalid data.
    #[error("proposal store invalid data: {0}")]
    Invalid(String),
    /// A uniqueness constraint was violated.
    #[error("proposal store conflict: {0}")]
    Conflict(String),
    /// A transaction lock was not acquired within its bound.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),
    /// Store reported an error.
    #[error("proposal store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when the same request may succeed if retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}

// ============================================================================
// SECTION: Proposal Store
// ============================================================================

/// Durable proposal storage.
pub trait ProposalStore {
    /// Inserts a new proposal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the identifier already exists.
    fn insert(&self, proposal: &Proposal) -> Result<(), StoreError>;

    /// Loads a proposal owned by `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Option<Proposal>, StoreError>;

    /// Lists proposals owned by `tenant_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ProposalFilter,
        limit: usize,
    ) -> Result<Vec<Proposal>, StoreError>;

    /// Applies `transition` only when the stored status equals `transition.from`.
    ///
    /// Returns the updated proposal, or `None` when the row is missing, owned
    /// by another tenant, or no longer in the expected status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the transition is not allowed by
    /// the lifecycle.
    fn transition(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
        transition: &StatusTransition,
    ) -> Result<Option<Proposal>, StoreError>;

    /// Moves up to `limit` pending proposals whose expiry is at or before
    /// `now` to `EXPIRED`, optionally restricted to one tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    fn expire_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: Timestamp,
        limit: usize,
    ) -> Result<usize, StoreError>;

    /// Checks whether the store is ready to serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Append-only business audit log.
pub trait AuditLog {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Returns the entries recorded for one proposal, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn entries_for(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditLogEntry>, StoreError>;
}

// ============================================================================
// SECTION: Document Store
// ============================================================================

/// Versioned tenant document storage.
pub trait DocumentStore {
    /// Reads a document outside any lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn load(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
    ) -> Result<VersionedDocument, StoreError>;

    /// Writes `document` only when the stored version equals
    /// `expected_version`. Never retries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails for reasons other than a
    /// version conflict.
    fn try_save(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError>;

    /// Opens a transaction holding the lock for `lock_key`, waiting at most
    /// `timeout` for it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] when the lock is not acquired in time.
    fn begin_locked(
        &self,
        tenant_id: &TenantId,
        lock_key: LockKey,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentTransaction + Send>, StoreError>;
}

/// Lock-holding document transaction.
///
/// Dropping a transaction without committing rolls back its writes and
/// releases the lock.
pub trait DocumentTransaction {
    /// Tenant the transaction is scoped to.
    fn tenant_id(&self) -> &TenantId;

    /// Reads a document inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn load(&mut self, resource: &ResourceId) -> Result<VersionedDocument, StoreError>;

    /// Version-guarded write inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails for reasons other than a
    /// version conflict.
    fn try_save(
        &mut self,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError>;

    /// Commits the writes and releases the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; writes are rolled back.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Executors
// ============================================================================

/// Category of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Business rules refused the mutation.
    Rejected,
    /// A concurrent writer changed the target document.
    ConcurrentModification,
    /// A transaction lock was not acquired in time.
    LockTimeout,
    /// An external dependency failed.
    Dependency,
    /// Unexpected internal failure.
    Internal,
}

impl ExecutionErrorKind {
    /// Returns the canonical label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::ConcurrentModification => "concurrent_modification",
            Self::LockTimeout => "lock_timeout",
            Self::Dependency => "dependency",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Public text for [`ExecutionErrorKind::Internal`] failures.
pub const INTERNAL_EXECUTION_MESSAGE: &str = "unexpected failure while executing";

/// Executor failure. Messages must not embed raw payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    /// Failure category.
    pub kind: ExecutionErrorKind,
    /// Sanitized description.
    pub message: String,
}

impl ExecutionError {
    /// Builds an execution error.
    #[must_use]
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds a business-rule rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Rejected, message)
    }

    /// Builds an internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Internal, message)
    }

    /// Returns the text safe to persist on the proposal and return to
    /// callers. Internal failures collapse to [`INTERNAL_EXECUTION_MESSAGE`]
    /// so storage and driver details stay in server logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.kind {
            ExecutionErrorKind::Internal => {
                format!("{}: {INTERNAL_EXECUTION_MESSAGE}", self.kind)
            }
            _ => self.to_string(),
        }
    }

    /// Builds the error reported when a version-guarded write lost a race.
    #[must_use]
    pub fn concurrent_modification(resource: &ResourceId, current_version: u64) -> Self {
        Self::new(
            ExecutionErrorKind::ConcurrentModification,
            format!("{resource} changed concurrently (current version {current_version})"),
        )
    }
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(message) => Self::new(ExecutionErrorKind::LockTimeout, message),
            other => Self::internal(other.to_string()),
        }
    }
}

/// Performs the mutation behind one tool.
///
/// Executors open their own lock-guarded, version-checked transactions; the
/// lifecycle controller never holds a lock while an executor runs.
pub trait MutationExecutor {
    /// Executes the mutation for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the mutation fails.
    fn execute(
        &self,
        tenant_id: &TenantId,
        payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError>;
}

impl<F> MutationExecutor for F
where
    F: Fn(&TenantId, &ValidatedPayload) -> Result<Value, ExecutionError>,
{
    fn execute(
        &self,
        tenant_id: &TenantId,
        payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError> {
        self(tenant_id, payload)
    }
}
