// crates/proposal-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Proposal Gate In-Memory Stores
// Description: In-memory proposal, audit, and document stores plus shared wrappers.
// Purpose: Provide deterministic backends for tests, demos, and local serving.
// Dependencies: crate::{core, interfaces, runtime::locks}, serde_json
// ============================================================================

//! ## Overview
//! This module provides in-memory implementations of [`ProposalStore`],
//! [`AuditLog`], and [`DocumentStore`] with the same tenant-scoping and
//! compare-and-set semantics as the durable backends. State lives only as
//! long as the process. The `Shared*` wrappers erase the backend type so
//! hosts can pick a backend at startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::core::AuditLogEntry;
use crate::core::LockKey;
use crate::core::Proposal;
use crate::core::ProposalFilter;
use crate::core::ProposalId;
use crate::core::ProposalStatus;
use crate::core::ResourceId;
use crate::core::SaveOutcome;
use crate::core::StatusTransition;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::VersionedDocument;
use crate::interfaces::AuditLog;
use crate::interfaces::DocumentStore;
use crate::interfaces::DocumentTransaction;
use crate::interfaces::ProposalStore;
use crate::interfaces::StoreError;
use crate::runtime::locks::AdvisoryLockGuard;
use crate::runtime::locks::AdvisoryLockTable;

// ============================================================================
// SECTION: In-Memory Proposal Store
// ============================================================================

/// In-memory proposal store and audit log.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProposalStore {
    /// Proposals keyed by identifier.
    proposals: Arc<Mutex<BTreeMap<ProposalId, Proposal>>>,
    /// Audit entries in append order.
    audit: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl InMemoryProposalStore {
    /// Creates an empty in-memory proposal store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProposalStore for InMemoryProposalStore {
    fn insert(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut guard = self
            .proposals
            .lock()
            .map_err(|_| StoreError::Store("proposal store mutex poisoned".to_string()))?;
        if guard.contains_key(&proposal.proposal_id) {
            return Err(StoreError::Conflict(format!(
                "proposal already exists: {}",
                proposal.proposal_id
            )));
        }
        guard.insert(proposal.proposal_id.clone(), proposal.clone());
        drop(guard);
        Ok(())
    }

    fn get(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Option<Proposal>, StoreError> {
        let guard = self
            .proposals
            .lock()
            .map_err(|_| StoreError::Store("proposal store mutex poisoned".to_string()))?;
        Ok(guard.get(proposal_id).filter(|proposal| proposal.tenant_id == *tenant_id).cloned())
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ProposalFilter,
        limit: usize,
    ) -> Result<Vec<Proposal>, StoreError> {
        let mut proposals: Vec<Proposal> = {
            let guard = self
                .proposals
                .lock()
                .map_err(|_| StoreError::Store("proposal store mutex poisoned".to_string()))?;
            guard
                .values()
                .filter(|proposal| proposal.tenant_id == *tenant_id && filter.matches(proposal))
                .cloned()
                .collect()
        };
        proposals.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| b.proposal_id.cmp(&a.proposal_id))
        });
        proposals.truncate(limit);
        Ok(proposals)
    }

    fn transition(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
        transition: &StatusTransition,
    ) -> Result<Option<Proposal>, StoreError> {
        if !transition.is_allowed() {
            return Err(StoreError::Invalid(format!(
                "transition {} -> {} is not allowed",
                transition.from, transition.to
            )));
        }
        let mut guard = self
            .proposals
            .lock()
            .map_err(|_| StoreError::Store("proposal store mutex poisoned".to_string()))?;
        let Some(proposal) = guard.get_mut(proposal_id) else {
            return Ok(None);
        };
        if proposal.tenant_id != *tenant_id || proposal.status != transition.from {
            return Ok(None);
        }
        proposal.apply(transition);
        Ok(Some(proposal.clone()))
    }

    fn expire_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: Timestamp,
        limit: usize,
    ) -> Result<usize, StoreError> {
        let mut guard = self
            .proposals
            .lock()
            .map_err(|_| StoreError::Store("proposal store mutex poisoned".to_string()))?;
        let expiry = StatusTransition::new(ProposalStatus::Pending, ProposalStatus::Expired, now);
        let mut expired = 0;
        for proposal in guard.values_mut() {
            if expired >= limit {
                break;
            }
            let tenant_matches = tenant_id.is_none_or(|tenant| proposal.tenant_id == *tenant);
            if tenant_matches
                && proposal.status == ProposalStatus::Pending
                && proposal.is_past_expiry(now)
            {
                proposal.apply(&expiry);
                expired += 1;
            }
        }
        drop(guard);
        Ok(expired)
    }
}

impl AuditLog for InMemoryProposalStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.audit
            .lock()
            .map_err(|_| StoreError::Store("audit log mutex poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries_for(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let guard = self
            .audit
            .lock()
            .map_err(|_| StoreError::Store("audit log mutex poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|entry| entry.tenant_id == *tenant_id && entry.proposal_id == *proposal_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: In-Memory Document Store
// ============================================================================

/// Stored documents keyed by tenant and resource.
type DocumentMap = BTreeMap<String, VersionedDocument>;

/// In-memory versioned document store with an in-process lock table.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    /// Documents keyed by `tenant/resource`.
    documents: Arc<Mutex<DocumentMap>>,
    /// Transaction locks.
    locks: AdvisoryLockTable,
}

impl InMemoryDocumentStore {
    /// Creates an empty document store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn load(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
    ) -> Result<VersionedDocument, StoreError> {
        load_document(&self.documents, tenant_id, resource)
    }

    fn try_save(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        compare_and_save(&self.documents, tenant_id, resource, document, expected_version)
            .map(|(outcome, _)| outcome)
    }

    fn begin_locked(
        &self,
        tenant_id: &TenantId,
        lock_key: LockKey,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentTransaction + Send>, StoreError> {
        let guard = self.locks.acquire(lock_key, timeout)?;
        Ok(Box::new(InMemoryDocumentTransaction {
            documents: Arc::clone(&self.documents),
            tenant_id: tenant_id.clone(),
            undo: Vec::new(),
            committed: false,
            _guard: guard,
        }))
    }
}

/// Undo record for one write made inside a transaction.
#[derive(Debug)]
struct UndoRecord {
    /// Document key.
    key: String,
    /// Snapshot before the write.
    previous: Option<VersionedDocument>,
    /// Version the write produced.
    written_version: u64,
}

/// Lock-holding in-memory transaction.
///
/// Writes apply immediately; dropping without commit restores the previous
/// snapshots in reverse order.
#[derive(Debug)]
struct InMemoryDocumentTransaction {
    /// Shared document map.
    documents: Arc<Mutex<DocumentMap>>,
    /// Tenant scope.
    tenant_id: TenantId,
    /// Writes to revert on rollback.
    undo: Vec<UndoRecord>,
    /// Whether commit completed.
    committed: bool,
    /// Held lock, released on drop.
    _guard: AdvisoryLockGuard,
}

impl DocumentTransaction for InMemoryDocumentTransaction {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    fn load(&mut self, resource: &ResourceId) -> Result<VersionedDocument, StoreError> {
        load_document(&self.documents, &self.tenant_id, resource)
    }

    fn try_save(
        &mut self,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        let (outcome, previous) = compare_and_save(
            &self.documents,
            &self.tenant_id,
            resource,
            document,
            expected_version,
        )?;
        if let SaveOutcome::Saved {
            new_version,
        } = outcome
        {
            self.undo.push(UndoRecord {
                key: document_key(&self.tenant_id, resource),
                previous,
                written_version: new_version,
            });
        }
        Ok(outcome)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for InMemoryDocumentTransaction {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        let mut documents = match self.documents.lock() {
            Ok(documents) => documents,
            Err(poisoned) => poisoned.into_inner(),
        };
        for record in self.undo.drain(..).rev() {
            let still_ours = documents
                .get(&record.key)
                .is_some_and(|current| current.version == record.written_version);
            if !still_ours {
                continue;
            }
            match record.previous {
                Some(previous) => {
                    documents.insert(record.key, previous);
                }
                None => {
                    documents.remove(&record.key);
                }
            }
        }
    }
}

/// Builds the map key for a tenant document.
fn document_key(tenant_id: &TenantId, resource: &ResourceId) -> String {
    format!("{tenant_id}/{resource}")
}

/// Reads a document snapshot, returning the empty snapshot when absent.
fn load_document(
    documents: &Mutex<DocumentMap>,
    tenant_id: &TenantId,
    resource: &ResourceId,
) -> Result<VersionedDocument, StoreError> {
    let guard = documents
        .lock()
        .map_err(|_| StoreError::Store("document store mutex poisoned".to_string()))?;
    Ok(guard
        .get(&document_key(tenant_id, resource))
        .cloned()
        .unwrap_or_else(|| VersionedDocument::empty(resource.clone())))
}

/// Applies the version guard; returns the outcome and the replaced snapshot.
fn compare_and_save(
    documents: &Mutex<DocumentMap>,
    tenant_id: &TenantId,
    resource: &ResourceId,
    document: &Value,
    expected_version: u64,
) -> Result<(SaveOutcome, Option<VersionedDocument>), StoreError> {
    let key = document_key(tenant_id, resource);
    let mut guard = documents
        .lock()
        .map_err(|_| StoreError::Store("document store mutex poisoned".to_string()))?;
    let current_version = guard.get(&key).map_or(0, |current| current.version);
    if current_version != expected_version {
        return Ok((
            SaveOutcome::Conflict {
                current_version,
            },
            None,
        ));
    }
    let new_version = current_version + 1;
    let previous = guard.insert(
        key,
        VersionedDocument {
            resource: resource.clone(),
            document: document.clone(),
            version: new_version,
        },
    );
    drop(guard);
    Ok((
        SaveOutcome::Saved {
            new_version,
        },
        previous,
    ))
}

// ============================================================================
// SECTION: Shared Store Wrappers
// ============================================================================

/// Shared proposal store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedProposalStore {
    /// Inner store implementation.
    inner: Arc<dyn ProposalStore + Send + Sync>,
}

impl SharedProposalStore {
    /// Wraps a proposal store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl ProposalStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn ProposalStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl ProposalStore for SharedProposalStore {
    fn insert(&self, proposal: &Proposal) -> Result<(), StoreError> {
        self.inner.insert(proposal)
    }

    fn get(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Option<Proposal>, StoreError> {
        self.inner.get(tenant_id, proposal_id)
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ProposalFilter,
        limit: usize,
    ) -> Result<Vec<Proposal>, StoreError> {
        self.inner.list(tenant_id, filter, limit)
    }

    fn transition(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
        transition: &StatusTransition,
    ) -> Result<Option<Proposal>, StoreError> {
        self.inner.transition(tenant_id, proposal_id, transition)
    }

    fn expire_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: Timestamp,
        limit: usize,
    ) -> Result<usize, StoreError> {
        self.inner.expire_pending(tenant_id, now, limit)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

/// Shared audit log backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedAuditLog {
    /// Inner audit log implementation.
    inner: Arc<dyn AuditLog + Send + Sync>,
}

impl SharedAuditLog {
    /// Wraps an audit log in a shared, clonable wrapper.
    #[must_use]
    pub fn from_log(log: impl AuditLog + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(log),
        }
    }

    /// Wraps an existing shared audit log.
    #[must_use]
    pub const fn new(log: Arc<dyn AuditLog + Send + Sync>) -> Self {
        Self {
            inner: log,
        }
    }
}

impl AuditLog for SharedAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.inner.append(entry)
    }

    fn entries_for(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.inner.entries_for(tenant_id, proposal_id)
    }
}

/// Shared document store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedDocumentStore {
    /// Inner document store implementation.
    inner: Arc<dyn DocumentStore + Send + Sync>,
}

impl SharedDocumentStore {
    /// Wraps a document store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl DocumentStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn DocumentStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl DocumentStore for SharedDocumentStore {
    fn load(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
    ) -> Result<VersionedDocument, StoreError> {
        self.inner.load(tenant_id, resource)
    }

    fn try_save(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        self.inner.try_save(tenant_id, resource, document, expected_version)
    }

    fn begin_locked(
        &self,
        tenant_id: &TenantId,
        lock_key: LockKey,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentTransaction + Send>, StoreError> {
        self.inner.begin_locked(tenant_id, lock_key, timeout)
    }
}
