// crates/proposal-gate-core/tests/failures.rs
// ============================================================================
// Module: Failure Handling Tests
// Description: Storage faults during execution and outcome persistence.
// Purpose: Pin sanitized failure text and reconciliation of unrecorded outcomes.
// ============================================================================

//! ## Overview
//! Injects failing document and proposal stores around the controller and
//! asserts what the proposal, the audit log, and the error expose.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use proposal_gate_core::AuditLog;
use proposal_gate_core::ConfirmOutcome;
use proposal_gate_core::ControllerError;
use proposal_gate_core::DocumentStore;
use proposal_gate_core::DocumentTransaction;
use proposal_gate_core::ExecutionError;
use proposal_gate_core::ExecutionErrorKind;
use proposal_gate_core::INTERNAL_EXECUTION_MESSAGE;
use proposal_gate_core::InMemoryProposalStore;
use proposal_gate_core::LockKey;
use proposal_gate_core::ManualClock;
use proposal_gate_core::MutationExecutor;
use proposal_gate_core::Proposal;
use proposal_gate_core::ProposalController;
use proposal_gate_core::ProposalControllerConfig;
use proposal_gate_core::ProposalFilter;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::ProposalStore;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SaveOutcome;
use proposal_gate_core::StatusTransition;
use proposal_gate_core::StoreError;
use proposal_gate_core::TenantId;
use proposal_gate_core::Timestamp;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::ValidatedPayload;
use proposal_gate_core::VersionedDocument;
use proposal_gate_core::builtin_validator_registry;
use proposal_gate_core::lock_key::catalog_lock_key;
use proposal_gate_core::read_modify_write;
use serde_json::Value;
use serde_json::json;

use crate::common::CountingExecutor;
use crate::common::LOCK_TIMEOUT;
use crate::common::START_MS;
use crate::common::catalog_resource;
use crate::common::harness;
use crate::common::price_request;
use crate::common::registry_with;

/// Driver text that must stay out of proposals and audit entries.
const DRIVER_TEXT: &str = "disk I/O error at /var/lib/gate.db";

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Document store whose every call fails with a driver error.
struct BrokenDocumentStore;

impl DocumentStore for BrokenDocumentStore {
    fn load(&self, _: &TenantId, _: &ResourceId) -> Result<VersionedDocument, StoreError> {
        Err(StoreError::Store(DRIVER_TEXT.to_string()))
    }

    fn try_save(
        &self,
        _: &TenantId,
        _: &ResourceId,
        _: &Value,
        _: u64,
    ) -> Result<SaveOutcome, StoreError> {
        Err(StoreError::Store(DRIVER_TEXT.to_string()))
    }

    fn begin_locked(
        &self,
        _: &TenantId,
        _: LockKey,
        _: Duration,
    ) -> Result<Box<dyn DocumentTransaction + Send>, StoreError> {
        Err(StoreError::Store(DRIVER_TEXT.to_string()))
    }
}

/// Catalog executor over [`BrokenDocumentStore`].
struct BrokenCatalogExecutor;

impl MutationExecutor for BrokenCatalogExecutor {
    fn execute(
        &self,
        tenant_id: &TenantId,
        _payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError> {
        let write = read_modify_write(
            &BrokenDocumentStore,
            tenant_id,
            &catalog_resource(),
            catalog_lock_key(tenant_id),
            LOCK_TIMEOUT,
            |current| Ok(current.document.clone()),
        )?;
        Ok(json!({ "catalogVersion": write.new_version }))
    }
}

/// Proposal store that fails the next `failures` post-execution transitions.
#[derive(Clone)]
struct FlakyFinishStore {
    /// Backing store.
    inner: InMemoryProposalStore,
    /// Remaining transitions out of `CONFIRMED` to fail.
    failures: Arc<AtomicUsize>,
}

impl FlakyFinishStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryProposalStore::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
        }
    }
}

impl ProposalStore for FlakyFinishStore {
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
        let finishing = transition.from == ProposalStatus::Confirmed;
        let failing = finishing
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
        if failing {
            return Err(StoreError::Store("database is locked".to_string()));
        }
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
}

type FlakyController = ProposalController<FlakyFinishStore, InMemoryProposalStore, ManualClock>;

fn flaky_controller(
    failures: usize,
    executor: CountingExecutor,
) -> (FlakyController, FlakyFinishStore, InMemoryProposalStore) {
    let store = FlakyFinishStore::new(failures);
    let audit = InMemoryProposalStore::new();
    let controller = ProposalController::new(
        store.clone(),
        audit.clone(),
        ManualClock::new(Timestamp::from_unix_millis(START_MS)),
        TrustTierPolicy::new(),
        builtin_validator_registry().unwrap(),
        registry_with(ToolName::UpdatePackagePrice, executor),
        ProposalControllerConfig::default(),
    )
    .unwrap();
    (controller, store, audit)
}

// ============================================================================
// SECTION: Sanitized Failures
// ============================================================================

#[test]
fn internal_store_failure_keeps_driver_text_out_of_the_proposal() {
    let h = harness(registry_with(ToolName::UpdatePackagePrice, BrokenCatalogExecutor));
    let tenant = TenantId::new("tenant-a");
    let id =
        h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap().proposal.proposal_id;

    let err = h.controller.confirm(&tenant, &id).unwrap_err();
    assert!(!err.to_string().contains(DRIVER_TEXT));
    let ControllerError::ExecutionFailed {
        proposal,
        error,
    } = err
    else {
        panic!("expected execution failure");
    };
    assert_eq!(error.kind, ExecutionErrorKind::Internal);
    assert!(error.message.contains(DRIVER_TEXT));

    let stored_error = proposal.error.unwrap();
    assert!(stored_error.contains(INTERNAL_EXECUTION_MESSAGE));
    assert!(!stored_error.contains(DRIVER_TEXT));
    let fetched = h.controller.get(&tenant, &id).unwrap();
    assert_eq!(fetched.status, ProposalStatus::Failed);
    assert_eq!(fetched.error.as_deref(), Some(stored_error.as_str()));

    let entries = h.store.entries_for(&tenant, &id).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(!entries[0].output_summary.contains(DRIVER_TEXT));
    assert!(entries[0].error_message.as_deref().is_some_and(|text| !text.contains(DRIVER_TEXT)));
}

#[test]
fn business_rejections_keep_their_message() {
    let executor = CountingExecutor::failing(ExecutionError::rejected("package is archived"));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor));
    let tenant = TenantId::new("tenant-a");
    let id =
        h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap().proposal.proposal_id;

    let err = h.controller.confirm(&tenant, &id).unwrap_err();
    assert!(err.to_string().contains("package is archived"));
    let fetched = h.controller.get(&tenant, &id).unwrap();
    assert_eq!(fetched.error.as_deref(), Some("rejected: package is archived"));
}

// ============================================================================
// SECTION: Unrecorded Outcomes
// ============================================================================

#[test]
fn transient_finish_failure_is_retried() {
    let executor = CountingExecutor::succeeding(json!({ "ok": true }));
    let (controller, _, audit) = flaky_controller(1, executor.clone());
    let tenant = TenantId::new("tenant-a");
    let id =
        controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap().proposal.proposal_id;

    let outcome = controller.confirm(&tenant, &id).unwrap();
    let ConfirmOutcome::Executed {
        proposal, ..
    } = outcome
    else {
        panic!("expected executed outcome");
    };
    assert_eq!(proposal.status, ProposalStatus::Executed);
    assert_eq!(executor.call_count(), 1);
    let entries = audit.entries_for(&tenant, &id).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
}

#[test]
fn persistent_finish_failure_is_audited_without_rerunning() {
    let executor = CountingExecutor::succeeding(json!({ "ok": true }));
    let (controller, store, audit) = flaky_controller(usize::MAX, executor.clone());
    let tenant = TenantId::new("tenant-a");
    let id =
        controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap().proposal.proposal_id;

    let err = controller.confirm(&tenant, &id).unwrap_err();
    assert!(matches!(err, ControllerError::Store(_)));
    assert_eq!(executor.call_count(), 1);

    let stuck = store.get(&tenant, &id).unwrap().unwrap();
    assert_eq!(stuck.status, ProposalStatus::Confirmed);
    let entries = audit.entries_for(&tenant, &id).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].error_message.as_deref().is_some_and(|text| text.contains("EXECUTED")));

    let again = controller.confirm(&tenant, &id).unwrap();
    assert!(matches!(again, ConfirmOutcome::InFlight { .. }));
    assert_eq!(executor.call_count(), 1);
}
