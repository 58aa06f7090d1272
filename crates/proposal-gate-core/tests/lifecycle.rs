// crates/proposal-gate-core/tests/lifecycle.rs
// ============================================================================
// Module: Proposal Lifecycle Tests
// Description: Create, confirm, reject, expiry, and tenant isolation behavior.
// Purpose: Pin lifecycle ordering rules and terminal-state monotonicity.
// ============================================================================

//! ## Overview
//! Drives the proposal controller over in-memory stores with a manual clock.

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

use proposal_gate_core::ApprovalMode;
use proposal_gate_core::AuditLog;
use proposal_gate_core::ConfirmOutcome;
use proposal_gate_core::ControllerError;
use proposal_gate_core::ExecutionError;
use proposal_gate_core::ExecutorRegistry;
use proposal_gate_core::ProposalControllerConfig;
use proposal_gate_core::ProposalFilter;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::SessionId;
use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use serde_json::json;

use crate::common::CatalogPriceExecutor;
use crate::common::CountingExecutor;
use crate::common::harness;
use crate::common::harness_with;
use crate::common::price_request;
use crate::common::registry_with;
use crate::common::request_for;

// ============================================================================
// SECTION: Create
// ============================================================================

#[test]
fn create_persists_pending_proposal_with_ttl() {
    let h = harness(ExecutorRegistry::new());
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    let proposal = created.proposal;
    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert_eq!(proposal.trust_tier, TrustTier::T2);
    assert!(proposal.requires_approval);
    assert!(created.execution.is_none());
    assert_eq!(proposal.expires_at.millis_since(proposal.created_at), 30 * 60 * 1000);
}

#[test]
fn create_rejects_blank_operation() {
    let h = harness(ExecutorRegistry::new());
    let mut request = price_request("tenant-a", "pkg-1", 4999);
    request.operation = "   ".to_string();
    let err = h.controller.create(request).unwrap_err();
    assert!(matches!(err, ControllerError::InvalidRequest(_)));
}

#[test]
fn tier_one_proposals_execute_automatically() {
    let executor = CountingExecutor::succeeding(json!({ "phase": "storefront" }));
    let h = harness(registry_with(ToolName::UpdateOnboardingPhase, executor.clone()));
    let created = h
        .controller
        .create(request_for(
            "tenant-a",
            ToolName::UpdateOnboardingPhase,
            json!({ "phase": "storefront" }),
        ))
        .unwrap();
    assert_eq!(created.proposal.status, ProposalStatus::Executed);
    assert!(!created.proposal.requires_approval);
    assert!(matches!(created.execution, Some(Ok(ConfirmOutcome::Executed { .. }))));
    assert_eq!(executor.call_count(), 1);

    let entries =
        h.store.entries_for(&created.proposal.tenant_id, &created.proposal.proposal_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].approval_mode, ApprovalMode::Automatic);
    assert!(entries[0].success);
}

#[test]
fn tier_three_proposals_never_auto_execute() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::RecordBalancePayment, executor.clone()));
    let created = h
        .controller
        .create(request_for(
            "tenant-a",
            ToolName::RecordBalancePayment,
            json!({ "bookingId": "bk-1", "amount": 1500 }),
        ))
        .unwrap();
    assert_eq!(created.proposal.status, ProposalStatus::Pending);
    assert_eq!(created.proposal.trust_tier, TrustTier::T3);
    assert_eq!(executor.call_count(), 0);
}

// ============================================================================
// SECTION: Confirm
// ============================================================================

#[test]
fn confirm_executes_and_reconfirm_replays_without_duplicate_write() {
    let executor = CatalogPriceExecutor::new();
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    let id = created.proposal.proposal_id;

    let first = h.controller.confirm(&tenant, &id).unwrap();
    let ConfirmOutcome::Executed {
        proposal,
        result,
        replayed,
    } = first
    else {
        panic!("expected execution");
    };
    assert!(!replayed);
    assert_eq!(proposal.status, ProposalStatus::Executed);
    assert_eq!(result["price"], json!(4999));
    assert_eq!(executor.price_of(&tenant, "pkg-1"), Some(4999));

    let second = h.controller.confirm(&tenant, &id).unwrap();
    let ConfirmOutcome::Executed {
        result: replayed_result,
        replayed,
        ..
    } = second
    else {
        panic!("expected replay");
    };
    assert!(replayed);
    assert_eq!(replayed_result, result);
    assert_eq!(executor.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.store.entries_for(&tenant, &id).unwrap().len(), 1);
}

#[test]
fn confirm_without_executor_is_not_executable() {
    let h = harness(ExecutorRegistry::new());
    let tenant = TenantId::new("tenant-a");
    let created = h
        .controller
        .create(request_for(
            "tenant-a",
            ToolName::CreateBooking,
            json!({ "packageId": "pkg-1", "date": "2026-11-02", "customerEmail": "a@b.co" }),
        ))
        .unwrap();
    let outcome = h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap();
    let ConfirmOutcome::NotExecutable {
        proposal,
    } = outcome
    else {
        panic!("expected not executable");
    };
    assert_eq!(proposal.status, ProposalStatus::Confirmed);
    assert!(proposal.confirmed_at.is_some());
    assert!(proposal.executed_at.is_none());

    let again = h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap();
    assert!(matches!(again, ConfirmOutcome::NotExecutable { .. }));
}

#[test]
fn invalid_payload_is_rejected_before_storage() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let err = h
        .controller
        .create(request_for("tenant-a", ToolName::UpdatePackagePrice, json!({ "price": "free" })))
        .unwrap_err();
    assert!(matches!(err, ControllerError::Validation(_)));
    assert_eq!(executor.call_count(), 0);
    let stored = h.controller.list(&tenant, &ProposalFilter::default(), None).unwrap();
    assert!(stored.is_empty());
}

#[test]
fn invalid_auto_approved_payload_never_executes() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::UpdateOnboardingPhase, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let err = h
        .controller
        .create(request_for("tenant-a", ToolName::UpdateOnboardingPhase, json!({ "phase": 7 })))
        .unwrap_err();
    assert!(matches!(err, ControllerError::Validation(_)));
    assert_eq!(executor.call_count(), 0);
    assert!(h.controller.list(&tenant, &ProposalFilter::default(), None).unwrap().is_empty());
}

#[test]
fn executor_failure_marks_proposal_failed_and_audits() {
    let executor = CountingExecutor::failing(ExecutionError::rejected("package is archived"));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    let id = created.proposal.proposal_id;

    let err = h.controller.confirm(&tenant, &id).unwrap_err();
    let ControllerError::ExecutionFailed {
        proposal,
        error,
    } = err
    else {
        panic!("expected execution failure");
    };
    assert_eq!(proposal.status, ProposalStatus::Failed);
    assert!(proposal.error.as_deref().unwrap_or_default().contains("package is archived"));
    assert_eq!(error.message, "package is archived");

    let entries = h.store.entries_for(&tenant, &id).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].error_message.is_some());

    let again = h.controller.confirm(&tenant, &id).unwrap_err();
    assert!(matches!(
        again,
        ControllerError::Conflict {
            status: ProposalStatus::Failed,
            ..
        }
    ));
}

// ============================================================================
// SECTION: Reject
// ============================================================================

#[test]
fn reject_then_confirm_conflicts() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-2", 1000)).unwrap();
    let id = created.proposal.proposal_id;

    let rejected = h.controller.reject(&tenant, &id).unwrap();
    assert_eq!(rejected.status, ProposalStatus::Rejected);

    let err = h.controller.confirm(&tenant, &id).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Conflict {
            status: ProposalStatus::Rejected,
            ..
        }
    ));
    assert_eq!(executor.call_count(), 0);

    let err = h.controller.reject(&tenant, &id).unwrap_err();
    assert!(matches!(err, ControllerError::Conflict { .. }));
}

#[test]
fn reject_executed_proposal_conflicts() {
    let executor = CountingExecutor::succeeding(json!({ "ok": true }));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap();
    let err = h.controller.reject(&tenant, &created.proposal.proposal_id).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Conflict {
            status: ProposalStatus::Executed,
            ..
        }
    ));
}

// ============================================================================
// SECTION: Expiry
// ============================================================================

#[test]
fn confirm_after_expiry_never_reaches_executor() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    h.clock.advance_millis(30 * 60 * 1000);

    let err = h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap_err();
    assert!(matches!(err, ControllerError::Expired(_)));
    assert_eq!(executor.call_count(), 0);
    let current = h.controller.get(&tenant, &created.proposal.proposal_id).unwrap();
    assert_eq!(current.status, ProposalStatus::Expired);

    let err = h.controller.reject(&tenant, &created.proposal.proposal_id).unwrap_err();
    assert!(matches!(err, ControllerError::Expired(_)));
}

#[test]
fn executed_proposals_keep_reporting_outcome_after_expiry() {
    let executor = CountingExecutor::succeeding(json!({ "done": true }));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let tenant = TenantId::new("tenant-a");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap();
    h.clock.advance_millis(2 * 60 * 60 * 1000);

    let replay = h.controller.confirm(&tenant, &created.proposal.proposal_id).unwrap();
    assert!(matches!(replay, ConfirmOutcome::Executed { replayed: true, .. }));
    assert_eq!(executor.call_count(), 1);
}

#[test]
fn sweep_expires_only_stale_pending_proposals() {
    let h = harness(ExecutorRegistry::new());
    let tenant = TenantId::new("tenant-a");
    let stale = h.controller.create(price_request("tenant-a", "pkg-1", 100)).unwrap();
    h.clock.advance_millis(20 * 60 * 1000);
    let fresh = h.controller.create(price_request("tenant-a", "pkg-2", 200)).unwrap();
    h.clock.advance_millis(15 * 60 * 1000);

    assert_eq!(h.controller.expire_stale().unwrap(), 1);
    assert_eq!(
        h.controller.get(&tenant, &stale.proposal.proposal_id).unwrap().status,
        ProposalStatus::Expired
    );
    assert_eq!(
        h.controller.get(&tenant, &fresh.proposal.proposal_id).unwrap().status,
        ProposalStatus::Pending
    );
}

// ============================================================================
// SECTION: Tenant Isolation
// ============================================================================

#[test]
fn other_tenants_cannot_see_or_decide_proposals() {
    let executor = CountingExecutor::succeeding(json!({}));
    let h = harness(registry_with(ToolName::UpdatePackagePrice, executor.clone()));
    let owner = TenantId::new("tenant-a");
    let intruder = TenantId::new("tenant-b");
    let created = h.controller.create(price_request("tenant-a", "pkg-1", 4999)).unwrap();
    let id = created.proposal.proposal_id;

    assert!(matches!(h.controller.get(&intruder, &id), Err(ControllerError::NotFound(_))));
    assert!(matches!(h.controller.confirm(&intruder, &id), Err(ControllerError::NotFound(_))));
    assert!(matches!(h.controller.reject(&intruder, &id), Err(ControllerError::NotFound(_))));
    assert!(h.controller.list(&intruder, &ProposalFilter::default(), None).unwrap().is_empty());
    assert_eq!(executor.call_count(), 0);
    assert_eq!(h.controller.get(&owner, &id).unwrap().status, ProposalStatus::Pending);
}

#[test]
fn unknown_proposal_is_not_found() {
    let h = harness(ExecutorRegistry::new());
    let err = h
        .controller
        .confirm(&TenantId::new("tenant-a"), &ProposalId::new("prop_missing"))
        .unwrap_err();
    assert!(matches!(err, ControllerError::NotFound(_)));
}

// ============================================================================
// SECTION: Listing
// ============================================================================

#[test]
fn list_is_newest_first_filtered_and_clamped() {
    let config = ProposalControllerConfig {
        max_list_limit: 3,
        default_list_limit: 2,
        ..ProposalControllerConfig::default()
    };
    let h = harness_with(ExecutorRegistry::new(), config);
    let tenant = TenantId::new("tenant-a");
    let mut ids = Vec::new();
    for price in 0..5 {
        let mut request = price_request("tenant-a", "pkg-1", price);
        if price % 2 == 0 {
            request.session_id = SessionId::new("session-2");
        }
        ids.push(h.controller.create(request).unwrap().proposal.proposal_id);
        h.clock.advance_millis(1_000);
    }

    let default_page = h.controller.list(&tenant, &ProposalFilter::default(), None).unwrap();
    assert_eq!(default_page.len(), 2);
    assert_eq!(default_page[0].proposal_id, ids[4]);
    assert_eq!(default_page[1].proposal_id, ids[3]);

    let clamped = h.controller.list(&tenant, &ProposalFilter::default(), Some(500)).unwrap();
    assert_eq!(clamped.len(), 3);

    let session_filter = ProposalFilter {
        session_id: Some(SessionId::new("session-2")),
        status: None,
    };
    let session_page = h.controller.list(&tenant, &session_filter, Some(3)).unwrap();
    assert_eq!(
        session_page.iter().map(|p| p.proposal_id.clone()).collect::<Vec<_>>(),
        vec![ids[4].clone(), ids[2].clone(), ids[0].clone()]
    );

    h.controller.reject(&tenant, &ids[1]).unwrap();
    let rejected_filter = ProposalFilter {
        session_id: None,
        status: Some(ProposalStatus::Rejected),
    };
    let rejected = h.controller.list(&tenant, &rejected_filter, None).unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].proposal_id, ids[1]);
}

#[test]
fn list_reports_lazily_expired_proposals() {
    let h = harness(ExecutorRegistry::new());
    let tenant = TenantId::new("tenant-a");
    h.controller.create(price_request("tenant-a", "pkg-1", 100)).unwrap();
    h.clock.advance_millis(31 * 60 * 1000);
    let pending = ProposalFilter {
        session_id: None,
        status: Some(ProposalStatus::Pending),
    };
    assert!(h.controller.list(&tenant, &pending, None).unwrap().is_empty());
}
