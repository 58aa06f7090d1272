// crates/proposal-gate-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Validate SQLite proposal, audit, and document behavior.
// Purpose: Ensure durable persistence, conditional writes, and integrity checks.
// Dependencies: proposal-gate-store-sqlite, proposal-gate-core, rusqlite, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Conformance tests for the SQLite-backed store. Exercises tenant scoping,
//! compare-and-set transitions, version-guarded writes, locked transactions,
//! and fail-closed loads of tampered rows.

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
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use proposal_gate_core::ApprovalMode;
use proposal_gate_core::AuditLog;
use proposal_gate_core::AuditLogEntry;
use proposal_gate_core::ConfirmOutcome;
use proposal_gate_core::CreateProposalRequest;
use proposal_gate_core::DocumentStore;
use proposal_gate_core::ExecutionErrorKind;
use proposal_gate_core::ExecutorRegistry;
use proposal_gate_core::ManualClock;
use proposal_gate_core::Proposal;
use proposal_gate_core::ProposalController;
use proposal_gate_core::ProposalControllerConfig;
use proposal_gate_core::ProposalFilter;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::ProposalStore;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SaveOutcome;
use proposal_gate_core::SessionId;
use proposal_gate_core::StatusTransition;
use proposal_gate_core::StoreError;
use proposal_gate_core::TenantId;
use proposal_gate_core::Timestamp;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::ValidatedPayload;
use proposal_gate_core::builtin_validator_registry;
use proposal_gate_core::lock_key::catalog_lock_key;
use proposal_gate_core::read_modify_write;
use proposal_gate_core::save_guarded;
use proposal_gate_core::with_locked_transaction;
use proposal_gate_store_sqlite::SqliteProposalStore;
use proposal_gate_store_sqlite::SqliteStoreConfig;
use proposal_gate_store_sqlite::SqliteStoreError;
use proposal_gate_store_sqlite::SqliteStoreMode;
use proposal_gate_store_sqlite::SqliteSyncMode;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const START_MS: i64 = 1_700_000_000_000;
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn store_for(path: &std::path::Path) -> SqliteProposalStore {
    let config = SqliteStoreConfig {
        path: path.to_path_buf(),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Normal,
    };
    SqliteProposalStore::new(config).expect("store init")
}

fn sample_proposal(tenant: &str, id: &str, created_ms: i64) -> Proposal {
    Proposal {
        proposal_id: ProposalId::new(id),
        tenant_id: TenantId::new(tenant),
        session_id: SessionId::new("session-1"),
        tool_name: ToolName::UpdatePackagePrice,
        operation: "Set pkg-1 price to 4999".to_string(),
        trust_tier: TrustTier::T2,
        requires_approval: true,
        payload: json!({ "packageId": "pkg-1", "price": 4999 }),
        preview: json!({ "before": 3999, "after": 4999 }),
        status: ProposalStatus::Pending,
        created_at: Timestamp::from_unix_millis(created_ms),
        expires_at: Timestamp::from_unix_millis(created_ms + 30 * 60 * 1000),
        confirmed_at: None,
        executed_at: None,
        result: None,
        error: None,
    }
}

fn confirm_transition(at_ms: i64) -> StatusTransition {
    StatusTransition::new(
        ProposalStatus::Pending,
        ProposalStatus::Confirmed,
        Timestamp::from_unix_millis(at_ms),
    )
}

// ============================================================================
// SECTION: Proposals
// ============================================================================

#[test]
fn sqlite_proposal_roundtrip_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    {
        let store = store_for(&path);
        store.insert(&proposal).unwrap();
    }
    let reopened = store_for(&path);
    let loaded = reopened.get(&proposal.tenant_id, &proposal.proposal_id).unwrap();
    assert_eq!(loaded, Some(proposal));
    reopened.readiness().unwrap();
}

#[test]
fn sqlite_get_is_tenant_scoped() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    store.insert(&proposal).unwrap();
    assert!(store.get(&TenantId::new("tenant-b"), &proposal.proposal_id).unwrap().is_none());
    let transition = confirm_transition(START_MS + 1);
    assert!(
        store
            .transition(&TenantId::new("tenant-b"), &proposal.proposal_id, &transition)
            .unwrap()
            .is_none()
    );
}

#[test]
fn sqlite_duplicate_insert_is_conflict() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    store.insert(&proposal).unwrap();
    let err = store.insert(&proposal).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn sqlite_transition_is_compare_and_set() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    store.insert(&proposal).unwrap();

    let confirmed = store
        .transition(&proposal.tenant_id, &proposal.proposal_id, &confirm_transition(START_MS + 5))
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.status, ProposalStatus::Confirmed);
    assert_eq!(confirmed.confirmed_at, Some(Timestamp::from_unix_millis(START_MS + 5)));

    let lost = store
        .transition(&proposal.tenant_id, &proposal.proposal_id, &confirm_transition(START_MS + 6))
        .unwrap();
    assert!(lost.is_none());

    let executed = StatusTransition::executed(
        json!({ "price": 4999 }),
        Timestamp::from_unix_millis(START_MS + 10),
    );
    let done = store
        .transition(&proposal.tenant_id, &proposal.proposal_id, &executed)
        .unwrap()
        .unwrap();
    assert_eq!(done.status, ProposalStatus::Executed);
    assert_eq!(done.result, Some(json!({ "price": 4999 })));
}

#[test]
fn sqlite_rejects_disallowed_transitions() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    store.insert(&proposal).unwrap();
    let backwards = StatusTransition::new(
        ProposalStatus::Executed,
        ProposalStatus::Pending,
        Timestamp::from_unix_millis(START_MS),
    );
    let err = store.transition(&proposal.tenant_id, &proposal.proposal_id, &backwards).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn sqlite_list_orders_filters_and_limits() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let tenant = TenantId::new("tenant-a");
    for idx in 0 .. 4 {
        let mut proposal = sample_proposal("tenant-a", &format!("prop_{idx}"), START_MS + idx);
        if idx % 2 == 1 {
            proposal.session_id = SessionId::new("session-2");
        }
        store.insert(&proposal).unwrap();
    }
    store.insert(&sample_proposal("tenant-b", "prop_other", START_MS + 100)).unwrap();

    let all = store.list(&tenant, &ProposalFilter::default(), 10).unwrap();
    let ids: Vec<&str> = all.iter().map(|p| p.proposal_id.as_str()).collect();
    assert_eq!(ids, vec!["prop_3", "prop_2", "prop_1", "prop_0"]);

    let limited = store.list(&tenant, &ProposalFilter::default(), 2).unwrap();
    assert_eq!(limited.len(), 2);

    let session = ProposalFilter {
        session_id: Some(SessionId::new("session-2")),
        status: None,
    };
    let ids: Vec<String> = store
        .list(&tenant, &session, 10)
        .unwrap()
        .into_iter()
        .map(|p| p.proposal_id.to_string())
        .collect();
    assert_eq!(ids, vec!["prop_3".to_string(), "prop_1".to_string()]);

    store
        .transition(&tenant, &ProposalId::new("prop_0"), &confirm_transition(START_MS + 50))
        .unwrap();
    let confirmed = ProposalFilter {
        session_id: None,
        status: Some(ProposalStatus::Confirmed),
    };
    let listed = store.list(&tenant, &confirmed, 10).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].proposal_id.as_str(), "prop_0");
}

#[test]
fn sqlite_expire_pending_respects_deadline_tenant_and_batch() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    store.insert(&sample_proposal("tenant-a", "prop_a1", START_MS)).unwrap();
    store.insert(&sample_proposal("tenant-a", "prop_a2", START_MS + 1)).unwrap();
    store.insert(&sample_proposal("tenant-b", "prop_b1", START_MS)).unwrap();
    store.insert(&sample_proposal("tenant-a", "prop_fresh", START_MS + 60 * 60 * 1000)).unwrap();

    let now = Timestamp::from_unix_millis(START_MS + 31 * 60 * 1000);
    let tenant_a = TenantId::new("tenant-a");
    assert_eq!(store.expire_pending(Some(&tenant_a), now, 1).unwrap(), 1);
    assert_eq!(store.expire_pending(Some(&tenant_a), now, 10).unwrap(), 1);
    assert_eq!(store.expire_pending(Some(&tenant_a), now, 10).unwrap(), 0);

    let b1 = store.get(&TenantId::new("tenant-b"), &ProposalId::new("prop_b1")).unwrap().unwrap();
    assert_eq!(b1.status, ProposalStatus::Pending);
    assert_eq!(store.expire_pending(None, now, 10).unwrap(), 1);

    let fresh = store.get(&tenant_a, &ProposalId::new("prop_fresh")).unwrap().unwrap();
    assert_eq!(fresh.status, ProposalStatus::Pending);
}

#[test]
fn sqlite_tampered_record_fails_closed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    let store = store_for(&path);
    let proposal = sample_proposal("tenant-a", "prop_1", START_MS);
    store.insert(&proposal).unwrap();

    let connection = Connection::open(&path).unwrap();
    connection
        .execute(
            "UPDATE proposals SET status = 'EXECUTED' WHERE proposal_id = ?1",
            params!["prop_1"],
        )
        .unwrap();
    let err = store.get(&proposal.tenant_id, &proposal.proposal_id).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));

    connection
        .execute(
            "UPDATE proposals SET status = 'PENDING', record_json = ?1 WHERE proposal_id = ?2",
            params![b"not json".to_vec(), "prop_1"],
        )
        .unwrap();
    let err = store.get(&proposal.tenant_id, &proposal.proposal_id).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn sqlite_rejects_unknown_schema_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.sqlite");
    drop(store_for(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", params![]).unwrap();
    drop(connection);

    let result = SqliteProposalStore::new(SqliteStoreConfig::for_path(&path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn sqlite_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let result = SqliteProposalStore::new(SqliteStoreConfig::for_path(temp.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

#[test]
fn sqlite_audit_entries_are_scoped_and_ordered() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let tenant = TenantId::new("tenant-a");
    let proposal_id = ProposalId::new("prop_1");
    for (idx, success) in [(0_i64, false), (1, true)] {
        store
            .append(&AuditLogEntry {
                tenant_id: tenant.clone(),
                session_id: SessionId::new("session-1"),
                tool_name: ToolName::UpdatePackagePrice,
                proposal_id: proposal_id.clone(),
                input_summary: format!("attempt {idx}"),
                output_summary: "ok".to_string(),
                trust_tier: TrustTier::T2,
                approval_mode: ApprovalMode::Explicit,
                duration_ms: 3,
                success,
                error_message: None,
                recorded_at: Timestamp::from_unix_millis(START_MS + idx),
            })
            .unwrap();
    }
    let entries = store.entries_for(&tenant, &proposal_id).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].input_summary, "attempt 0");
    assert!(entries[1].success);
    assert!(store.entries_for(&TenantId::new("tenant-b"), &proposal_id).unwrap().is_empty());
}

// ============================================================================
// SECTION: Documents
// ============================================================================

#[test]
fn sqlite_version_guard_reports_current_version() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let tenant = TenantId::new("tenant-a");
    let resource = ResourceId::new("storefront:draft");

    assert_eq!(store.load(&tenant, &resource).unwrap().version, 0);
    for expected in 0 .. 3 {
        let outcome =
            store.try_save(&tenant, &resource, &json!({ "rev": expected }), expected).unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                new_version: expected + 1
            }
        );
    }
    let first = store.try_save(&tenant, &resource, &json!({ "writer": "a" }), 3).unwrap();
    let second = store.try_save(&tenant, &resource, &json!({ "writer": "b" }), 3).unwrap();
    assert_eq!(
        first,
        SaveOutcome::Saved {
            new_version: 4
        }
    );
    assert_eq!(
        second,
        SaveOutcome::Conflict {
            current_version: 4
        }
    );
    let stale_insert = store.try_save(&tenant, &resource, &json!({}), 0).unwrap();
    assert_eq!(
        stale_insert,
        SaveOutcome::Conflict {
            current_version: 4
        }
    );
    let loaded = store.load(&tenant, &resource).unwrap();
    assert_eq!(loaded.document, json!({ "writer": "a" }));
    assert_eq!(store.load(&TenantId::new("tenant-b"), &resource).unwrap().version, 0);
}

#[test]
fn sqlite_locked_transaction_commits_and_rolls_back() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let tenant = TenantId::new("tenant-a");
    let draft = ResourceId::new("storefront:draft");
    let catalog = ResourceId::new("catalog:packages");

    let committed = with_locked_transaction(
        &store,
        &tenant,
        catalog_lock_key(&tenant),
        LOCK_TIMEOUT,
        |tx| save_guarded(tx, &draft, json!({ "title": "Studio" }), 0),
    )
    .unwrap();
    assert_eq!(committed.new_version, 1);

    let err = with_locked_transaction(
        &store,
        &tenant,
        catalog_lock_key(&tenant),
        LOCK_TIMEOUT,
        |tx| {
            save_guarded(tx, &draft, json!({ "title": "Changed" }), 1)?;
            save_guarded(tx, &catalog, json!({}), 9)
        },
    )
    .unwrap_err();
    assert_eq!(err.kind, ExecutionErrorKind::ConcurrentModification);

    let reread = store.load(&tenant, &draft).unwrap();
    assert_eq!(reread.version, 1);
    assert_eq!(reread.document, json!({ "title": "Studio" }));
}

#[test]
fn sqlite_locked_read_modify_write_never_loses_updates() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let tenant = TenantId::new("tenant-a");
    let resource = ResourceId::new("counter");
    let workers = 4;
    let increments = 10;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0 .. workers)
        .map(|_| {
            let store = store.clone();
            let tenant = tenant.clone();
            let resource = resource.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0 .. increments {
                    read_modify_write(
                        &store,
                        &tenant,
                        &resource,
                        catalog_lock_key(&tenant),
                        LOCK_TIMEOUT,
                        |current| Ok(json!(current.document.as_u64().unwrap_or(0) + 1)),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let total = u64::try_from(workers * increments).unwrap();
    let stored = store.load(&tenant, &resource).unwrap();
    assert_eq!(stored.document, json!(total));
    assert_eq!(stored.version, total);
}

// ============================================================================
// SECTION: Controller Integration
// ============================================================================

#[test]
fn sqlite_backed_controller_executes_once_and_replays() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("store.sqlite"));
    let documents = store.clone();
    let mut executors = ExecutorRegistry::new();
    executors
        .register(
            ToolName::UpdatePackagePrice,
            move |tenant: &TenantId, payload: &ValidatedPayload| {
                let price = payload.value()["price"].clone();
                let package = payload.value()["packageId"].as_str().unwrap_or_default().to_string();
                let write = read_modify_write(
                    &documents,
                    tenant,
                    &ResourceId::new("catalog:packages"),
                    catalog_lock_key(tenant),
                    LOCK_TIMEOUT,
                    |current| {
                        let mut catalog = current.object_or_empty();
                        catalog.insert(package.clone(), json!({ "price": price }));
                        Ok(Value::Object(catalog))
                    },
                )?;
                Ok(json!({ "catalogVersion": write.new_version }))
            },
        )
        .unwrap();
    let clock = ManualClock::new(Timestamp::from_unix_millis(START_MS));
    let controller = ProposalController::new(
        store.clone(),
        store.clone(),
        clock,
        TrustTierPolicy::new(),
        builtin_validator_registry().unwrap(),
        executors,
        ProposalControllerConfig::default(),
    )
    .unwrap();

    let tenant = TenantId::new("tenant-a");
    let created = controller
        .create(CreateProposalRequest {
            tenant_id: tenant.clone(),
            session_id: SessionId::new("session-1"),
            tool_name: ToolName::UpdatePackagePrice,
            operation: "Set pkg-1 price to 4999".to_string(),
            payload: json!({ "packageId": "pkg-1", "price": 4999 }),
            preview: json!({}),
        })
        .unwrap();
    let id = created.proposal.proposal_id;

    let first = controller.confirm(&tenant, &id).unwrap();
    assert!(matches!(first, ConfirmOutcome::Executed { replayed: false, .. }));
    let second = controller.confirm(&tenant, &id).unwrap();
    assert!(matches!(second, ConfirmOutcome::Executed { replayed: true, .. }));

    let catalog = store.load(&tenant, &ResourceId::new("catalog:packages")).unwrap();
    assert_eq!(catalog.version, 1);
    assert_eq!(catalog.document["pkg-1"]["price"], json!(4999));
    assert_eq!(store.entries_for(&tenant, &id).unwrap().len(), 1);
}
