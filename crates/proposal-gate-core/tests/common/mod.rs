// crates/proposal-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared controllers, executors, and requests for core tests.
// Purpose: Provide reusable, deterministic lifecycle test infrastructure.
// Dependencies: proposal-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Fixtures build a [`ProposalController`] over in-memory stores and a
//! manual clock, plus executors that count invocations so tests can assert
//! at-most-once execution.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use proposal_gate_core::CreateProposalRequest;
use proposal_gate_core::DocumentStore;
use proposal_gate_core::ExecutionError;
use proposal_gate_core::ExecutorRegistry;
use proposal_gate_core::InMemoryDocumentStore;
use proposal_gate_core::InMemoryProposalStore;
use proposal_gate_core::ManualClock;
use proposal_gate_core::MutationExecutor;
use proposal_gate_core::ProposalController;
use proposal_gate_core::ProposalControllerConfig;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SessionId;
use proposal_gate_core::TenantId;
use proposal_gate_core::Timestamp;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::ValidatedPayload;
use proposal_gate_core::builtin_validator_registry;
use proposal_gate_core::lock_key::catalog_lock_key;
use proposal_gate_core::read_modify_write;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Controller type used across core tests.
pub type TestController =
    ProposalController<InMemoryProposalStore, InMemoryProposalStore, ManualClock>;

/// Fixed starting instant for test clocks.
pub const START_MS: i64 = 1_700_000_000_000;

/// Bound on lock waits inside test executors.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles returned alongside a test controller.
pub struct Harness {
    /// Controller under test.
    pub controller: TestController,
    /// Backing proposal store and audit log.
    pub store: InMemoryProposalStore,
    /// Clock driving expiry.
    pub clock: ManualClock,
}

// ============================================================================
// SECTION: Executors
// ============================================================================

/// Executor that counts calls and returns a fixed result.
#[derive(Clone)]
pub struct CountingExecutor {
    /// Number of executions.
    pub calls: Arc<AtomicUsize>,
    /// Result returned on success.
    pub result: Value,
    /// Sleep before returning, to widen race windows.
    pub delay: Duration,
    /// Error to return instead of the result.
    pub failure: Option<ExecutionError>,
}

impl CountingExecutor {
    /// Creates a succeeding executor.
    pub fn succeeding(result: Value) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            result,
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// Creates a failing executor.
    pub fn failing(error: ExecutionError) -> Self {
        Self {
            failure: Some(error),
            ..Self::succeeding(Value::Null)
        }
    }

    /// Returns the number of executions so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MutationExecutor for CountingExecutor {
    fn execute(
        &self,
        _tenant_id: &TenantId,
        _payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.result.clone()),
        }
    }
}

/// Price change arguments.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceArgs {
    /// Package to update.
    package_id: String,
    /// New price in cents.
    price: i64,
}

/// Executor that writes package prices through the version guard.
#[derive(Clone)]
pub struct CatalogPriceExecutor {
    /// Backing document store.
    pub documents: InMemoryDocumentStore,
    /// Number of executions.
    pub calls: Arc<AtomicUsize>,
    /// Bound on the catalog lock wait.
    pub lock_timeout: Duration,
}

impl CatalogPriceExecutor {
    /// Creates an executor over a fresh document store.
    pub fn new() -> Self {
        Self {
            documents: InMemoryDocumentStore::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Returns a copy that gives up on the catalog lock after `timeout`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Returns the stored price for `package_id`.
    pub fn price_of(&self, tenant_id: &TenantId, package_id: &str) -> Option<i64> {
        let catalog = self.documents.load(tenant_id, &catalog_resource()).ok()?;
        catalog.document.get(package_id)?.get("price")?.as_i64()
    }
}

impl MutationExecutor for CatalogPriceExecutor {
    fn execute(
        &self,
        tenant_id: &TenantId,
        payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let args: PriceArgs =
            payload.parse().map_err(|err| ExecutionError::rejected(err.to_string()))?;
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &catalog_resource(),
            catalog_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut catalog = current.object_or_empty();
                catalog.insert(args.package_id.clone(), json!({ "price": args.price }));
                Ok(Value::Object(catalog))
            },
        )?;
        Ok(json!({
            "packageId": args.package_id,
            "price": args.price,
            "catalogVersion": write.new_version,
        }))
    }
}

/// Resource holding the package catalog.
pub fn catalog_resource() -> ResourceId {
    ResourceId::new("catalog:packages")
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds a controller with the given executors and default configuration.
pub fn harness(executors: ExecutorRegistry) -> Harness {
    harness_with(executors, ProposalControllerConfig::default())
}

/// Builds a controller with explicit configuration.
pub fn harness_with(executors: ExecutorRegistry, config: ProposalControllerConfig) -> Harness {
    let store = InMemoryProposalStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(START_MS));
    let controller = ProposalController::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        TrustTierPolicy::new(),
        builtin_validator_registry().unwrap(),
        executors,
        config,
    )
    .unwrap();
    Harness {
        controller,
        store,
        clock,
    }
}

/// Registry holding one executor for `tool`.
pub fn registry_with(
    tool: ToolName,
    executor: impl MutationExecutor + Send + Sync + 'static,
) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(tool, executor).unwrap();
    registry
}

/// Builds a price change request.
pub fn price_request(tenant: &str, package_id: &str, price: i64) -> CreateProposalRequest {
    CreateProposalRequest {
        tenant_id: TenantId::new(tenant),
        session_id: SessionId::new("session-1"),
        tool_name: ToolName::UpdatePackagePrice,
        operation: format!("Set {package_id} price to {price}"),
        payload: json!({ "packageId": package_id, "price": price }),
        preview: json!({ "packageId": package_id, "before": 3999, "after": price }),
    }
}

/// Builds a request for `tool` with an arbitrary payload.
pub fn request_for(tenant: &str, tool: ToolName, payload: Value) -> CreateProposalRequest {
    CreateProposalRequest {
        tenant_id: TenantId::new(tenant),
        session_id: SessionId::new("session-1"),
        tool_name: tool,
        operation: format!("Run {tool}"),
        payload,
        preview: json!({}),
    }
}
