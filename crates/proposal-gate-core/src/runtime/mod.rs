// crates/proposal-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Proposal Gate Runtime
// Description: Lifecycle controller, registries, locks, and in-memory backends.
// Purpose: Execute the proposal lifecycle against injected collaborators.
// Dependencies: crate::{core, interfaces}, jsonschema
// ============================================================================

//! ## Overview
//! Runtime modules implement the proposal lifecycle, the tool registries,
//! transaction locks, guarded document writes, and in-memory stores. Every
//! host surface calls into the same controller so lifecycle rules are
//! enforced in one place.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod lifecycle;
pub mod locks;
pub mod registry;
pub mod schemas;
pub mod store;
pub mod version_guard;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use lifecycle::ConfirmOutcome;
pub use lifecycle::DEFAULT_EXPIRY_BATCH;
pub use lifecycle::DEFAULT_LIST_LIMIT;
pub use lifecycle::DEFAULT_PROPOSAL_TTL_MS;
pub use lifecycle::ControllerError;
pub use lifecycle::CreateOutcome;
pub use lifecycle::CreateProposalRequest;
pub use lifecycle::MAX_LIST_LIMIT;
pub use lifecycle::ProposalController;
pub use lifecycle::ProposalControllerConfig;
pub use locks::AdvisoryLockGuard;
pub use locks::AdvisoryLockTable;
pub use locks::LockError;
pub use registry::ExecutorRegistry;
pub use registry::PayloadValidationError;
pub use registry::PayloadValidatorRegistry;
pub use registry::RegistryError;
pub use registry::SharedExecutor;
pub use schemas::builtin_schema;
pub use schemas::builtin_validator_registry;
pub use store::InMemoryDocumentStore;
pub use store::InMemoryProposalStore;
pub use store::SharedAuditLog;
pub use store::SharedDocumentStore;
pub use store::SharedProposalStore;
pub use version_guard::GuardedWrite;
pub use version_guard::read_modify_write;
pub use version_guard::save_guarded;
pub use version_guard::with_locked_transaction;
