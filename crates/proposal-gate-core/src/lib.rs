// crates/proposal-gate-core/src/lib.rs
// ============================================================================
// Module: Proposal Gate Core Library
// Description: Public API surface for the Proposal Gate core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Proposal Gate core lets an agent propose tenant data mutations that only
//! run after trust-tier gating and, where required, a human decision. It
//! pairs a compare-and-set proposal state machine with transaction locks and
//! optimistic version checks on tenant documents. Persistence and mutation
//! logic plug in through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditLog;
pub use interfaces::DocumentStore;
pub use interfaces::DocumentTransaction;
pub use interfaces::ExecutionError;
pub use interfaces::ExecutionErrorKind;
pub use interfaces::INTERNAL_EXECUTION_MESSAGE;
pub use interfaces::MutationExecutor;
pub use interfaces::ProposalStore;
pub use interfaces::StoreError;
pub use runtime::AdvisoryLockGuard;
pub use runtime::AdvisoryLockTable;
pub use runtime::ConfirmOutcome;
pub use runtime::ControllerError;
pub use runtime::CreateOutcome;
pub use runtime::CreateProposalRequest;
pub use runtime::ExecutorRegistry;
pub use runtime::GuardedWrite;
pub use runtime::InMemoryDocumentStore;
pub use runtime::InMemoryProposalStore;
pub use runtime::LockError;
pub use runtime::PayloadValidationError;
pub use runtime::PayloadValidatorRegistry;
pub use runtime::ProposalController;
pub use runtime::ProposalControllerConfig;
pub use runtime::RegistryError;
pub use runtime::SharedAuditLog;
pub use runtime::SharedDocumentStore;
pub use runtime::SharedExecutor;
pub use runtime::SharedProposalStore;
pub use runtime::builtin_schema;
pub use runtime::builtin_validator_registry;
pub use runtime::read_modify_write;
pub use runtime::save_guarded;
pub use runtime::with_locked_transaction;
