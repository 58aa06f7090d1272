// crates/proposal-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Proposal Store
// Description: Durable proposal, audit, and document backend using SQLite WAL.
// Purpose: Provide production persistence for the proposal lifecycle.
// Dependencies: proposal-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteProposalStore`], a single `SQLite` database that
//! implements the proposal store, the business audit log, and the versioned
//! tenant document store. Status transitions and version-guarded writes are
//! conditional statements, so concurrent writers never overwrite each other.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteProposalStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
