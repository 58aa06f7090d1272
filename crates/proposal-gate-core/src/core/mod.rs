// crates/proposal-gate-core/src/core/mod.rs
// ============================================================================
// Module: Proposal Gate Core Types
// Description: Canonical proposal, trust, lock, and document types.
// Purpose: Provide stable, serializable types shared by every surface.
// Dependencies: rand, serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define proposals and their statuses, trust tiers, lock keys,
//! versioned documents, and audit entries. These types are the canonical
//! source of truth for the HTTP surface and the storage backends.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod document;
pub mod identifiers;
pub mod lock_key;
pub mod payload;
pub mod proposal;
pub mod time;
pub mod tooling;
pub mod trust;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditLogEntry;
pub use audit::MAX_SUMMARY_CHARS;
pub use audit::summarize_value;
pub use audit::truncate_summary;
pub use document::SaveOutcome;
pub use document::VersionedDocument;
pub use identifiers::ProposalId;
pub use identifiers::ResourceId;
pub use identifiers::SessionId;
pub use identifiers::TenantId;
pub use lock_key::LockKey;
pub use lock_key::derive_lock_key;
pub use payload::ValidatedPayload;
pub use proposal::Proposal;
pub use proposal::ProposalFilter;
pub use proposal::ProposalStatus;
pub use proposal::StatusTransition;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use tooling::ToolName;
pub use trust::ApprovalMode;
pub use trust::TrustPolicyError;
pub use trust::TrustTier;
pub use trust::TrustTierPolicy;
pub use trust::base_tier;
