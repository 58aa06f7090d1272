// crates/proposal-gate-core/src/core/audit.rs
// ============================================================================
// Module: Proposal Audit Entries
// Description: Append-only business audit records for proposal decisions.
// Purpose: Record who decided what, how long execution took, and the outcome.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! One [`AuditLogEntry`] is written for every confirm, reject, or automatic
//! execution. Summaries are bounded so raw payloads never flood the log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ProposalId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::tooling::ToolName;
use crate::core::trust::ApprovalMode;
use crate::core::trust::TrustTier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum characters kept in an audit summary.
pub const MAX_SUMMARY_CHARS: usize = 500;
/// Marker appended to truncated summaries.
const TRUNCATION_MARKER: char = '…';

// ============================================================================
// SECTION: Audit Entry
// ============================================================================

/// Business audit record for a proposal decision.
///
/// # Invariants
/// - Entries are append-only.
/// - `input_summary` and `output_summary` hold at most [`MAX_SUMMARY_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Session the proposal was raised in.
    pub session_id: SessionId,
    /// Tool the proposal targets.
    pub tool_name: ToolName,
    /// Proposal the entry describes.
    pub proposal_id: ProposalId,
    /// Bounded summary of the operation and payload.
    pub input_summary: String,
    /// Bounded summary of the result or error.
    pub output_summary: String,
    /// Trust tier recorded on the proposal.
    pub trust_tier: TrustTier,
    /// How the decision was made.
    pub approval_mode: ApprovalMode,
    /// Wall time spent in the executor.
    pub duration_ms: u64,
    /// Whether the action succeeded.
    pub success: bool,
    /// Sanitized error message for failed actions.
    pub error_message: Option<String>,
    /// Instant the entry was recorded.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Truncates `text` to [`MAX_SUMMARY_CHARS`] characters on a char boundary.
#[must_use]
pub fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_SUMMARY_CHARS - 1).collect();
    truncated.push(TRUNCATION_MARKER);
    truncated
}

/// Renders a JSON value as a bounded summary.
#[must_use]
pub fn summarize_value(value: &Value) -> String {
    truncate_summary(&value.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
