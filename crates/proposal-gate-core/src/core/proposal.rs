// crates/proposal-gate-core/src/core/proposal.rs
// ============================================================================
// Module: Proposal Model
// Description: Proposal records, lifecycle statuses, and status transitions.
// Purpose: Canonical representation of a pending or decided agent mutation.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Proposal`] is an agent-suggested mutation awaiting a human decision.
//! Statuses only move forward: nothing ever re-enters `PENDING`, and the
//! terminal statuses (`EXECUTED`, `FAILED`, `REJECTED`, `EXPIRED`) never
//! change. Stores apply transitions as compare-and-set on the current status
//! so concurrent deciders cannot both win.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ProposalId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::tooling::ToolName;
use crate::core::trust::TrustTier;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; execution claimed or not yet available.
    Confirmed,
    /// Declined by the operator.
    Rejected,
    /// Not decided before its expiry instant.
    Expired,
    /// Executor succeeded.
    Executed,
    /// Executor failed.
    Failed,
}

impl ProposalStatus {
    /// Returns the canonical wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from its wire label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            "EXECUTED" => Some(Self::Executed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true when no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Expired | Self::Executed | Self::Failed)
    }

    /// Returns true when `self -> next` is an allowed lifecycle transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Rejected | Self::Expired)
                | (Self::Confirmed, Self::Executed | Self::Failed)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Proposal Record
// ============================================================================

/// Persisted proposal.
///
/// # Invariants
/// - `tenant_id`, `tool_name`, `payload`, `preview`, and `expires_at` never change after creation.
/// - `result` is only set on `EXECUTED`; `error` is only set on `FAILED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal identifier.
    pub proposal_id: ProposalId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Session the proposal was raised in.
    pub session_id: SessionId,
    /// Tool that will perform the mutation.
    pub tool_name: ToolName,
    /// Human-readable summary of the operation.
    pub operation: String,
    /// Trust tier at creation time.
    pub trust_tier: TrustTier,
    /// Whether a human decision was required.
    pub requires_approval: bool,
    /// Tool arguments.
    pub payload: Value,
    /// Snapshot of the intended effect, computed once at creation.
    pub preview: Value,
    /// Current lifecycle status.
    pub status: ProposalStatus,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Instant after which the proposal can no longer be decided.
    pub expires_at: Timestamp,
    /// Instant the proposal was confirmed.
    pub confirmed_at: Option<Timestamp>,
    /// Instant execution finished.
    pub executed_at: Option<Timestamp>,
    /// Executor result document.
    pub result: Option<Value>,
    /// Sanitized executor error.
    pub error: Option<String>,
}

impl Proposal {
    /// Returns true when the proposal can no longer be decided at `now`.
    #[must_use]
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Applies a status transition to this record.
    pub fn apply(&mut self, transition: &StatusTransition) {
        self.status = transition.to;
        match transition.to {
            ProposalStatus::Confirmed => self.confirmed_at = Some(transition.at),
            ProposalStatus::Executed => {
                self.executed_at = Some(transition.at);
                self.result.clone_from(&transition.result);
            }
            ProposalStatus::Failed => {
                self.executed_at = Some(transition.at);
                self.error.clone_from(&transition.error);
            }
            ProposalStatus::Pending | ProposalStatus::Rejected | ProposalStatus::Expired => {}
        }
    }
}

/// Conditional status update.
///
/// Stores apply the transition only when the current status equals `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    /// Required current status.
    pub from: ProposalStatus,
    /// Status to move to.
    pub to: ProposalStatus,
    /// Instant of the transition.
    pub at: Timestamp,
    /// Result document for `EXECUTED`.
    pub result: Option<Value>,
    /// Error message for `FAILED`.
    pub error: Option<String>,
}

impl StatusTransition {
    /// Builds a transition without result or error payloads.
    #[must_use]
    pub const fn new(from: ProposalStatus, to: ProposalStatus, at: Timestamp) -> Self {
        Self {
            from,
            to,
            at,
            result: None,
            error: None,
        }
    }

    /// Builds the `CONFIRMED -> EXECUTED` transition carrying `result`.
    #[must_use]
    pub fn executed(result: Value, at: Timestamp) -> Self {
        Self {
            from: ProposalStatus::Confirmed,
            to: ProposalStatus::Executed,
            at,
            result: Some(result),
            error: None,
        }
    }

    /// Builds the `CONFIRMED -> FAILED` transition carrying `error`.
    #[must_use]
    pub fn failed(error: String, at: Timestamp) -> Self {
        Self {
            from: ProposalStatus::Confirmed,
            to: ProposalStatus::Failed,
            at,
            result: None,
            error: Some(error),
        }
    }

    /// Returns true when the transition is allowed by the lifecycle.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

// ============================================================================
// SECTION: Listing
// ============================================================================

/// Optional filters for tenant-scoped proposal listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalFilter {
    /// Restrict to one session.
    pub session_id: Option<SessionId>,
    /// Restrict to one status.
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    /// Returns true when `proposal` matches the filter.
    #[must_use]
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.session_id.as_ref().is_none_or(|session| *session == proposal.session_id)
            && self.status.is_none_or(|status| status == proposal.status)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
