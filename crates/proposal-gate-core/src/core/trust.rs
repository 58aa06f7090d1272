// crates/proposal-gate-core/src/core/trust.rs
// ============================================================================
// Module: Trust Tier Policy
// Description: Static classification of mutation tools into trust tiers.
// Purpose: Decide which proposals need human approval before execution.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every [`ToolName`] maps to exactly one [`TrustTier`]. The base mapping is
//! an exhaustive `match`, so adding a tool without classifying it fails to
//! compile. Deployments may escalate a tool to a stricter tier; lowering a
//! tier is rejected.
//!
//! - `T1`: metadata-only changes, executed without approval.
//! - `T2`: content changes, soft confirmation.
//! - `T3`: customer-facing or financial changes, explicit confirmation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::tooling::ToolName;

// ============================================================================
// SECTION: Tiers
// ============================================================================

/// Trust tier of a mutation tool, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Auto-confirmed, metadata-only.
    T1,
    /// Soft confirmation.
    T2,
    /// Explicit confirmation, never auto-approved.
    T3,
}

impl TrustTier {
    /// Returns the canonical label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::T1 => "t1",
            Self::T2 => "t2",
            Self::T3 => "t3",
        }
    }

    /// Returns true when proposals at this tier need a human decision.
    #[must_use]
    pub const fn requires_approval(self) -> bool {
        !matches!(self, Self::T1)
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// How a proposal reached execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// A human confirmed or rejected the proposal.
    Explicit,
    /// The trust policy approved the proposal without a human decision.
    Automatic,
}

impl ApprovalMode {
    /// Returns the canonical label for the approval mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Automatic => "automatic",
        }
    }
}

/// Returns the built-in tier for a tool.
#[must_use]
pub const fn base_tier(tool: ToolName) -> TrustTier {
    match tool {
        ToolName::UpdateOnboardingPhase => TrustTier::T1,
        ToolName::UpdateStorefrontDraft
        | ToolName::UpdateBranding
        | ToolName::UpsertPackage
        | ToolName::UpdatePackagePrice => TrustTier::T2,
        ToolName::PublishStorefront
        | ToolName::CreateBooking
        | ToolName::CancelBooking
        | ToolName::RecordBalancePayment => TrustTier::T3,
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Trust policy errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustPolicyError {
    /// Escalation would lower the tool below its built-in tier.
    #[error("trust tier for {tool} cannot be lowered from {base} to {requested}")]
    Downgrade {
        /// Tool being escalated.
        tool: ToolName,
        /// Built-in tier.
        base: TrustTier,
        /// Requested tier.
        requested: TrustTier,
    },
    /// Escalation listed the same tool twice.
    #[error("duplicate trust tier escalation for {0}")]
    Duplicate(ToolName),
    /// A tier-3 tool resolved to automatic approval.
    #[error("tier-3 tool {0} must require explicit approval")]
    AutoApprovedTierThree(ToolName),
    /// An automatically approved tool has no registered executor.
    #[error("tool {0} is approved automatically but has no executor")]
    AutoApprovedWithoutExecutor(ToolName),
}

/// Trust tier policy: the built-in mapping plus optional escalations.
///
/// # Invariants
/// - The effective tier of a tool is never below its [`base_tier`].
/// - Tier-3 tools always require approval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustTierPolicy {
    /// Escalated tiers keyed by tool.
    escalations: BTreeMap<ToolName, TrustTier>,
}

impl TrustTierPolicy {
    /// Creates the built-in policy with no escalations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a policy from `(tool, tier)` escalations.
    ///
    /// # Errors
    ///
    /// Returns [`TrustPolicyError`] when an escalation lowers a tier or
    /// repeats a tool.
    pub fn with_escalations(
        escalations: impl IntoIterator<Item = (ToolName, TrustTier)>,
    ) -> Result<Self, TrustPolicyError> {
        let mut policy = Self::new();
        for (tool, tier) in escalations {
            let base = base_tier(tool);
            if tier < base {
                return Err(TrustPolicyError::Downgrade {
                    tool,
                    base,
                    requested: tier,
                });
            }
            if policy.escalations.insert(tool, tier).is_some() {
                return Err(TrustPolicyError::Duplicate(tool));
            }
        }
        policy.verify()?;
        Ok(policy)
    }

    /// Returns the effective tier for a tool.
    #[must_use]
    pub fn tier_for(&self, tool: ToolName) -> TrustTier {
        self.escalations.get(&tool).copied().unwrap_or_else(|| base_tier(tool))
    }

    /// Returns true when proposals for `tool` need a human decision.
    #[must_use]
    pub fn requires_approval(&self, tool: ToolName) -> bool {
        self.tier_for(tool).requires_approval()
    }

    /// Checks the policy invariants for every known tool.
    ///
    /// # Errors
    ///
    /// Returns [`TrustPolicyError`] when a tier was lowered or a tier-3 tool
    /// would be auto-approved.
    pub fn verify(&self) -> Result<(), TrustPolicyError> {
        for tool in ToolName::all() {
            let base = base_tier(*tool);
            let effective = self.tier_for(*tool);
            if effective < base {
                return Err(TrustPolicyError::Downgrade {
                    tool: *tool,
                    base,
                    requested: effective,
                });
            }
            if effective == TrustTier::T3 && !self.requires_approval(*tool) {
                return Err(TrustPolicyError::AutoApprovedTierThree(*tool));
            }
        }
        Ok(())
    }

    /// Checks the policy against the tools that have executors.
    ///
    /// Runs [`Self::verify`], then requires every registered tier-3 tool to
    /// need approval and every automatically approved tool to be executable.
    ///
    /// # Errors
    ///
    /// Returns [`TrustPolicyError`] when either condition fails.
    pub fn verify_executors(&self, executable: &[ToolName]) -> Result<(), TrustPolicyError> {
        self.verify()?;
        for tool in executable {
            if self.tier_for(*tool) == TrustTier::T3 && !self.requires_approval(*tool) {
                return Err(TrustPolicyError::AutoApprovedTierThree(*tool));
            }
        }
        for tool in ToolName::all() {
            if !self.requires_approval(*tool) && !executable.contains(tool) {
                return Err(TrustPolicyError::AutoApprovedWithoutExecutor(*tool));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
