// crates/proposal-gate-core/src/core/tooling.rs
// ============================================================================
// Module: Tooling Identifiers
// Description: Canonical mutation tool identifiers for Proposal Gate.
// Purpose: Shared tool naming across proposals, registries, and config.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Canonical names of the mutation-capable tools an agent may propose.
//! These names are part of the external contract surface and double as the
//! tag of every proposal payload.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical mutation tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Move the tenant to another onboarding phase.
    UpdateOnboardingPhase,
    /// Merge fields into the storefront draft.
    UpdateStorefrontDraft,
    /// Merge branding fields into the storefront draft.
    UpdateBranding,
    /// Create or replace a package record.
    UpsertPackage,
    /// Change the price of an existing package.
    UpdatePackagePrice,
    /// Make the storefront draft customer-visible.
    PublishStorefront,
    /// Book a customer into a slot.
    CreateBooking,
    /// Cancel a customer booking.
    CancelBooking,
    /// Record a balance payment against a booking.
    RecordBalancePayment,
}

impl ToolName {
    /// Returns the canonical string name for the tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateOnboardingPhase => "update_onboarding_phase",
            Self::UpdateStorefrontDraft => "update_storefront_draft",
            Self::UpdateBranding => "update_branding",
            Self::UpsertPackage => "upsert_package",
            Self::UpdatePackagePrice => "update_package_price",
            Self::PublishStorefront => "publish_storefront",
            Self::CreateBooking => "create_booking",
            Self::CancelBooking => "cancel_booking",
            Self::RecordBalancePayment => "record_balance_payment",
        }
    }

    /// Returns all tool names in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::UpdateOnboardingPhase,
            Self::UpdateStorefrontDraft,
            Self::UpdateBranding,
            Self::UpsertPackage,
            Self::UpdatePackagePrice,
            Self::PublishStorefront,
            Self::CreateBooking,
            Self::CancelBooking,
            Self::RecordBalancePayment,
        ]
    }

    /// Parses a tool name from its string representation.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "update_onboarding_phase" => Some(Self::UpdateOnboardingPhase),
            "update_storefront_draft" => Some(Self::UpdateStorefrontDraft),
            "update_branding" => Some(Self::UpdateBranding),
            "upsert_package" => Some(Self::UpsertPackage),
            "update_package_price" => Some(Self::UpdatePackagePrice),
            "publish_storefront" => Some(Self::PublishStorefront),
            "create_booking" => Some(Self::CreateBooking),
            "cancel_booking" => Some(Self::CancelBooking),
            "record_balance_payment" => Some(Self::RecordBalancePayment),
            _ => None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
