// crates/proposal-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for lock key resolution and tool listings.
// Purpose: Ensure offline CLI helpers agree with the server's behavior.
// Dependencies: proposal-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Checks that `lock-key` derives the same keys the executors lock on, that
//! bad arguments fail closed, and that `tools list` honors trust
//! escalations from config.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::lock_key::balance_lock_key;
use proposal_gate_core::lock_key::booking_date_lock_key;
use proposal_gate_core::lock_key::storefront_lock_key;

use super::LockKeyCommand;
use super::ProposalGateConfig;
use super::render_tool_table;
use super::resolve_lock_key;
use super::tool_rows;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn lock_key_command(tenant: &str, resource: &str, secondary: &[&str]) -> LockKeyCommand {
    LockKeyCommand {
        tenant_id: tenant.to_string(),
        resource: resource.to_string(),
        secondary: secondary.iter().map(ToString::to_string).collect(),
    }
}

// ============================================================================
// SECTION: Lock Key
// ============================================================================

#[test]
fn lock_key_matches_executor_keys() {
    let tenant = TenantId::new("tenant-a");
    let storefront = resolve_lock_key(&lock_key_command("tenant-a", "storefront:draft", &[]));
    assert_eq!(storefront.unwrap(), storefront_lock_key(&tenant));
    let balance = resolve_lock_key(&lock_key_command("tenant-a", "balance", &["bk-1"]));
    assert_eq!(balance.unwrap(), balance_lock_key(&tenant, "bk-1"));
    let slots = resolve_lock_key(&lock_key_command("tenant-a", "booking:slots", &["2026-03-14"]));
    assert_eq!(slots.unwrap(), booking_date_lock_key(&tenant, "2026-03-14"));
}

#[test]
fn lock_key_rejects_blank_arguments() {
    assert!(resolve_lock_key(&lock_key_command(" ", "catalog:packages", &[])).is_err());
    assert!(resolve_lock_key(&lock_key_command("tenant-a", "", &[])).is_err());
    let long_tenant = "t".repeat(129);
    assert!(resolve_lock_key(&lock_key_command(&long_tenant, "onboarding", &[])).is_err());
}

// ============================================================================
// SECTION: Tools
// ============================================================================

#[test]
fn tool_rows_reflect_base_tiers_and_executors() {
    let rows = tool_rows(&TrustTierPolicy::new());
    assert_eq!(rows.len(), ToolName::all().len());
    let onboarding = rows.iter().find(|row| row.tool == ToolName::UpdateOnboardingPhase).unwrap();
    assert_eq!(onboarding.tier, TrustTier::T1);
    assert!(!onboarding.requires_approval);
    assert!(onboarding.executable);
    let booking = rows.iter().find(|row| row.tool == ToolName::CreateBooking).unwrap();
    assert!(booking.requires_approval);
    assert!(!booking.executable);
}

#[test]
fn tool_rows_apply_config_escalations() {
    let config = ProposalGateConfig::from_toml_str(
        r#"
[trust]
escalations = [{ tool = "update_package_price", tier = "t3" }]
"#,
    )
    .unwrap();
    let rows = tool_rows(&config.trust.policy().unwrap());
    let price = rows.iter().find(|row| row.tool == ToolName::UpdatePackagePrice).unwrap();
    assert_eq!(price.tier, TrustTier::T3);
}

#[test]
fn tool_table_has_a_header_and_one_line_per_tool() {
    let table = render_tool_table(&tool_rows(&TrustTierPolicy::new()));
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), ToolName::all().len() + 1);
    assert!(lines[0].starts_with("TOOL"));
    assert!(lines.iter().any(|line| line.starts_with("publish_storefront") && line.contains("t3")));
}
