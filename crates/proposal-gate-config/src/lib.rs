// crates/proposal-gate-config/src/lib.rs
// ============================================================================
// Module: Proposal Gate Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for proposal-gate.toml semantics.
// Dependencies: proposal-gate-core, proposal-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `proposal-gate-config` defines the configuration model for the proposal
//! gate server. Loading is strict and fail-closed: oversized, non-UTF-8, or
//! inconsistent files are rejected before any component starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
