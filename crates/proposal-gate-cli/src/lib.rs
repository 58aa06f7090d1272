// crates/proposal-gate-cli/src/lib.rs
// ============================================================================
// Module: Proposal Gate CLI Library
// Description: Shared helpers for the proposal-gate binary.
// Purpose: Expose the message catalog to the entry point and its tests.
// Dependencies: crate::i18n
// ============================================================================

//! ## Overview
//! Library half of the `proposal-gate` binary. The command dispatcher lives
//! in `main.rs`; this crate exposes the message catalog it prints through.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod i18n;
