// crates/proposal-gate-server/src/lib.rs
// ============================================================================
// Module: Proposal Gate Server Library
// Description: HTTP surface for the proposal lifecycle.
// Purpose: Expose the server, auth, audit, telemetry, and built-in executors.
// Dependencies: proposal-gate-core, proposal-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! `proposal-gate-server` serves the proposal lifecycle over HTTP. Requests
//! are authenticated to a tenant, proposals are created, confirmed, or
//! rejected through the core controller, and confirmed mutations run through
//! the built-in document executors under transaction locks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod executors;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::ServerAuditSink;
pub use audit::StderrAuditSink;
pub use auth::DefaultTenantAuth;
pub use auth::TenantAuthenticator;
pub use executors::DocumentExecutor;
pub use executors::builtin_executors;
pub use server::ApiError;
pub use server::GateController;
pub use server::ProposalGateServer;
pub use server::ServerBuilder;
pub use server::ServerError;
pub use server::SharedClock;
pub use telemetry::NoopMetrics;
pub use telemetry::ServerMetrics;
