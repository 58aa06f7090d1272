// crates/proposal-gate-server/src/audit.rs
// ============================================================================
// Module: Server Audit Logging
// Description: Structured audit events for HTTP request handling.
// Purpose: Emit redacted JSON-line audit logs without hard dependencies.
// Dependencies: proposal-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines request, auth, proposal-action, and security audit
//! events plus the sinks that write them as one JSON object per line. Events
//! never carry payloads, previews, or raw tokens. Request audit logging is
//! separate from the business [`AuditLog`](proposal_gate_core::AuditLog)
//! that records proposal decisions in the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use serde::Serialize;

use crate::auth::AuthAuditEvent;

// ============================================================================
// SECTION: Types
// ============================================================================

/// HTTP request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct HttpRequestEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method.
    pub method: String,
    /// Matched route template, or `unmatched`.
    pub route: String,
    /// Response status code.
    pub status: u16,
    /// Authenticated tenant, when auth succeeded.
    pub tenant_id: Option<String>,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Handling time in milliseconds.
    pub duration_ms: u64,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

/// Inputs required to construct a request audit event.
pub struct HttpRequestEventParams {
    /// HTTP method.
    pub method: String,
    /// Matched route template, or `unmatched`.
    pub route: String,
    /// Response status code.
    pub status: u16,
    /// Authenticated tenant, when auth succeeded.
    pub tenant_id: Option<String>,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Handling time in milliseconds.
    pub duration_ms: u64,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

impl HttpRequestEvent {
    /// Creates a new request event with a consistent timestamp.
    #[must_use]
    pub fn new(params: HttpRequestEventParams) -> Self {
        Self {
            event: "http_request",
            timestamp_ms: now_ms(),
            method: params.method,
            route: params.route,
            status: params.status,
            tenant_id: params.tenant_id,
            peer_ip: params.peer_ip,
            duration_ms: params.duration_ms,
            error_kind: params.error_kind,
        }
    }
}

/// Proposal action recorded in the request audit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalAction {
    /// Proposal created.
    Create,
    /// Proposal confirmed.
    Confirm,
    /// Proposal rejected.
    Reject,
}

/// Proposal action audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalActionEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Action taken.
    pub action: ProposalAction,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Proposal identifier.
    pub proposal_id: ProposalId,
    /// Tool when known.
    pub tool: Option<ToolName>,
    /// Resulting status when the action succeeded or failed in execution.
    pub status: Option<ProposalStatus>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

impl ProposalActionEvent {
    /// Creates a new proposal action event with a consistent timestamp.
    #[must_use]
    pub fn new(
        action: ProposalAction,
        tenant_id: TenantId,
        proposal_id: ProposalId,
        tool: Option<ToolName>,
        status: Option<ProposalStatus>,
        error_kind: Option<&'static str>,
    ) -> Self {
        Self {
            event: "proposal_action",
            timestamp_ms: now_ms(),
            action,
            tenant_id,
            proposal_id,
            tool,
            status,
            error_kind,
        }
    }
}

/// Security posture audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Security event kind.
    pub kind: String,
    /// Optional message.
    pub message: Option<String>,
}

impl SecurityAuditEvent {
    /// Creates a new security event with a consistent timestamp.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: Option<String>) -> Self {
        Self {
            event: "security",
            timestamp_ms: now_ms(),
            kind: kind.into(),
            message,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for server events.
pub trait ServerAuditSink: Send + Sync {
    /// Record a request event.
    fn record_request(&self, event: &HttpRequestEvent);

    /// Record an auth decision.
    fn record_auth(&self, _event: &AuthAuditEvent) {}

    /// Record a proposal action.
    fn record_proposal(&self, _event: &ProposalActionEvent) {}

    /// Record a security posture event.
    fn record_security(&self, _event: &SecurityAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one event line to stderr.
    fn write(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl ServerAuditSink for StderrAuditSink {
    fn record_request(&self, event: &HttpRequestEvent) {
        Self::write(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        Self::write(event);
    }

    fn record_proposal(&self, event: &ProposalActionEvent) {
        Self::write(event);
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        Self::write(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one event line and flushes.
    fn write(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl ServerAuditSink for FileAuditSink {
    fn record_request(&self, event: &HttpRequestEvent) {
        self.write(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        self.write(event);
    }

    fn record_proposal(&self, event: &ProposalActionEvent) {
        self.write(event);
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        self.write(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl ServerAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &HttpRequestEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current wall-clock time in milliseconds since epoch.
pub(crate) fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
