// crates/proposal-gate-server/src/auth.rs
// ============================================================================
// Module: Tenant Authentication
// Description: Derives the caller's tenant from verified request metadata.
// Purpose: Provide strict, fail-closed tenant resolution for HTTP requests.
// Dependencies: proposal-gate-config, proposal-gate-core, serde, sha2
// ============================================================================

//! ## Overview
//! Every proposal and document operation is scoped to the tenant returned
//! here; request bodies never name a tenant. Two policies are provided:
//! local-only (loopback callers act as one configured tenant) and bearer
//! tokens (each token is bound to exactly one tenant). All decisions are
//! fail-closed and emit audit events. Raw tokens are never logged; a
//! SHA-256 fingerprint identifies them instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::IpAddr;

use proposal_gate_config::ServerAuthConfig;
use proposal_gate_config::ServerAuthMode;
use proposal_gate_core::TenantId;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::audit::now_ms;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest accepted `Authorization` header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth decisions.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Authorization header value.
    pub auth_header: Option<String>,
}

impl RequestContext {
    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(peer_ip: Option<IpAddr>, auth_header: Option<String>) -> Self {
        Self {
            peer_ip,
            auth_header,
        }
    }

    /// Returns true when the peer IP is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authenticated caller context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Tenant every operation in the request is scoped to.
    pub tenant_id: TenantId,
    /// Authentication method.
    pub method: AuthMethod,
    /// Token fingerprint for bearer auth (hashed).
    pub token_fingerprint: Option<String>,
}

/// Authentication method used for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Local-only loopback access.
    Local,
    /// Bearer token authentication.
    BearerToken,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Resolves the tenant a request acts for.
pub trait TenantAuthenticator: Send + Sync {
    /// Authenticates a request. Returns the caller's tenant on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the request cannot be attributed to a
    /// tenant.
    fn authenticate(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError>;
}

// ============================================================================
// SECTION: Default Policy
// ============================================================================

/// Default authenticator derived from server config.
pub struct DefaultTenantAuth {
    /// Auth mode.
    mode: ServerAuthMode,
    /// Tenant bound to loopback callers in local-only mode.
    local_tenant: TenantId,
    /// Bearer tokens mapped to their tenant.
    tokens: BTreeMap<String, TenantId>,
}

impl DefaultTenantAuth {
    /// Builds the authenticator from server auth configuration.
    #[must_use]
    pub fn from_config(config: &ServerAuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|entry| (entry.token.clone(), TenantId::new(entry.tenant_id.clone())))
            .collect();
        Self {
            mode: config.mode,
            local_tenant: TenantId::new(config.local_tenant_id.clone()),
            tokens,
        }
    }

    /// Returns the configured auth mode.
    #[must_use]
    pub const fn mode(&self) -> ServerAuthMode {
        self.mode
    }
}

impl TenantAuthenticator for DefaultTenantAuth {
    fn authenticate(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError> {
        match self.mode {
            ServerAuthMode::LocalOnly => {
                if !ctx.peer_is_loopback() {
                    return Err(AuthError::Unauthenticated(
                        "local-only mode requires loopback access".to_string(),
                    ));
                }
                Ok(AuthContext {
                    tenant_id: self.local_tenant.clone(),
                    method: AuthMethod::Local,
                    token_fingerprint: None,
                })
            }
            ServerAuthMode::BearerToken => {
                let token = parse_bearer_token(ctx.auth_header.as_deref())?;
                let tenant_id = self
                    .tokens
                    .get(token)
                    .ok_or_else(|| AuthError::Unauthenticated("invalid bearer token".to_string()))?;
                Ok(AuthContext {
                    tenant_id: tenant_id.clone(),
                    method: AuthMethod::BearerToken,
                    token_fingerprint: Some(token_fingerprint(token)),
                })
            }
        }
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Auth audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    timestamp_ms: u128,
    /// Decision outcome.
    decision: &'static str,
    /// Route the request targeted.
    route: String,
    /// Caller IP address (if available).
    peer_ip: Option<String>,
    /// Auth method.
    auth_method: Option<AuthMethod>,
    /// Resolved tenant.
    tenant_id: Option<TenantId>,
    /// Bearer token fingerprint (sha256).
    token_fingerprint: Option<String>,
    /// Failure reason (for deny events).
    reason: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, route: &str, auth: &AuthContext) -> Self {
        Self {
            event: "auth_decision",
            timestamp_ms: now_ms(),
            decision: "allow",
            route: route.to_string(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: Some(auth.method),
            tenant_id: Some(auth.tenant_id.clone()),
            token_fingerprint: auth.token_fingerprint.clone(),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, route: &str, error: &AuthError) -> Self {
        Self {
            event: "auth_decision",
            timestamp_ms: now_ms(),
            decision: "deny",
            route: route.to_string(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: None,
            tenant_id: None,
            token_fingerprint: None,
            reason: Some(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Extracts the token from a `Bearer` authorization header.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
