// crates/proposal-gate-server/src/server/api.rs
// ============================================================================
// Module: HTTP API Types
// Description: Request bodies, response projections, and error mapping.
// Purpose: Define the JSON wire shapes of the proposal HTTP surface.
// Dependencies: proposal-gate-core, axum, serde, serde_json
// ============================================================================

//! ## Overview
//! Wire shapes use camelCase field names. Error responses share one body,
//! `{"error": <kind>, "message": <text>}`, where `kind` is one of the stable
//! labels below. [`ApiError`] also tags the response with its kind so the
//! request audit layer can log it without re-parsing the body. Internal
//! failures answer with [`INTERNAL_MESSAGE`]; their detail travels only in
//! the [`ErrorDetail`] extension for the security audit sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use proposal_gate_core::ConfirmOutcome;
use proposal_gate_core::ControllerError;
use proposal_gate_core::ExecutionError;
use proposal_gate_core::ExecutionErrorKind;
use proposal_gate_core::Proposal;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::StoreError;
use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthError;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Unknown or foreign-tenant resource.
pub const KIND_NOT_FOUND: &str = "not_found";
/// Status does not allow the action.
pub const KIND_CONFLICT: &str = "conflict";
/// Proposal expired before a decision.
pub const KIND_EXPIRED: &str = "expired";
/// Payload failed its tool schema.
pub const KIND_VALIDATION_FAILED: &str = "validation_failed";
/// Version guard rejected a write.
pub const KIND_CONCURRENT_MODIFICATION: &str = "concurrent_modification";
/// Lock wait exceeded its bound; retryable.
pub const KIND_LOCK_TIMEOUT: &str = "lock_timeout";
/// Caller could not be attributed to a tenant.
pub const KIND_UNAUTHENTICATED: &str = "unauthenticated";
/// Malformed request.
pub const KIND_INVALID_REQUEST: &str = "invalid_request";
/// Unexpected server failure.
pub const KIND_INTERNAL: &str = "internal";

/// Body message for unexpected server failures.
pub const INTERNAL_MESSAGE: &str = "internal server error";

/// Error kind attached to error responses for request logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKind(pub &'static str);

/// Failure detail withheld from the body and logged server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail(pub String);

// ============================================================================
// SECTION: API Error
// ============================================================================

/// HTTP error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Stable error kind label.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Current document version for version conflicts.
    pub current_version: Option<u64>,
    /// Whether repeating the request may succeed.
    pub retryable: bool,
    /// Detail withheld from the body.
    pub detail: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    /// Stable error kind label.
    error: &'static str,
    /// Human-readable message.
    message: &'a str,
    /// Current document version for version conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    current_version: Option<u64>,
    /// Whether repeating the request may succeed.
    retryable: bool,
}

impl ApiError {
    /// Builds an error response.
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            current_version: None,
            retryable: false,
            detail: None,
        }
    }

    /// Marks the error as retryable.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// 400 for a malformed request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, KIND_INVALID_REQUEST, message)
    }

    /// 404 for an unknown resource.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, KIND_NOT_FOUND, message)
    }

    /// 409 for a lost version-guarded write.
    pub fn concurrent_modification(current_version: u64) -> Self {
        Self {
            current_version: Some(current_version),
            retryable: true,
            ..Self::new(
                StatusCode::CONFLICT,
                KIND_CONCURRENT_MODIFICATION,
                "someone else changed this document; reload and retry",
            )
        }
    }

    /// 500 for unexpected failures. `detail` is logged, never returned.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, KIND_INTERNAL, INTERNAL_MESSAGE)
        }
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        let message = err.to_string();
        match err {
            ControllerError::NotFound(_) => Self::not_found(message),
            ControllerError::Conflict { .. } => {
                Self::new(StatusCode::CONFLICT, KIND_CONFLICT, message)
            }
            ControllerError::Expired(_) => Self::new(StatusCode::GONE, KIND_EXPIRED, message),
            ControllerError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, KIND_VALIDATION_FAILED, message)
            }
            ControllerError::InvalidRequest(_) => Self::invalid_request(message),
            ControllerError::LockTimeout(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, KIND_LOCK_TIMEOUT, message)
                    .retryable(true)
            }
            ControllerError::ExecutionFailed {
                error, ..
            } => Self {
                detail: internal_detail(&error),
                ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.kind.as_str(), message)
            },
            ControllerError::Policy(_) | ControllerError::Store(_) => Self::internal(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let retryable = err.is_retryable();
        match err {
            StoreError::LockTimeout(message) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, KIND_LOCK_TIMEOUT, message)
                    .retryable(retryable)
            }
            StoreError::Invalid(message) => Self::invalid_request(message),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, KIND_UNAUTHENTICATED, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: &self.message,
            current_version: self.current_version,
            retryable: self.retryable,
        };
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorKind(self.kind));
        if let Some(detail) = self.detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

/// Returns the raw message of an internal execution failure for logging.
#[must_use]
pub fn internal_detail(error: &ExecutionError) -> Option<String> {
    (error.kind == ExecutionErrorKind::Internal).then(|| error.message.clone())
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// `POST /proposals` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateProposalBody {
    /// Session the proposal belongs to.
    pub session_id: String,
    /// Canonical tool name.
    pub tool_name: String,
    /// Human-readable summary.
    pub operation: String,
    /// Tool arguments.
    pub payload: Value,
    /// Snapshot of the intended effect.
    #[serde(default)]
    pub preview: Value,
}

/// `GET /proposals` query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProposalsQuery {
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to one status label.
    pub status: Option<String>,
    /// Requested page size (clamped).
    pub limit: Option<usize>,
}

/// `PUT /documents/{resource}` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveDocumentBody {
    /// Version the caller read.
    pub expected_version: u64,
    /// Replacement document.
    pub document: Value,
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Full proposal projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalView {
    /// Proposal identifier.
    pub id: ProposalId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Session the proposal was raised in.
    pub session_id: String,
    /// Tool that performs the mutation.
    pub tool_name: ToolName,
    /// Human-readable summary.
    pub operation: String,
    /// Trust tier at creation.
    pub trust_tier: TrustTier,
    /// Whether a human decision is required.
    pub requires_approval: bool,
    /// Tool arguments.
    pub payload: Value,
    /// Snapshot of the intended effect.
    pub preview: Value,
    /// Lifecycle status.
    pub status: ProposalStatus,
    /// Creation instant (unix ms).
    pub created_at: i64,
    /// Expiry instant (unix ms).
    pub expires_at: i64,
    /// Confirmation instant (unix ms).
    pub confirmed_at: Option<i64>,
    /// Execution finish instant (unix ms).
    pub executed_at: Option<i64>,
    /// Executor result.
    pub result: Option<Value>,
    /// Sanitized executor error.
    pub error: Option<String>,
}

impl From<Proposal> for ProposalView {
    fn from(proposal: Proposal) -> Self {
        Self {
            id: proposal.proposal_id,
            tenant_id: proposal.tenant_id,
            session_id: proposal.session_id.as_str().to_string(),
            tool_name: proposal.tool_name,
            operation: proposal.operation,
            trust_tier: proposal.trust_tier,
            requires_approval: proposal.requires_approval,
            payload: proposal.payload,
            preview: proposal.preview,
            status: proposal.status,
            created_at: proposal.created_at.as_unix_millis(),
            expires_at: proposal.expires_at.as_unix_millis(),
            confirmed_at: proposal.confirmed_at.map(|at| at.as_unix_millis()),
            executed_at: proposal.executed_at.map(|at| at.as_unix_millis()),
            result: proposal.result,
            error: proposal.error,
        }
    }
}

/// Outcome of a confirm or reject decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionView {
    /// Proposal identifier.
    pub id: ProposalId,
    /// Status after the decision.
    pub status: ProposalStatus,
    /// Executor result for `EXECUTED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// True when an earlier execution was replayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed: Option<bool>,
    /// Whether an executor exists, for `CONFIRMED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<bool>,
    /// Sanitized executor error for `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Executor error kind for `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ExecutionErrorKind>,
    /// Whether proposing the mutation again may succeed, for `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl DecisionView {
    /// Projection carrying only identifier and status.
    fn bare(proposal: &Proposal) -> Self {
        Self {
            id: proposal.proposal_id.clone(),
            status: proposal.status,
            result: None,
            replayed: None,
            executable: None,
            error: None,
            error_kind: None,
            retryable: None,
        }
    }

    /// Projection of a successful confirm.
    #[must_use]
    pub fn from_outcome(outcome: &ConfirmOutcome) -> Self {
        match outcome {
            ConfirmOutcome::Executed {
                proposal,
                result,
                replayed,
            } => Self {
                result: Some(result.clone()),
                replayed: Some(*replayed),
                ..Self::bare(proposal)
            },
            ConfirmOutcome::NotExecutable {
                proposal,
            } => Self {
                executable: Some(false),
                ..Self::bare(proposal)
            },
            ConfirmOutcome::InFlight {
                proposal,
            } => Self {
                executable: Some(true),
                ..Self::bare(proposal)
            },
        }
    }

    /// Projection of a failed execution. `FAILED` is terminal, so the
    /// decision is never retryable; callers submit a fresh proposal.
    #[must_use]
    pub fn failed(proposal: &Proposal, error: &ExecutionError) -> Self {
        Self {
            error: Some(proposal.error.clone().unwrap_or_else(|| error.public_message())),
            error_kind: Some(error.kind),
            retryable: Some(false),
            ..Self::bare(proposal)
        }
    }

    /// Projection of a rejection.
    #[must_use]
    pub fn rejected(proposal: &Proposal) -> Self {
        Self::bare(proposal)
    }
}

/// Auto-execution result reported by `POST /proposals`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExecutionView {
    /// Execution ran, was skipped, or failed in the executor.
    Decision(DecisionView),
    /// Execution did not start.
    Error {
        /// Stable error kind label.
        error: &'static str,
        /// Human-readable message.
        message: String,
    },
}

/// `POST /proposals` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalView {
    /// Persisted proposal.
    pub proposal: ProposalView,
    /// Whether a human decision is required.
    pub requires_approval: bool,
    /// Auto-execution outcome for proposals that need no approval.
    pub execution: Option<ExecutionView>,
}

/// `GET /proposals` response.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalListView {
    /// Proposals, newest first.
    pub proposals: Vec<ProposalView>,
}

/// Versioned document projection.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    /// Resource name.
    pub resource: String,
    /// Current version; zero when never written.
    pub version: u64,
    /// Document body.
    pub document: Value,
}

/// `PUT /documents/{resource}` success response.
#[derive(Debug, Clone, Serialize)]
pub struct SavedDocumentView {
    /// Resource name.
    pub resource: String,
    /// Version after the write.
    pub version: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
