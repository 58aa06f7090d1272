// crates/proposal-gate-server/src/server/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: Axum handlers for proposals, documents, and health.
// Purpose: Bind the lifecycle controller and document store to HTTP.
// Dependencies: proposal-gate-core, axum, tokio
// ============================================================================

//! ## Overview
//! Every route except `/healthz` runs behind [`audit_and_authenticate`],
//! which resolves the caller's tenant and attaches it to the request. The
//! tenant always comes from that context; bodies and queries never carry
//! one. The core is synchronous, so handlers run it through
//! [`run_blocking`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::MatchedPath;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use proposal_gate_core::ConfirmOutcome;
use proposal_gate_core::ControllerError;
use proposal_gate_core::CreateProposalRequest;
use proposal_gate_core::DocumentStore;
use proposal_gate_core::ProposalFilter;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::ProposalStore;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SaveOutcome;
use proposal_gate_core::SessionId;
use proposal_gate_core::ToolName;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::audit::HttpRequestEvent;
use crate::audit::HttpRequestEventParams;
use crate::audit::ProposalAction;
use crate::audit::ProposalActionEvent;
use crate::audit::SecurityAuditEvent;
use crate::auth::AuthAuditEvent;
use crate::auth::AuthContext;
use crate::auth::RequestContext;
use crate::server::AppState;
use crate::server::api::ApiError;
use crate::server::api::CreateProposalBody;
use crate::server::api::CreateProposalView;
use crate::server::api::DecisionView;
use crate::server::api::DocumentView;
use crate::server::api::ErrorDetail;
use crate::server::api::ErrorKind;
use crate::server::api::ExecutionView;
use crate::server::api::ListProposalsQuery;
use crate::server::api::ProposalListView;
use crate::server::api::ProposalView;
use crate::server::api::SaveDocumentBody;
use crate::server::api::SavedDocumentView;
use crate::server::api::internal_detail;
use crate::telemetry::RequestMetricEvent;
use crate::telemetry::RequestOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Route that skips authentication.
pub(crate) const HEALTH_ROUTE: &str = "/healthz";
/// Longest accepted session identifier.
const MAX_SESSION_ID_LENGTH: usize = 128;
/// Longest accepted document resource name.
const MAX_RESOURCE_LENGTH: usize = 128;

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Authenticates the caller, then records the request in the audit sink and
/// metrics once the response is ready. Withheld internal failure detail goes
/// to the security sink.
pub(crate) async fn audit_and_authenticate(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |path| path.as_str().to_string());
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let context = RequestContext::http(Some(peer.ip()), auth_header);

    let mut tenant_id = None;
    let response = if route == HEALTH_ROUTE {
        next.run(request).await
    } else {
        match state.auth.authenticate(&context) {
            Ok(auth) => {
                state.audit.record_auth(&AuthAuditEvent::allowed(&context, &route, &auth));
                tenant_id = Some(auth.tenant_id.as_str().to_string());
                request.extensions_mut().insert(auth);
                next.run(request).await
            }
            Err(err) => {
                state.audit.record_auth(&AuthAuditEvent::denied(&context, &route, &err));
                ApiError::from(err).into_response()
            }
        }
    };

    let latency = started.elapsed();
    let status = response.status().as_u16();
    let error_kind = response.extensions().get::<ErrorKind>().map(|kind| kind.0);
    if let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>() {
        let message = format!("{method} {route}: {detail}");
        state.audit.record_security(&SecurityAuditEvent::new("internal_error", Some(message)));
    }
    let metric = RequestMetricEvent {
        method: method.clone(),
        route: route.clone(),
        status,
        outcome: RequestOutcome::from_status(status),
        error_kind,
    };
    state.metrics.record_request(&metric);
    state.metrics.record_latency(&metric, latency);
    state.audit.record_request(&HttpRequestEvent::new(HttpRequestEventParams {
        method,
        route,
        status,
        tenant_id,
        peer_ip: Some(peer.ip().to_string()),
        duration_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        error_kind,
    }));
    response
}

// ============================================================================
// SECTION: Proposal Handlers
// ============================================================================

/// `POST /proposals`
pub(crate) async fn create_proposal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: CreateProposalBody = parse_json(&body)?;
    let tool_name = ToolName::parse(&body.tool_name)
        .ok_or_else(|| ApiError::invalid_request(format!("unknown tool: {}", body.tool_name)))?;
    let session_id = parse_session_id(&body.session_id)?;
    let request = CreateProposalRequest {
        tenant_id: auth.tenant_id.clone(),
        session_id,
        tool_name,
        operation: body.operation,
        payload: body.payload,
        preview: body.preview,
    };
    let outcome = run_blocking(|| state.controller.create(request))?;

    let mut detail = None;
    let execution = outcome.execution.map(|execution| match execution {
        Ok(confirmed) => ExecutionView::Decision(DecisionView::from_outcome(&confirmed)),
        Err(ControllerError::ExecutionFailed {
            proposal,
            error,
        }) => {
            detail = internal_detail(&error);
            ExecutionView::Decision(DecisionView::failed(&proposal, &error))
        }
        Err(err) => {
            let api = ApiError::from(err);
            detail = api.detail;
            ExecutionView::Error {
                error: api.kind,
                message: api.message,
            }
        }
    });
    state.audit.record_proposal(&ProposalActionEvent::new(
        ProposalAction::Create,
        auth.tenant_id,
        outcome.proposal.proposal_id.clone(),
        Some(outcome.proposal.tool_name),
        Some(outcome.proposal.status),
        None,
    ));
    let view = CreateProposalView {
        requires_approval: outcome.proposal.requires_approval,
        proposal: ProposalView::from(outcome.proposal),
        execution,
    };
    let mut response = (StatusCode::CREATED, Json(view)).into_response();
    if let Some(detail) = detail {
        response.extensions_mut().insert(ErrorDetail(detail));
    }
    Ok(response)
}

/// `POST /proposals/{id}/confirm`
pub(crate) async fn confirm_proposal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let proposal_id = ProposalId::new(id);
    let result = run_blocking(|| state.controller.confirm(&auth.tenant_id, &proposal_id));
    match result {
        Ok(outcome) => {
            let proposal = outcome.proposal();
            state.audit.record_proposal(&ProposalActionEvent::new(
                ProposalAction::Confirm,
                auth.tenant_id.clone(),
                proposal_id,
                Some(proposal.tool_name),
                Some(proposal.status),
                None,
            ));
            let status = match outcome {
                ConfirmOutcome::InFlight { .. } => StatusCode::ACCEPTED,
                ConfirmOutcome::Executed { .. } | ConfirmOutcome::NotExecutable { .. } => {
                    StatusCode::OK
                }
            };
            Ok((status, Json(DecisionView::from_outcome(&outcome))).into_response())
        }
        Err(ControllerError::ExecutionFailed {
            proposal,
            error,
        }) => {
            state.audit.record_proposal(&ProposalActionEvent::new(
                ProposalAction::Confirm,
                auth.tenant_id.clone(),
                proposal_id,
                Some(proposal.tool_name),
                Some(ProposalStatus::Failed),
                Some(error.kind.as_str()),
            ));
            let mut response =
                (StatusCode::INTERNAL_SERVER_ERROR, Json(DecisionView::failed(&proposal, &error)))
                    .into_response();
            response.extensions_mut().insert(ErrorKind(error.kind.as_str()));
            if let Some(detail) = internal_detail(&error) {
                response.extensions_mut().insert(ErrorDetail(detail));
            }
            Ok(response)
        }
        Err(err) => {
            let api = ApiError::from(err);
            state.audit.record_proposal(&ProposalActionEvent::new(
                ProposalAction::Confirm,
                auth.tenant_id.clone(),
                proposal_id,
                None,
                None,
                Some(api.kind),
            ));
            Err(api)
        }
    }
}

/// `POST /proposals/{id}/reject`
pub(crate) async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<DecisionView>, ApiError> {
    let proposal_id = ProposalId::new(id);
    let result = run_blocking(|| state.controller.reject(&auth.tenant_id, &proposal_id));
    let (tool, status, error_kind) = match &result {
        Ok(proposal) => (Some(proposal.tool_name), Some(proposal.status), None),
        Err(err) => (None, None, Some(ApiError::from(err.clone()).kind)),
    };
    state.audit.record_proposal(&ProposalActionEvent::new(
        ProposalAction::Reject,
        auth.tenant_id.clone(),
        proposal_id,
        tool,
        status,
        error_kind,
    ));
    Ok(Json(DecisionView::rejected(&result?)))
}

/// `GET /proposals/{id}`
pub(crate) async fn get_proposal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ProposalView>, ApiError> {
    let proposal_id = ProposalId::new(id);
    let proposal = run_blocking(|| state.controller.get(&auth.tenant_id, &proposal_id))?;
    Ok(Json(ProposalView::from(proposal)))
}

/// `GET /proposals?sessionId=&status=&limit=`
pub(crate) async fn list_proposals(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<ListProposalsQuery>, QueryRejection>,
) -> Result<Json<ProposalListView>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid_request(err.body_text()))?;
    let session_id = query.session_id.as_deref().map(parse_session_id).transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|label| {
            ProposalStatus::parse(label)
                .ok_or_else(|| ApiError::invalid_request(format!("unknown status: {label}")))
        })
        .transpose()?;
    let filter = ProposalFilter {
        session_id,
        status,
    };
    let proposals =
        run_blocking(|| state.controller.list(&auth.tenant_id, &filter, query.limit))?;
    Ok(Json(ProposalListView {
        proposals: proposals.into_iter().map(ProposalView::from).collect(),
    }))
}

// ============================================================================
// SECTION: Document Handlers
// ============================================================================

/// `GET /documents/{resource}`
pub(crate) async fn get_document(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(resource): Path<String>,
) -> Result<Json<DocumentView>, ApiError> {
    let resource = parse_resource(&resource)?;
    let stored = run_blocking(|| state.documents.load(&auth.tenant_id, &resource))?;
    Ok(Json(DocumentView {
        resource: stored.resource.as_str().to_string(),
        version: stored.version,
        document: stored.document,
    }))
}

/// `PUT /documents/{resource}`
pub(crate) async fn put_document(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(resource): Path<String>,
    body: Bytes,
) -> Result<Json<SavedDocumentView>, ApiError> {
    let resource = parse_resource(&resource)?;
    let body: SaveDocumentBody = parse_json(&body)?;
    let outcome = run_blocking(|| {
        state.documents.try_save(&auth.tenant_id, &resource, &body.document, body.expected_version)
    })?;
    match outcome {
        SaveOutcome::Saved {
            new_version,
        } => Ok(Json(SavedDocumentView {
            resource: resource.as_str().to_string(),
            version: new_version,
        })),
        SaveOutcome::Conflict {
            current_version,
        } => Err(ApiError::concurrent_modification(current_version)),
    }
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// `GET /healthz`
pub(crate) async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    match run_blocking(|| state.controller.store().readiness()) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "message": err.to_string() })),
        )
            .into_response(),
    }
}

/// Fallback for unknown routes.
pub(crate) async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs synchronous store work, shifting to a blocking context when the
/// runtime allows it.
pub(crate) fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Parses a JSON request body.
fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::invalid_request(format!("invalid request body: {err}")))
}

/// Validates a session identifier.
fn parse_session_id(value: &str) -> Result<SessionId, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SESSION_ID_LENGTH {
        return Err(ApiError::invalid_request("sessionId must be 1-128 characters"));
    }
    Ok(SessionId::new(trimmed))
}

/// Validates a document resource name: lowercase ASCII, digits, `:`, `_`, `-`.
fn parse_resource(value: &str) -> Result<ResourceId, ApiError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_RESOURCE_LENGTH
        && value.bytes().all(|byte| {
            byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b':' | b'_' | b'-')
        });
    if !valid {
        return Err(ApiError::invalid_request(format!("invalid resource name: {value}")));
    }
    Ok(ResourceId::new(value))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
