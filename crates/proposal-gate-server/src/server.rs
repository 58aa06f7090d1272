// crates/proposal-gate-server/src/server.rs
// ============================================================================
// Module: Proposal Gate Server
// Description: HTTP server assembly, backends, and the expiry sweep.
// Purpose: Wire config, storage, auth, and the lifecycle controller to axum.
// Dependencies: proposal-gate-config, proposal-gate-core, proposal-gate-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! [`ProposalGateServer`] validates configuration, opens the configured
//! backend, and builds the lifecycle controller plus executor registry. The
//! HTTP surface is fail-closed: every proposal and document route is
//! authenticated and scoped to the caller's tenant. A background task sweeps
//! expired proposals while the server runs.

mod api;
mod routes;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use proposal_gate_config::ProposalGateConfig;
use proposal_gate_config::ServerAuthMode;
use proposal_gate_config::StoreType;
use proposal_gate_core::Clock;
use proposal_gate_core::InMemoryDocumentStore;
use proposal_gate_core::InMemoryProposalStore;
use proposal_gate_core::ProposalController;
use proposal_gate_core::SharedAuditLog;
use proposal_gate_core::SharedDocumentStore;
use proposal_gate_core::SharedProposalStore;
use proposal_gate_core::SystemClock;
use proposal_gate_core::builtin_validator_registry;
use proposal_gate_store_sqlite::SqliteProposalStore;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use self::api::ApiError;
pub use self::api::ErrorKind;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::SecurityAuditEvent;
use crate::audit::ServerAuditSink;
use crate::audit::StderrAuditSink;
use crate::auth::DefaultTenantAuth;
use crate::auth::TenantAuthenticator;
use crate::executors::builtin_executors;
use crate::telemetry::NoopMetrics;
use crate::telemetry::ServerMetrics;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Clock shared between the controller and callers that drive time.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Lifecycle controller over the shared backends.
pub type GateController = ProposalController<SharedProposalStore, SharedAuditLog, SharedClock>;

/// State shared by every request handler.
pub(crate) struct AppState {
    /// Proposal lifecycle controller.
    pub(crate) controller: GateController,
    /// Document store backing the document routes.
    pub(crate) documents: SharedDocumentStore,
    /// Tenant authenticator.
    pub(crate) auth: Arc<dyn TenantAuthenticator>,
    /// Request audit sink.
    pub(crate) audit: Arc<dyn ServerAuditSink>,
    /// Request metrics sink.
    pub(crate) metrics: Arc<dyn ServerMetrics>,
}

/// Proposal gate HTTP server.
pub struct ProposalGateServer {
    /// Validated configuration.
    config: ProposalGateConfig,
    /// Handler state.
    state: Arc<AppState>,
}

/// Optional overrides applied when building a server.
pub struct ServerBuilder {
    /// Configuration to build from.
    config: ProposalGateConfig,
    /// Clock override.
    clock: Option<SharedClock>,
    /// Metrics override.
    metrics: Option<Arc<dyn ServerMetrics>>,
    /// Audit sink override.
    audit: Option<Arc<dyn ServerAuditSink>>,
}

/// Opened storage backends.
struct Backends {
    /// Proposal persistence.
    proposals: SharedProposalStore,
    /// Business audit log.
    audit_log: SharedAuditLog,
    /// Tenant documents.
    documents: SharedDocumentStore,
}

/// Aborts the expiry sweep when serving stops or is cancelled.
struct SweepGuard(JoinHandle<()>);

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server construction and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration was invalid.
    #[error("config error: {0}")]
    Config(String),
    /// A component failed to initialize.
    #[error("init error: {0}")]
    Init(String),
    /// The listener or connection handling failed.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Construction
// ============================================================================

impl ProposalGateServer {
    /// Builds a server from configuration with default collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the configuration is invalid or a backend
    /// cannot be opened.
    pub fn from_config(config: ProposalGateConfig) -> Result<Self, ServerError> {
        Self::builder(config).build()
    }

    /// Returns a builder for overriding the clock, metrics, or audit sink.
    #[must_use]
    pub const fn builder(config: ProposalGateConfig) -> ServerBuilder {
        ServerBuilder {
            config,
            clock: None,
            metrics: None,
            audit: None,
        }
    }

    /// Returns the validated configuration.
    #[must_use]
    pub const fn config(&self) -> &ProposalGateConfig {
        &self.config
    }

    /// Returns the lifecycle controller.
    #[must_use]
    pub fn controller(&self) -> &GateController {
        &self.state.controller
    }

    /// Builds the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);
        Router::new()
            .route(routes::HEALTH_ROUTE, get(routes::healthz))
            .route("/proposals", post(routes::create_proposal).get(routes::list_proposals))
            .route("/proposals/{id}", get(routes::get_proposal))
            .route("/proposals/{id}/confirm", post(routes::confirm_proposal))
            .route("/proposals/{id}/reject", post(routes::reject_proposal))
            .route("/documents/{resource}", get(routes::get_document).put(routes::put_document))
            .fallback(routes::not_found)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                routes::audit_and_authenticate,
            ))
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
            .with_state(state)
    }

    /// Binds the configured address and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;
        self.serve_listener(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when serving fails.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = self.router();
        let _sweep = SweepGuard(spawn_expiry_sweep(
            Arc::clone(&self.state),
            self.config.proposals.sweep_interval(),
        ));
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(err.to_string()))
    }
}

impl ServerBuilder {
    /// Overrides the clock (tests drive expiry with a manual clock).
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Overrides the request audit sink.
    #[must_use]
    pub fn audit_sink(mut self, audit: Arc<dyn ServerAuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validates configuration and assembles the server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the configuration is invalid or a backend
    /// cannot be opened.
    pub fn build(self) -> Result<ProposalGateServer, ServerError> {
        let mut config = self.config;
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let policy = config.trust.policy().map_err(|err| ServerError::Config(err.to_string()))?;

        let audit = match self.audit {
            Some(audit) => audit,
            None => build_audit_sink(&config)?,
        };
        let auth = DefaultTenantAuth::from_config(&config.server.auth);
        if auth.mode() == ServerAuthMode::LocalOnly {
            emit_local_only_warning(audit.as_ref(), &config);
        }

        let backends = open_backends(&config)?;
        let validators =
            builtin_validator_registry().map_err(|err| ServerError::Init(err.to_string()))?;
        let executors =
            builtin_executors(&backends.documents, config.locks.transaction_timeout())
                .map_err(|err| ServerError::Init(err.to_string()))?;
        policy
            .verify_executors(&executors.tools())
            .map_err(|err| ServerError::Config(err.to_string()))?;
        let clock: SharedClock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let controller = ProposalController::new(
            backends.proposals,
            backends.audit_log,
            clock,
            policy,
            validators,
            executors,
            config.controller_config(),
        )
        .map_err(|err| ServerError::Init(err.to_string()))?;

        let metrics: Arc<dyn ServerMetrics> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoopMetrics),
        };
        let state = Arc::new(AppState {
            controller,
            documents: backends.documents,
            auth: Arc::new(auth),
            audit,
            metrics,
        });
        Ok(ProposalGateServer {
            config,
            state,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens the configured storage backend.
fn open_backends(config: &ProposalGateConfig) -> Result<Backends, ServerError> {
    match config.store.store_type {
        StoreType::Memory => {
            let store = InMemoryProposalStore::new();
            Ok(Backends {
                proposals: SharedProposalStore::from_store(store.clone()),
                audit_log: SharedAuditLog::from_log(store),
                documents: SharedDocumentStore::from_store(InMemoryDocumentStore::new()),
            })
        }
        StoreType::Sqlite => {
            let sqlite_config = config.store.sqlite_config().ok_or_else(|| {
                ServerError::Config("sqlite store requires store.path".to_string())
            })?;
            let store = SqliteProposalStore::new(sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(Backends {
                proposals: SharedProposalStore::from_store(store.clone()),
                audit_log: SharedAuditLog::from_log(store.clone()),
                documents: SharedDocumentStore::from_store(store),
            })
        }
    }
}

/// Selects the request audit sink from configuration.
fn build_audit_sink(config: &ProposalGateConfig) -> Result<Arc<dyn ServerAuditSink>, ServerError> {
    let audit = &config.server.audit;
    if !audit.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &audit.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Records that the server accepts unauthenticated loopback callers.
fn emit_local_only_warning(audit: &dyn ServerAuditSink, config: &ProposalGateConfig) {
    audit.record_security(&SecurityAuditEvent::new(
        "local_only_mode",
        Some(format!(
            "bearer auth disabled; loopback callers act as tenant {}",
            config.server.auth.local_tenant_id
        )),
    ));
}

/// Spawns the periodic expiry sweep.
fn spawn_expiry_sweep(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let swept = Arc::clone(&state);
            let result =
                tokio::task::spawn_blocking(move || swept.controller.expire_stale()).await;
            let failure = match result {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(err) => Some(err.to_string()),
            };
            if let Some(message) = failure {
                let event = SecurityAuditEvent::new("expiry_sweep_failed", Some(message));
                state.audit.record_security(&event);
            }
        }
    })
}
