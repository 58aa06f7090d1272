// crates/proposal-gate-server/tests/common/mod.rs
// =============================================================================
// Module: Server Test Harness
// Description: Spawns a proposal gate server on an ephemeral port.
// Purpose: Share server setup and HTTP helpers across integration suites.
// =============================================================================

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test helpers are selectively used across suites."
)]

use std::sync::Arc;

use proposal_gate_config::ProposalGateConfig;
use proposal_gate_config::ServerAuthMode;
use proposal_gate_config::TenantTokenConfig;
use proposal_gate_core::ManualClock;
use proposal_gate_core::Timestamp;
use proposal_gate_server::NoopAuditSink;
use proposal_gate_server::ProposalGateServer;
use reqwest::Client;
use reqwest::Response;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Token bound to `tenant-a`.
pub const TOKEN_A: &str = "token-a";
/// Token bound to `tenant-b`.
pub const TOKEN_B: &str = "token-b";
/// Starting instant for the manual clock.
pub const START_MS: i64 = 1_700_000_000_000;

/// Running server plus a client pointed at it.
pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:4312`.
    pub base_url: String,
    /// HTTP client.
    pub client: Client,
    /// Clock driving proposal expiry.
    pub clock: ManualClock,
    /// Server task.
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Returns a bearer-token config with two tenants.
pub fn bearer_config() -> ProposalGateConfig {
    let mut config = ProposalGateConfig::default();
    config.server.auth.mode = ServerAuthMode::BearerToken;
    config.server.auth.tokens = vec![
        TenantTokenConfig {
            token: TOKEN_A.to_string(),
            tenant_id: "tenant-a".to_string(),
        },
        TenantTokenConfig {
            token: TOKEN_B.to_string(),
            tenant_id: "tenant-b".to_string(),
        },
    ];
    config.server.audit.enabled = false;
    config
}

/// Spawns a server for `config` with a manual clock and no request audit.
pub async fn spawn(config: ProposalGateConfig) -> TestServer {
    let clock = ManualClock::new(Timestamp::from_unix_millis(START_MS));
    let server = ProposalGateServer::builder(config)
        .clock(Arc::new(clock.clone()))
        .audit_sink(Arc::new(NoopAuditSink))
        .build()
        .expect("server builds");
    spawn_server(server, clock).await
}

/// Spawns an already built server.
pub async fn spawn_server(server: ProposalGateServer, clock: ManualClock) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let _ = server.serve_listener(listener).await;
    });
    TestServer {
        base_url: format!("http://{addr}"),
        client: Client::new(),
        clock,
        handle,
    }
}

impl TestServer {
    /// Issues `POST` with a bearer token and JSON body.
    pub async fn post(&self, token: &str, path: &str, body: &Value) -> Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("request sent")
    }

    /// Issues an empty `POST` with a bearer token.
    pub async fn post_empty(&self, token: &str, path: &str) -> Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .expect("request sent")
    }

    /// Issues `PUT` with a bearer token and JSON body.
    pub async fn put(&self, token: &str, path: &str, body: &Value) -> Response {
        self.client
            .put(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("request sent")
    }

    /// Issues `GET` with a bearer token.
    pub async fn get(&self, token: &str, path: &str) -> Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .expect("request sent")
    }

    /// Issues `GET` and returns status plus JSON body.
    pub async fn get_json(&self, token: &str, path: &str) -> (u16, Value) {
        status_and_body(self.get(token, path).await).await
    }

    /// Posts a decision (`confirm` or `reject`) for proposal `id`.
    pub async fn decide(&self, token: &str, id: &str, decision: &str) -> (u16, Value) {
        status_and_body(self.post_empty(token, &format!("/proposals/{id}/{decision}")).await).await
    }

    /// Creates a proposal and returns the response body.
    pub async fn create(&self, token: &str, session: &str, tool: &str, payload: Value) -> Value {
        let response = self
            .post(
                token,
                "/proposals",
                &serde_json::json!({
                    "sessionId": session,
                    "toolName": tool,
                    "operation": format!("run {tool}"),
                    "payload": payload,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("json body")
    }
}

/// Reads a JSON body, returning the status alongside it.
pub async fn status_and_body(response: Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}
