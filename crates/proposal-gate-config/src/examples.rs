// crates/proposal-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `proposal-gate.toml`. The example is kept valid: the
//! test suite parses and validates it.

/// Returns a canonical example `proposal-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"
max_body_bytes = 1048576

[server.auth]
mode = "bearer_token"
local_tenant_id = "tenant-local"

[[server.auth.tokens]]
token = "replace-with-a-long-random-token"
tenant_id = "tenant-a"

[server.audit]
enabled = true
path = "proposal-gate-audit.jsonl"

[store]
type = "sqlite"
path = "proposal-gate.db"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"

[proposals]
ttl_ms = 1800000
default_list_limit = 20
max_list_limit = 50
expiry_sweep_interval_ms = 60000
expiry_batch = 500

[locks]
transaction_timeout_ms = 5000

[trust]
escalations = [{ tool = "update_package_price", tier = "t3" }]
"#,
    )
}
