// crates/proposal-gate-config/src/config.rs
// ============================================================================
// Module: Proposal Gate Configuration
// Description: Configuration loading and validation for the proposal gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: proposal-gate-core, proposal-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing sections take defaults suitable for local development: loopback
//! bind, local-only auth, and the in-memory store. Anything inconsistent
//! fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use proposal_gate_core::ProposalControllerConfig;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::runtime::DEFAULT_EXPIRY_BATCH;
use proposal_gate_core::runtime::DEFAULT_LIST_LIMIT;
use proposal_gate_core::runtime::DEFAULT_PROPOSAL_TTL_MS;
use proposal_gate_core::runtime::MAX_LIST_LIMIT;
use proposal_gate_store_sqlite::SqliteStoreConfig;
use proposal_gate_store_sqlite::SqliteStoreMode;
use proposal_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "proposal-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "PROPOSAL_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of configured bearer tokens.
pub(crate) const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a single bearer token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum length of a configured tenant identifier.
pub(crate) const MAX_TENANT_ID_LENGTH: usize = 128;
/// Shortest accepted proposal TTL (1 second).
pub(crate) const MIN_PROPOSAL_TTL_MS: u64 = 1_000;
/// Longest accepted proposal TTL (24 hours).
pub(crate) const MAX_PROPOSAL_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Shortest accepted lock wait bound.
pub(crate) const MIN_LOCK_TIMEOUT_MS: u64 = 100;
/// Longest accepted lock wait bound.
pub(crate) const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;
/// Shortest accepted expiry sweep interval.
pub(crate) const MIN_SWEEP_INTERVAL_MS: u64 = 1_000;
/// Largest accepted request body.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration for the proposal gate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Proposal lifecycle configuration.
    #[serde(default)]
    pub proposals: ProposalsConfig,
    /// Transaction lock configuration.
    #[serde(default)]
    pub locks: LocksConfig,
    /// Trust tier escalations.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl ProposalGateConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then `PROPOSAL_GATE_CONFIG`, then
    /// `./proposal-gate.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.proposals.validate()?;
        self.locks.validate()?;
        self.trust.validate()?;
        Ok(())
    }

    /// Returns the lifecycle controller configuration.
    #[must_use]
    pub const fn controller_config(&self) -> ProposalControllerConfig {
        ProposalControllerConfig {
            proposal_ttl_ms: self.proposals.ttl_ms,
            default_list_limit: self.proposals.default_list_limit,
            max_list_limit: self.proposals.max_list_limit,
            expiry_batch: self.proposals.expiry_batch,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Inbound authentication.
    #[serde(default)]
    pub auth: ServerAuthConfig,
    /// Request audit logging.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            auth: ServerAuthConfig::default(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address is malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!("invalid server.bind address: {}", self.bind))
            })
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        if self.auth.mode == ServerAuthMode::LocalOnly && !addr.ip().is_loopback() {
            return Err(ConfigError::Invalid(
                "non-loopback bind disallowed with local_only auth".to_string(),
            ));
        }
        self.auth.validate()?;
        self.audit.validate()
    }
}

/// Inbound auth modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerAuthMode {
    /// Loopback callers act as a single configured tenant.
    #[default]
    LocalOnly,
    /// Bearer tokens, each bound to one tenant.
    BearerToken,
}

/// Bearer token bound to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantTokenConfig {
    /// Token presented in `Authorization: Bearer`.
    pub token: String,
    /// Tenant the token authenticates as.
    pub tenant_id: String,
}

/// Server authentication configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuthConfig {
    /// Auth mode.
    #[serde(default)]
    pub mode: ServerAuthMode,
    /// Tenant bound to loopback callers in `local_only` mode.
    #[serde(default = "default_local_tenant_id")]
    pub local_tenant_id: String,
    /// Accepted bearer tokens (required for `bearer_token` mode).
    #[serde(default)]
    pub tokens: Vec<TenantTokenConfig>,
}

impl Default for ServerAuthConfig {
    fn default() -> Self {
        Self {
            mode: ServerAuthMode::default(),
            local_tenant_id: default_local_tenant_id(),
            tokens: Vec::new(),
        }
    }
}

impl ServerAuthConfig {
    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_tenant_id("server.auth.local_tenant_id", &self.local_tenant_id)?;
        if self.tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many auth tokens".to_string()));
        }
        let mut seen = BTreeSet::new();
        for entry in &self.tokens {
            if entry.token.trim().is_empty() {
                return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
            }
            if entry.token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("auth token too long".to_string()));
            }
            if entry.token.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "auth token must not contain whitespace".to_string(),
                ));
            }
            if !seen.insert(entry.token.as_str()) {
                return Err(ConfigError::Invalid("auth tokens must be unique".to_string()));
            }
            validate_tenant_id("server.auth.tokens.tenant_id", &entry.tenant_id)?;
        }
        match self.mode {
            ServerAuthMode::LocalOnly => Ok(()),
            ServerAuthMode::BearerToken => {
                if self.tokens.is_empty() {
                    return Err(ConfigError::Invalid(
                        "bearer_token auth requires tokens".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Request audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when omitted.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Process-local in-memory store.
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// Database path (required for `sqlite`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` configuration when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set store.path".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid(
                        "sqlite store requires store.path".to_string(),
                    ));
                };
                validate_path_string("store.path", &path.to_string_lossy())?;
            }
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Proposals
// ============================================================================

/// Proposal lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalsConfig {
    /// Proposal time-to-live in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Listing size when the caller does not ask for one.
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
    /// Largest listing size a caller may ask for.
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: usize,
    /// Interval between background expiry sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub expiry_sweep_interval_ms: u64,
    /// Proposals expired per sweep.
    #[serde(default = "default_expiry_batch")]
    pub expiry_batch: usize,
}

impl Default for ProposalsConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            default_list_limit: default_list_limit(),
            max_list_limit: default_max_list_limit(),
            expiry_sweep_interval_ms: default_sweep_interval_ms(),
            expiry_batch: default_expiry_batch(),
        }
    }
}

impl ProposalsConfig {
    /// Returns the sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_interval_ms)
    }

    /// Validates proposal configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PROPOSAL_TTL_MS ..= MAX_PROPOSAL_TTL_MS).contains(&self.ttl_ms) {
            return Err(ConfigError::Invalid(
                "proposals.ttl_ms must be between 1 second and 24 hours".to_string(),
            ));
        }
        if self.max_list_limit == 0 || self.max_list_limit > MAX_LIST_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "proposals.max_list_limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        if self.default_list_limit == 0 || self.default_list_limit > self.max_list_limit {
            return Err(ConfigError::Invalid(
                "proposals.default_list_limit must be between 1 and max_list_limit".to_string(),
            ));
        }
        if self.expiry_sweep_interval_ms < MIN_SWEEP_INTERVAL_MS {
            return Err(ConfigError::Invalid(
                "proposals.expiry_sweep_interval_ms must be at least 1000".to_string(),
            ));
        }
        if self.expiry_batch == 0 {
            return Err(ConfigError::Invalid(
                "proposals.expiry_batch must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Locks
// ============================================================================

/// Transaction lock configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocksConfig {
    /// Bound on waiting for a transaction lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub transaction_timeout_ms: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LocksConfig {
    /// Returns the lock wait bound.
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Validates lock configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_LOCK_TIMEOUT_MS ..= MAX_LOCK_TIMEOUT_MS).contains(&self.transaction_timeout_ms) {
            return Err(ConfigError::Invalid(
                "locks.transaction_timeout_ms must be between 100 and 60000".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Trust
// ============================================================================

/// Tier escalation for one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Tool to escalate.
    pub tool: ToolName,
    /// Tier to apply.
    pub tier: TrustTier,
}

/// Trust tier configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Tier escalations applied over the built-in table.
    #[serde(default)]
    pub escalations: Vec<EscalationConfig>,
}

impl TrustConfig {
    /// Builds the trust tier policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an escalation lowers a tier or repeats a
    /// tool.
    pub fn policy(&self) -> Result<TrustTierPolicy, ConfigError> {
        TrustTierPolicy::with_escalations(
            self.escalations.iter().map(|escalation| (escalation.tool, escalation.tier)),
        )
        .map_err(|err| ConfigError::Invalid(format!("trust.escalations: {err}")))
    }

    /// Validates trust configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.policy().map(|_| ())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a configured tenant identifier.
fn validate_tenant_id(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_TENANT_ID_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} too long")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Default request body limit.
pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default tenant for local-only callers.
fn default_local_tenant_id() -> String {
    "tenant-local".to_string()
}

/// Audit logging is on unless disabled.
pub(crate) const fn default_audit_enabled() -> bool {
    true
}

/// Default `SQLite` busy timeout.
pub(crate) const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Default proposal TTL.
pub(crate) const fn default_ttl_ms() -> u64 {
    DEFAULT_PROPOSAL_TTL_MS
}

/// Default listing size.
pub(crate) const fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// Default listing ceiling.
pub(crate) const fn default_max_list_limit() -> usize {
    MAX_LIST_LIMIT
}

/// Default sweep interval (1 minute).
pub(crate) const fn default_sweep_interval_ms() -> u64 {
    60_000
}

/// Default sweep batch.
pub(crate) const fn default_expiry_batch() -> usize {
    DEFAULT_EXPIRY_BATCH
}

/// Default lock wait bound.
pub(crate) const fn default_lock_timeout_ms() -> u64 {
    5_000
}
