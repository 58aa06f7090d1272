// crates/proposal-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Proposal Store
// Description: Durable proposal, audit, and document storage backed by SQLite WAL.
// Purpose: Persist proposals and tenant documents with conditional writes.
// Dependencies: proposal-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`ProposalStore`], [`AuditLog`], and
//! [`DocumentStore`] over one `SQLite` database.
//!
//! - Proposals are stored as JSON records next to indexed columns for tenant,
//!   session, status, and deadlines. Status transitions run inside an
//!   immediate transaction and only apply when the stored status equals the
//!   transition's source status.
//! - Documents carry a version column. A write is a conditional `UPDATE` (or
//!   an `INSERT` for version zero); zero affected rows means another writer
//!   won and the current version is reported back.
//! - Locked transactions pair an in-process [`AdvisoryLockTable`] key with a
//!   dedicated connection holding `BEGIN IMMEDIATE`, so a transaction's writes
//!   commit or roll back together.
//!
//! Loads verify that decoded records agree with their key columns and fail
//! closed on mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use proposal_gate_core::AdvisoryLockGuard;
use proposal_gate_core::AdvisoryLockTable;
use proposal_gate_core::AuditLog;
use proposal_gate_core::AuditLogEntry;
use proposal_gate_core::DocumentStore;
use proposal_gate_core::DocumentTransaction;
use proposal_gate_core::LockKey;
use proposal_gate_core::Proposal;
use proposal_gate_core::ProposalFilter;
use proposal_gate_core::ProposalId;
use proposal_gate_core::ProposalStatus;
use proposal_gate_core::ProposalStore;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SaveOutcome;
use proposal_gate_core::StatusTransition;
use proposal_gate_core::StoreError;
use proposal_gate_core::TenantId;
use proposal_gate_core::Timestamp;
use proposal_gate_core::VersionedDocument;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum encoded size of one proposal record, audit entry, or document.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` proposal store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
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

impl SqliteStoreConfig {
    /// Returns a configuration for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or key mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// A proposal with the same identifier already exists.
    #[error("sqlite store duplicate proposal: {0}")]
    Duplicate(String),
    /// The database stayed locked past the busy timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Duplicate(message) => Self::Conflict(message),
            SqliteStoreError::Busy(message) => Self::LockTimeout(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error, separating lock contention from other failures.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
            SqliteStoreError::Busy(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed proposal store, audit log, and document store.
///
/// # Invariants
/// - Every proposal query is scoped by `tenant_id` in its predicate.
/// - A stored document's version increases by exactly one per write.
#[derive(Clone)]
pub struct SqliteProposalStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Transaction locks shared by every clone.
    locks: AdvisoryLockTable,
}

impl SqliteProposalStore {
    /// Opens an `SQLite`-backed proposal store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config, config.busy_timeout_ms)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
            locks: AdvisoryLockTable::new(),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `work` inside an immediate transaction on the shared connection.
    fn with_write_tx<T>(
        &self,
        work: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let value = work(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(value)
    }

    /// Runs `work` against the shared connection.
    fn with_connection<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let value = work(&guard)?;
        drop(guard);
        Ok(value)
    }
}

// ============================================================================
// SECTION: Proposal Store
// ============================================================================

impl ProposalStore for SqliteProposalStore {
    fn insert(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let record = encode_record(proposal)?;
        self.with_write_tx(|tx| {
            let inserted = tx
                .execute(
                    "INSERT INTO proposals (proposal_id, tenant_id, session_id, status, \
                     created_at, expires_at, record_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(proposal_id) DO NOTHING",
                    params![
                        proposal.proposal_id.as_str(),
                        proposal.tenant_id.as_str(),
                        proposal.session_id.as_str(),
                        proposal.status.as_str(),
                        proposal.created_at.as_unix_millis(),
                        proposal.expires_at.as_unix_millis(),
                        record
                    ],
                )
                .map_err(|err| db_error(&err))?;
            if inserted == 0 {
                return Err(SqliteStoreError::Duplicate(proposal.proposal_id.to_string()));
            }
            Ok(())
        })
        .map_err(StoreError::from)
    }

    fn get(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Option<Proposal>, StoreError> {
        self.with_connection(|connection| load_proposal(connection, tenant_id, proposal_id))
            .map_err(StoreError::from)
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ProposalFilter,
        limit: usize,
    ) -> Result<Vec<Proposal>, StoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("list limit too large".to_string()))?;
        let session = filter.session_id.as_ref().map(|session| session.as_str().to_string());
        let status = filter.status.map(|status| status.as_str().to_string());
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT proposal_id, record_json FROM proposals WHERE tenant_id = ?1 AND \
                     (?2 IS NULL OR session_id = ?2) AND (?3 IS NULL OR status = ?3) ORDER BY \
                     created_at DESC, proposal_id DESC LIMIT ?4",
                )
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![tenant_id.as_str(), session, status, limit], |row| {
                    let proposal_id: String = row.get(0)?;
                    let record: Vec<u8> = row.get(1)?;
                    Ok((proposal_id, record))
                })
                .map_err(|err| db_error(&err))?;
            let mut proposals = Vec::new();
            for row in rows {
                let (proposal_id, record) = row.map_err(|err| db_error(&err))?;
                proposals.push(decode_proposal(tenant_id, &proposal_id, &record)?);
            }
            Ok(proposals)
        })
        .map_err(StoreError::from)
    }

    fn transition(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
        transition: &StatusTransition,
    ) -> Result<Option<Proposal>, StoreError> {
        if !transition.is_allowed() {
            return Err(StoreError::Invalid(format!(
                "transition {} -> {} is not allowed",
                transition.from, transition.to
            )));
        }
        self.with_write_tx(|tx| {
            let Some(mut proposal) = load_proposal(tx, tenant_id, proposal_id)? else {
                return Ok(None);
            };
            if proposal.status != transition.from {
                return Ok(None);
            }
            proposal.apply(transition);
            let changed = update_proposal(tx, &proposal, transition.from)?;
            Ok(changed.then_some(proposal))
        })
        .map_err(StoreError::from)
    }

    fn expire_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: Timestamp,
        limit: usize,
    ) -> Result<usize, StoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid("expiry batch too large".to_string()))?;
        let tenant = tenant_id.map(|tenant| tenant.as_str().to_string());
        let expiry = StatusTransition::new(ProposalStatus::Pending, ProposalStatus::Expired, now);
        self.with_write_tx(|tx| {
            let due = {
                let mut statement = tx
                    .prepare(
                        "SELECT tenant_id, proposal_id, record_json FROM proposals WHERE status \
                         = ?1 AND expires_at <= ?2 AND (?3 IS NULL OR tenant_id = ?3) ORDER BY \
                         expires_at ASC LIMIT ?4",
                    )
                    .map_err(|err| db_error(&err))?;
                let rows = statement
                    .query_map(
                        params![
                            ProposalStatus::Pending.as_str(),
                            now.as_unix_millis(),
                            tenant,
                            limit
                        ],
                        |row| {
                            let tenant_id: String = row.get(0)?;
                            let proposal_id: String = row.get(1)?;
                            let record: Vec<u8> = row.get(2)?;
                            Ok((tenant_id, proposal_id, record))
                        },
                    )
                    .map_err(|err| db_error(&err))?;
                let mut due = Vec::new();
                for row in rows {
                    let (tenant_id, proposal_id, record) = row.map_err(|err| db_error(&err))?;
                    due.push(decode_proposal(&TenantId::new(tenant_id), &proposal_id, &record)?);
                }
                due
            };
            let mut expired = 0;
            for mut proposal in due {
                proposal.apply(&expiry);
                if update_proposal(tx, &proposal, ProposalStatus::Pending)? {
                    expired += 1;
                }
            }
            Ok(expired)
        })
        .map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

impl AuditLog for SqliteProposalStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let record = encode_record(entry)?;
        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO audit_log (tenant_id, proposal_id, entry_json, recorded_at) VALUES \
                 (?1, ?2, ?3, ?4)",
                params![
                    entry.tenant_id.as_str(),
                    entry.proposal_id.as_str(),
                    record,
                    entry.recorded_at.as_unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .map_err(StoreError::from)
    }

    fn entries_for(
        &self,
        tenant_id: &TenantId,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT entry_json FROM audit_log WHERE tenant_id = ?1 AND proposal_id = ?2 \
                     ORDER BY entry_id ASC",
                )
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![tenant_id.as_str(), proposal_id.as_str()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .map_err(|err| db_error(&err))?;
            let mut entries = Vec::new();
            for row in rows {
                let bytes = row.map_err(|err| db_error(&err))?;
                let entry: AuditLogEntry = serde_json::from_slice(&bytes)
                    .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                if entry.tenant_id != *tenant_id || entry.proposal_id != *proposal_id {
                    return Err(SqliteStoreError::Corrupt(
                        "audit entry key mismatch between columns and payload".to_string(),
                    ));
                }
                entries.push(entry);
            }
            Ok(entries)
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Document Store
// ============================================================================

impl DocumentStore for SqliteProposalStore {
    fn load(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
    ) -> Result<VersionedDocument, StoreError> {
        self.with_connection(|connection| load_document(connection, tenant_id, resource))
            .map_err(StoreError::from)
    }

    fn try_save(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        let body = encode_record(document)?;
        self.with_write_tx(|tx| compare_and_save(tx, tenant_id, resource, &body, expected_version))
            .map_err(StoreError::from)
    }

    fn begin_locked(
        &self,
        tenant_id: &TenantId,
        lock_key: LockKey,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentTransaction + Send>, StoreError> {
        let guard = self.locks.acquire(lock_key, timeout)?;
        let busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let connection = open_connection(&self.config, busy_timeout_ms)?;
        connection.execute_batch("BEGIN IMMEDIATE;").map_err(|err| db_error(&err))?;
        Ok(Box::new(SqliteDocumentTransaction {
            connection,
            tenant_id: tenant_id.clone(),
            finished: false,
            _guard: guard,
        }))
    }
}

/// Lock-holding document transaction on a dedicated connection.
struct SqliteDocumentTransaction {
    /// Connection holding `BEGIN IMMEDIATE`.
    connection: Connection,
    /// Tenant scope.
    tenant_id: TenantId,
    /// Whether `COMMIT` completed.
    finished: bool,
    /// Held lock, released on drop after the rollback.
    _guard: AdvisoryLockGuard,
}

impl DocumentTransaction for SqliteDocumentTransaction {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    fn load(&mut self, resource: &ResourceId) -> Result<VersionedDocument, StoreError> {
        load_document(&self.connection, &self.tenant_id, resource).map_err(StoreError::from)
    }

    fn try_save(
        &mut self,
        resource: &ResourceId,
        document: &Value,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        let body = encode_record(document)?;
        compare_and_save(&self.connection, &self.tenant_id, resource, &body, expected_version)
            .map_err(StoreError::from)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.connection.execute_batch("COMMIT;").map_err(|err| db_error(&err))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteDocumentTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.connection.execute_batch("ROLLBACK;");
        }
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Serializes a record and enforces [`MAX_RECORD_BYTES`].
fn encode_record<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SqliteStoreError> {
    let bytes =
        serde_json::to_vec(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Decodes a proposal record and checks it against its key columns.
fn decode_proposal(
    tenant_id: &TenantId,
    proposal_id: &str,
    bytes: &[u8],
) -> Result<Proposal, SqliteStoreError> {
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let proposal: Proposal =
        serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    if proposal.proposal_id.as_str() != proposal_id || proposal.tenant_id != *tenant_id {
        return Err(SqliteStoreError::Corrupt(format!(
            "proposal {proposal_id} key mismatch between columns and payload"
        )));
    }
    Ok(proposal)
}

/// Loads one tenant-scoped proposal.
fn load_proposal(
    connection: &Connection,
    tenant_id: &TenantId,
    proposal_id: &ProposalId,
) -> Result<Option<Proposal>, SqliteStoreError> {
    let row: Option<(String, Vec<u8>)> = connection
        .query_row(
            "SELECT status, record_json FROM proposals WHERE tenant_id = ?1 AND proposal_id = ?2",
            params![tenant_id.as_str(), proposal_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    let Some((status, record)) = row else {
        return Ok(None);
    };
    let proposal = decode_proposal(tenant_id, proposal_id.as_str(), &record)?;
    if proposal.status.as_str() != status {
        return Err(SqliteStoreError::Corrupt(format!(
            "proposal {proposal_id} status column disagrees with payload"
        )));
    }
    Ok(Some(proposal))
}

/// Writes `proposal` when the stored status still equals `from`. Returns
/// whether a row changed.
fn update_proposal(
    connection: &Connection,
    proposal: &Proposal,
    from: ProposalStatus,
) -> Result<bool, SqliteStoreError> {
    let record = encode_record(proposal)?;
    let changed = connection
        .execute(
            "UPDATE proposals SET status = ?1, record_json = ?2 WHERE tenant_id = ?3 AND \
             proposal_id = ?4 AND status = ?5",
            params![
                proposal.status.as_str(),
                record,
                proposal.tenant_id.as_str(),
                proposal.proposal_id.as_str(),
                from.as_str()
            ],
        )
        .map_err(|err| db_error(&err))?;
    Ok(changed == 1)
}

/// Reads a tenant document, returning the empty snapshot when absent.
fn load_document(
    connection: &Connection,
    tenant_id: &TenantId,
    resource: &ResourceId,
) -> Result<VersionedDocument, SqliteStoreError> {
    let row: Option<(Vec<u8>, i64)> = connection
        .query_row(
            "SELECT document_json, version FROM tenant_documents WHERE tenant_id = ?1 AND \
             resource = ?2",
            params![tenant_id.as_str(), resource.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    let Some((bytes, version)) = row else {
        return Ok(VersionedDocument::empty(resource.clone()));
    };
    let version = u64::try_from(version)
        .ok()
        .filter(|version| *version >= 1)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid version for {resource}")))?;
    let document: Value =
        serde_json::from_slice(&bytes).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    Ok(VersionedDocument {
        resource: resource.clone(),
        document,
        version,
    })
}

/// Reads the stored version of a document, zero when absent.
fn current_version(
    connection: &Connection,
    tenant_id: &TenantId,
    resource: &ResourceId,
) -> Result<u64, SqliteStoreError> {
    let version: Option<i64> = connection
        .query_row(
            "SELECT version FROM tenant_documents WHERE tenant_id = ?1 AND resource = ?2",
            params![tenant_id.as_str(), resource.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    version.map_or(Ok(0), |version| {
        u64::try_from(version)
            .map_err(|_| SqliteStoreError::Corrupt(format!("negative version for {resource}")))
    })
}

/// Conditional write: applies only when the stored version equals
/// `expected_version`.
fn compare_and_save(
    connection: &Connection,
    tenant_id: &TenantId,
    resource: &ResourceId,
    body: &[u8],
    expected_version: u64,
) -> Result<SaveOutcome, SqliteStoreError> {
    let expected = i64::try_from(expected_version)
        .map_err(|_| SqliteStoreError::Invalid("expected version too large".to_string()))?;
    let now = unix_millis();
    let changed = if expected == 0 {
        connection
            .execute(
                "INSERT INTO tenant_documents (tenant_id, resource, document_json, version, \
                 updated_at) VALUES (?1, ?2, ?3, 1, ?4) ON CONFLICT(tenant_id, resource) DO \
                 NOTHING",
                params![tenant_id.as_str(), resource.as_str(), body, now],
            )
            .map_err(|err| db_error(&err))?
    } else {
        connection
            .execute(
                "UPDATE tenant_documents SET document_json = ?1, version = version + 1, \
                 updated_at = ?2 WHERE tenant_id = ?3 AND resource = ?4 AND version = ?5",
                params![body, now, tenant_id.as_str(), resource.as_str(), expected],
            )
            .map_err(|err| db_error(&err))?
    };
    if changed == 1 {
        return Ok(SaveOutcome::Saved {
            new_version: expected_version + 1,
        });
    }
    Ok(SaveOutcome::Conflict {
        current_version: current_version(connection, tenant_id, resource)?,
    })
}

// ============================================================================
// SECTION: Setup Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(
    config: &SqliteStoreConfig,
    busy_timeout_ms: u64,
) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config, busy_timeout_ms)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
    busy_timeout_ms: u64,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection.busy_timeout(Duration::from_millis(busy_timeout_ms)).map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS proposals (
                    proposal_id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    session_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    record_json BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_proposals_tenant_created
                    ON proposals (tenant_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_proposals_status_expiry
                    ON proposals (status, expires_at);
                CREATE TABLE IF NOT EXISTS audit_log (
                    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tenant_id TEXT NOT NULL,
                    proposal_id TEXT NOT NULL,
                    entry_json BLOB NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_log_proposal
                    ON audit_log (tenant_id, proposal_id);
                CREATE TABLE IF NOT EXISTS tenant_documents (
                    tenant_id TEXT NOT NULL,
                    resource TEXT NOT NULL,
                    document_json BLOB NOT NULL,
                    version INTEGER NOT NULL CHECK (version >= 1),
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (tenant_id, resource)
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
