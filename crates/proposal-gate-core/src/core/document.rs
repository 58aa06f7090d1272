// crates/proposal-gate-core/src/core/document.rs
// ============================================================================
// Module: Versioned Tenant Documents
// Description: Per-tenant JSON documents guarded by a version counter.
// Purpose: Model optimistic concurrency outcomes for document writes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A tenant document is a JSON value plus a monotonically increasing version.
//! A never-written document reads as `null` at version 0. Writes name the
//! version they were computed from; a write against a stale version reports
//! the current version instead of overwriting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ResourceId;

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Snapshot of a tenant document.
///
/// # Invariants
/// - `version` increments by exactly one per successful write.
/// - `version == 0` implies the document has never been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    /// Document name.
    pub resource: ResourceId,
    /// Document body.
    pub document: Value,
    /// Version the body was read at.
    pub version: u64,
}

impl VersionedDocument {
    /// Returns the empty snapshot for a never-written document.
    #[must_use]
    pub const fn empty(resource: ResourceId) -> Self {
        Self {
            resource,
            document: Value::Null,
            version: 0,
        }
    }

    /// Returns the body as an object map, treating `null` as empty.
    #[must_use]
    pub fn object_or_empty(&self) -> serde_json::Map<String, Value> {
        match &self.document {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

/// Outcome of a version-guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The write applied.
    Saved {
        /// Version after the write.
        new_version: u64,
    },
    /// Another writer committed first; nothing was written.
    Conflict {
        /// Version currently stored.
        current_version: u64,
    },
}

impl SaveOutcome {
    /// Returns true when the write applied.
    #[must_use]
    pub const fn is_saved(self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}
