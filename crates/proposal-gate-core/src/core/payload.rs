// crates/proposal-gate-core/src/core/payload.rs
// ============================================================================
// Module: Validated Payloads
// Description: Tool payloads that passed the payload validator registry.
// Purpose: Ensure executors only ever see validated, tool-tagged arguments.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`ValidatedPayload`] can only be built inside this crate, by the payload
//! validator registry. Executors receive it instead of a raw JSON value and
//! deserialize their typed argument struct from it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::tooling::ToolName;

// ============================================================================
// SECTION: Validated Payload
// ============================================================================

/// Tool-tagged payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    /// Tool the payload belongs to.
    tool: ToolName,
    /// Validated arguments.
    value: Value,
}

impl ValidatedPayload {
    /// Wraps a payload after validation succeeded.
    pub(crate) const fn new(tool: ToolName, value: Value) -> Self {
        Self {
            tool,
            value,
        }
    }

    /// Returns the tool the payload belongs to.
    #[must_use]
    pub const fn tool(&self) -> ToolName {
        self.tool
    }

    /// Returns the raw validated arguments.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Deserializes the arguments into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the payload does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }
}
