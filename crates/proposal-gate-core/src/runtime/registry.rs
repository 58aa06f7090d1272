// crates/proposal-gate-core/src/runtime/registry.rs
// ============================================================================
// Module: Tool Registries
// Description: Payload validator and executor registries keyed by tool name.
// Purpose: Inject validation and execution behavior into the controller.
// Dependencies: crate::{core, interfaces}, jsonschema, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Registries are built once at startup and handed to the lifecycle
//! controller; nothing here is global.
//!
//! - [`PayloadValidatorRegistry`] compiles one JSON Schema (Draft 2020-12)
//!   per tool. Tools without a schema pass validation unchanged.
//! - [`ExecutorRegistry`] maps tools to [`MutationExecutor`]s. A tool with no
//!   executor is valid but not yet executable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use crate::core::ToolName;
use crate::core::ValidatedPayload;
use crate::interfaces::MutationExecutor;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of schema violations reported per payload.
const MAX_REPORTED_VIOLATIONS: usize = 8;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A schema failed to compile.
    #[error("invalid schema for {tool}: {message}")]
    InvalidSchema {
        /// Tool the schema belongs to.
        tool: ToolName,
        /// Compiler message.
        message: String,
    },
    /// A tool was registered twice.
    #[error("tool already registered: {0}")]
    Duplicate(ToolName),
}

/// Payload failed its tool schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payload for {tool} failed validation: {}", .violations.join("; "))]
pub struct PayloadValidationError {
    /// Tool whose schema rejected the payload.
    pub tool: ToolName,
    /// Schema violations (bounded).
    pub violations: Vec<String>,
}

// ============================================================================
// SECTION: Payload Validator Registry
// ============================================================================

/// Compiled payload schemas keyed by tool.
#[derive(Default)]
pub struct PayloadValidatorRegistry {
    /// Compiled validators.
    validators: BTreeMap<ToolName, Validator>,
}

impl PayloadValidatorRegistry {
    /// Creates an empty registry; every payload passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers the schema for `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the schema is invalid or the tool is
    /// already registered.
    pub fn register(&mut self, tool: ToolName, schema: &Value) -> Result<(), RegistryError> {
        if self.validators.contains_key(&tool) {
            return Err(RegistryError::Duplicate(tool));
        }
        let validator = jsonschema::options().with_draft(Draft::Draft202012).build(schema).map_err(
            |err| RegistryError::InvalidSchema {
                tool,
                message: err.to_string(),
            },
        )?;
        self.validators.insert(tool, validator);
        Ok(())
    }

    /// Returns true when `tool` has a schema.
    #[must_use]
    pub fn has_schema(&self, tool: ToolName) -> bool {
        self.validators.contains_key(&tool)
    }

    /// Validates `payload` for `tool`. Tools without a schema pass through.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadValidationError`] when the payload violates the schema.
    pub fn validate(
        &self,
        tool: ToolName,
        payload: &Value,
    ) -> Result<ValidatedPayload, PayloadValidationError> {
        if let Some(validator) = self.validators.get(&tool) {
            let violations: Vec<String> = validator
                .iter_errors(payload)
                .take(MAX_REPORTED_VIOLATIONS)
                .map(|err| err.to_string())
                .collect();
            if !violations.is_empty() {
                return Err(PayloadValidationError {
                    tool,
                    violations,
                });
            }
        }
        Ok(ValidatedPayload::new(tool, payload.clone()))
    }
}

// ============================================================================
// SECTION: Executor Registry
// ============================================================================

/// Shared executor handle.
pub type SharedExecutor = Arc<dyn MutationExecutor + Send + Sync>;

/// Executors keyed by tool.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    /// Registered executors.
    executors: BTreeMap<ToolName, SharedExecutor>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when `tool` already has one.
    pub fn register(
        &mut self,
        tool: ToolName,
        executor: impl MutationExecutor + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.register_shared(tool, Arc::new(executor))
    }

    /// Registers an already shared executor for `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when `tool` already has one.
    pub fn register_shared(
        &mut self,
        tool: ToolName,
        executor: SharedExecutor,
    ) -> Result<(), RegistryError> {
        if self.executors.contains_key(&tool) {
            return Err(RegistryError::Duplicate(tool));
        }
        self.executors.insert(tool, executor);
        Ok(())
    }

    /// Returns the executor for `tool`, if any.
    #[must_use]
    pub fn get(&self, tool: ToolName) -> Option<&SharedExecutor> {
        self.executors.get(&tool)
    }

    /// Returns the tools that have an executor, in canonical order.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolName> {
        self.executors.keys().copied().collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
