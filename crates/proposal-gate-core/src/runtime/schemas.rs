// crates/proposal-gate-core/src/runtime/schemas.rs
// ============================================================================
// Module: Built-in Payload Schemas
// Description: JSON Schemas for every canonical mutation tool.
// Purpose: Provide the default payload validator registry.
// Dependencies: crate::{core, runtime::registry}, serde_json
// ============================================================================

//! ## Overview
//! One JSON Schema per [`ToolName`]. Prices and amounts are integer minor
//! units (cents); dates are `YYYY-MM-DD`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::ToolName;
use crate::runtime::registry::PayloadValidatorRegistry;
use crate::runtime::registry::RegistryError;

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Schema fragment for non-empty identifiers.
fn id_schema() -> Value {
    json!({ "type": "string", "minLength": 1, "maxLength": 128 })
}

/// Returns the built-in payload schema for `tool`.
#[must_use]
pub fn builtin_schema(tool: ToolName) -> Value {
    match tool {
        ToolName::UpdateOnboardingPhase => json!({
            "type": "object",
            "required": ["phase"],
            "additionalProperties": false,
            "properties": {
                "phase": { "type": "string", "minLength": 1, "maxLength": 64 }
            }
        }),
        ToolName::UpdateStorefrontDraft => json!({
            "type": "object",
            "required": ["fields"],
            "additionalProperties": false,
            "properties": {
                "fields": { "type": "object", "minProperties": 1 }
            }
        }),
        ToolName::UpdateBranding => json!({
            "type": "object",
            "minProperties": 1,
            "additionalProperties": false,
            "properties": {
                "primaryColor": { "type": "string", "pattern": "^#[0-9a-fA-F]{6}$" },
                "logoUrl": { "type": "string", "maxLength": 2048 },
                "tagline": { "type": "string", "maxLength": 280 }
            }
        }),
        ToolName::UpsertPackage => json!({
            "type": "object",
            "required": ["packageId", "name", "price"],
            "additionalProperties": false,
            "properties": {
                "packageId": id_schema(),
                "name": { "type": "string", "minLength": 1, "maxLength": 200 },
                "price": { "type": "integer", "minimum": 0 },
                "description": { "type": "string", "maxLength": 4000 }
            }
        }),
        ToolName::UpdatePackagePrice => json!({
            "type": "object",
            "required": ["packageId", "price"],
            "additionalProperties": false,
            "properties": {
                "packageId": id_schema(),
                "price": { "type": "integer", "minimum": 0 }
            }
        }),
        ToolName::PublishStorefront => json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "expectedDraftVersion": { "type": "integer", "minimum": 1 }
            }
        }),
        ToolName::CreateBooking => json!({
            "type": "object",
            "required": ["packageId", "date", "customerEmail"],
            "additionalProperties": false,
            "properties": {
                "packageId": id_schema(),
                "date": { "type": "string", "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}$" },
                "customerEmail": { "type": "string", "minLength": 3, "maxLength": 320 }
            }
        }),
        ToolName::CancelBooking => json!({
            "type": "object",
            "required": ["bookingId"],
            "additionalProperties": false,
            "properties": {
                "bookingId": id_schema(),
                "reason": { "type": "string", "maxLength": 1000 }
            }
        }),
        ToolName::RecordBalancePayment => json!({
            "type": "object",
            "required": ["bookingId", "amount"],
            "additionalProperties": false,
            "properties": {
                "bookingId": id_schema(),
                "amount": { "type": "integer", "minimum": 1 }
            }
        }),
    }
}

/// Builds a validator registry holding every built-in schema.
///
/// # Errors
///
/// Returns [`RegistryError`] when a built-in schema fails to compile.
pub fn builtin_validator_registry() -> Result<PayloadValidatorRegistry, RegistryError> {
    let mut registry = PayloadValidatorRegistry::new();
    for tool in ToolName::all() {
        registry.register(*tool, &builtin_schema(*tool))?;
    }
    Ok(registry)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
