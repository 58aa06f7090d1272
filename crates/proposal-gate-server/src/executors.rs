// crates/proposal-gate-server/src/executors.rs
// ============================================================================
// Module: Built-in Document Executors
// Description: Document-backed executors for the storefront, catalog, and onboarding tools.
// Purpose: Make the confirm pipeline usable end to end with minimal business logic.
// Dependencies: proposal-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Each executor edits one tenant document through the lock-then-version
//! sequence in [`proposal_gate_core::read_modify_write`]:
//!
//! | Tool | Document | Lock key |
//! |---|---|---|
//! | `update_storefront_draft`, `update_branding` | `storefront:draft` | storefront |
//! | `upsert_package`, `update_package_price` | `catalog:packages` | catalog |
//! | `publish_storefront` | `storefront:draft` -> `storefront:live` | storefront |
//! | `update_onboarding_phase` | `onboarding` | onboarding |
//!
//! Booking and payment tools have no executor; confirming them yields
//! [`ConfirmOutcome::NotExecutable`](proposal_gate_core::ConfirmOutcome).
//! Error messages name resources and identifiers, never payload values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use proposal_gate_core::ExecutionError;
use proposal_gate_core::ExecutorRegistry;
use proposal_gate_core::MutationExecutor;
use proposal_gate_core::RegistryError;
use proposal_gate_core::ResourceId;
use proposal_gate_core::SharedDocumentStore;
use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use proposal_gate_core::ValidatedPayload;
use proposal_gate_core::lock_key::catalog_lock_key;
use proposal_gate_core::lock_key::onboarding_lock_key;
use proposal_gate_core::lock_key::storefront_lock_key;
use proposal_gate_core::read_modify_write;
use proposal_gate_core::save_guarded;
use proposal_gate_core::with_locked_transaction;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Resources
// ============================================================================

/// Editable storefront draft.
pub const STOREFRONT_DRAFT_RESOURCE: &str = "storefront:draft";
/// Customer-visible storefront.
pub const STOREFRONT_LIVE_RESOURCE: &str = "storefront:live";
/// Package catalog.
pub const CATALOG_RESOURCE: &str = "catalog:packages";
/// Onboarding progress.
pub const ONBOARDING_RESOURCE: &str = "onboarding";

/// Tools served by [`DocumentExecutor`].
pub const DOCUMENT_TOOLS: [ToolName; 6] = [
    ToolName::UpdateOnboardingPhase,
    ToolName::UpdateStorefrontDraft,
    ToolName::UpdateBranding,
    ToolName::UpsertPackage,
    ToolName::UpdatePackagePrice,
    ToolName::PublishStorefront,
];

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// `update_onboarding_phase` arguments.
#[derive(Debug, Deserialize)]
struct PhaseChange {
    /// Target phase label.
    phase: String,
}

/// `update_storefront_draft` arguments.
#[derive(Debug, Deserialize)]
struct DraftChange {
    /// Top-level draft fields to overwrite.
    fields: Map<String, Value>,
}

/// `update_branding` arguments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrandingChange {
    /// Hex accent color.
    primary_color: Option<String>,
    /// Logo location.
    logo_url: Option<String>,
    /// Short tagline.
    tagline: Option<String>,
}

/// `upsert_package` arguments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageUpsert {
    /// Package identifier.
    package_id: String,
    /// Display name.
    name: String,
    /// Price in minor units.
    price: u64,
    /// Optional description.
    description: Option<String>,
}

/// `update_package_price` arguments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceChange {
    /// Package identifier.
    package_id: String,
    /// New price in minor units.
    price: u64,
}

/// `publish_storefront` arguments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest {
    /// Draft version the operator reviewed.
    expected_draft_version: Option<u64>,
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Executor for one document-backed tool.
#[derive(Clone)]
pub struct DocumentExecutor {
    /// Tool this executor serves.
    tool: ToolName,
    /// Tenant document storage.
    documents: SharedDocumentStore,
    /// Bounded wait for transaction locks.
    lock_timeout: Duration,
}

impl DocumentExecutor {
    /// Creates the executor for `tool`.
    #[must_use]
    pub const fn new(
        tool: ToolName,
        documents: SharedDocumentStore,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            tool,
            documents,
            lock_timeout,
        }
    }

    /// Sets `phase` on the onboarding document.
    fn update_onboarding_phase(
        &self,
        tenant_id: &TenantId,
        change: PhaseChange,
    ) -> Result<Value, ExecutionError> {
        let resource = ResourceId::new(ONBOARDING_RESOURCE);
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &resource,
            onboarding_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut document = current.object_or_empty();
                document.insert("phase".to_string(), Value::String(change.phase.clone()));
                Ok(Value::Object(document))
            },
        )?;
        Ok(json!({
            "resource": ONBOARDING_RESOURCE,
            "version": write.new_version,
            "phase": change.phase,
        }))
    }

    /// Overwrites top-level draft fields.
    fn update_storefront_draft(
        &self,
        tenant_id: &TenantId,
        change: DraftChange,
    ) -> Result<Value, ExecutionError> {
        let resource = ResourceId::new(STOREFRONT_DRAFT_RESOURCE);
        let updated: Vec<String> = change.fields.keys().cloned().collect();
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &resource,
            storefront_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut document = current.object_or_empty();
                for (key, value) in change.fields {
                    document.insert(key, value);
                }
                Ok(Value::Object(document))
            },
        )?;
        Ok(json!({
            "resource": STOREFRONT_DRAFT_RESOURCE,
            "version": write.new_version,
            "updatedFields": updated,
        }))
    }

    /// Merges branding fields under `branding` in the draft.
    fn update_branding(
        &self,
        tenant_id: &TenantId,
        change: BrandingChange,
    ) -> Result<Value, ExecutionError> {
        let resource = ResourceId::new(STOREFRONT_DRAFT_RESOURCE);
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &resource,
            storefront_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut document = current.object_or_empty();
                let mut branding = child_object(&document, "branding");
                for (key, value) in [
                    ("primaryColor", change.primary_color),
                    ("logoUrl", change.logo_url),
                    ("tagline", change.tagline),
                ] {
                    if let Some(value) = value {
                        branding.insert(key.to_string(), Value::String(value));
                    }
                }
                document.insert("branding".to_string(), Value::Object(branding));
                Ok(Value::Object(document))
            },
        )?;
        Ok(json!({
            "resource": STOREFRONT_DRAFT_RESOURCE,
            "version": write.new_version,
            "branding": write.document.get("branding").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Creates or replaces a catalog package.
    fn upsert_package(
        &self,
        tenant_id: &TenantId,
        upsert: PackageUpsert,
    ) -> Result<Value, ExecutionError> {
        let resource = ResourceId::new(CATALOG_RESOURCE);
        let mut created = false;
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &resource,
            catalog_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut document = current.object_or_empty();
                let mut packages = child_object(&document, "packages");
                let mut record = Map::new();
                record.insert("name".to_string(), Value::String(upsert.name.clone()));
                record.insert("price".to_string(), json!(upsert.price));
                if let Some(description) = &upsert.description {
                    record.insert("description".to_string(), Value::String(description.clone()));
                }
                created = packages
                    .insert(upsert.package_id.clone(), Value::Object(record))
                    .is_none();
                document.insert("packages".to_string(), Value::Object(packages));
                Ok(Value::Object(document))
            },
        )?;
        Ok(json!({
            "resource": CATALOG_RESOURCE,
            "version": write.new_version,
            "packageId": upsert.package_id,
            "created": created,
        }))
    }

    /// Changes the price of an existing package.
    fn update_package_price(
        &self,
        tenant_id: &TenantId,
        change: PriceChange,
    ) -> Result<Value, ExecutionError> {
        let resource = ResourceId::new(CATALOG_RESOURCE);
        let mut previous = Value::Null;
        let write = read_modify_write(
            &self.documents,
            tenant_id,
            &resource,
            catalog_lock_key(tenant_id),
            self.lock_timeout,
            |current| {
                let mut document = current.object_or_empty();
                let mut packages = child_object(&document, "packages");
                let Some(Value::Object(record)) = packages.get_mut(&change.package_id) else {
                    return Err(ExecutionError::rejected(format!(
                        "package {} does not exist",
                        change.package_id
                    )));
                };
                previous =
                    record.insert("price".to_string(), json!(change.price)).unwrap_or(Value::Null);
                document.insert("packages".to_string(), Value::Object(packages));
                Ok(Value::Object(document))
            },
        )?;
        Ok(json!({
            "resource": CATALOG_RESOURCE,
            "version": write.new_version,
            "packageId": change.package_id,
            "previousPrice": previous,
            "price": change.price,
        }))
    }

    /// Copies the draft into the live storefront.
    fn publish_storefront(
        &self,
        tenant_id: &TenantId,
        request: &PublishRequest,
    ) -> Result<Value, ExecutionError> {
        let draft_resource = ResourceId::new(STOREFRONT_DRAFT_RESOURCE);
        let live_resource = ResourceId::new(STOREFRONT_LIVE_RESOURCE);
        let (write, draft_version) = with_locked_transaction(
            &self.documents,
            tenant_id,
            storefront_lock_key(tenant_id),
            self.lock_timeout,
            |transaction| {
                let draft = transaction.load(&draft_resource)?;
                if draft.version == 0 {
                    return Err(ExecutionError::rejected("storefront draft is empty"));
                }
                if let Some(expected) = request.expected_draft_version
                    && expected != draft.version
                {
                    return Err(ExecutionError::concurrent_modification(
                        &draft_resource,
                        draft.version,
                    ));
                }
                let live = transaction.load(&live_resource)?;
                let published = json!({
                    "content": draft.document,
                    "publishedDraftVersion": draft.version,
                });
                let write = save_guarded(transaction, &live_resource, published, live.version)?;
                Ok((write, draft.version))
            },
        )?;
        Ok(json!({
            "resource": STOREFRONT_LIVE_RESOURCE,
            "version": write.new_version,
            "publishedDraftVersion": draft_version,
        }))
    }
}

impl MutationExecutor for DocumentExecutor {
    fn execute(
        &self,
        tenant_id: &TenantId,
        payload: &ValidatedPayload,
    ) -> Result<Value, ExecutionError> {
        if payload.tool() != self.tool {
            return Err(ExecutionError::internal(format!(
                "{} executor received a {} payload",
                self.tool,
                payload.tool()
            )));
        }
        match self.tool {
            ToolName::UpdateOnboardingPhase => {
                self.update_onboarding_phase(tenant_id, typed(payload)?)
            }
            ToolName::UpdateStorefrontDraft => {
                self.update_storefront_draft(tenant_id, typed(payload)?)
            }
            ToolName::UpdateBranding => self.update_branding(tenant_id, typed(payload)?),
            ToolName::UpsertPackage => self.upsert_package(tenant_id, typed(payload)?),
            ToolName::UpdatePackagePrice => self.update_package_price(tenant_id, typed(payload)?),
            ToolName::PublishStorefront => self.publish_storefront(tenant_id, &typed(payload)?),
            ToolName::CreateBooking | ToolName::CancelBooking | ToolName::RecordBalancePayment => {
                Err(ExecutionError::internal(format!("{} has no document executor", self.tool)))
            }
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Builds the executor registry holding every document-backed tool.
///
/// # Errors
///
/// Returns [`RegistryError`] when a tool is registered twice.
pub fn builtin_executors(
    documents: &SharedDocumentStore,
    lock_timeout: Duration,
) -> Result<ExecutorRegistry, RegistryError> {
    let mut registry = ExecutorRegistry::new();
    for tool in DOCUMENT_TOOLS {
        registry.register(tool, DocumentExecutor::new(tool, documents.clone(), lock_timeout))?;
    }
    Ok(registry)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Deserializes a validated payload into its typed arguments.
fn typed<T: DeserializeOwned>(payload: &ValidatedPayload) -> Result<T, ExecutionError> {
    payload.parse().map_err(|_| {
        ExecutionError::internal(format!("payload does not match the {} contract", payload.tool()))
    })
}

/// Returns a clone of the object stored under `key`, or an empty object.
fn child_object(document: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match document.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
