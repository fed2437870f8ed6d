// crates/fleetconf-core/src/interfaces.rs
// ============================================================================
// Module: fleetconf Interfaces
// Description: Trait seams between the store, LKG cache, and field schemas.
// Purpose: Let components depend on capabilities instead of concrete stores.
// Dependencies: serde_json, std
// ============================================================================

//! ## Overview
//! The LKG cache reads through [`ConfigSnapshotSource`] and restores through
//! [`ConfigRebuildTarget`]; it never touches store tables directly.
//! [`FieldCatalog`] is where per-service field schemas plug in metadata for
//! the item projection and the schema descriptions used for drift checks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::error::ConfigStoreError;
use crate::model::ConfigMap;
use crate::model::FieldMeta;
use crate::model::StoreSnapshot;

// ============================================================================
// SECTION: Store Seams
// ============================================================================

/// Read-only view used to snapshot every current configuration.
pub trait ConfigSnapshotSource {
    /// Returns every current config and their epoch from one consistent
    /// read, or `None` when the store is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the read fails.
    fn consistent_snapshot(&self) -> Result<Option<StoreSnapshot>, ConfigStoreError>;
}

/// Restore target for a verified snapshot.
pub trait ConfigRebuildTarget {
    /// Replaces every service row with the snapshot and returns the new epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the rebuild fails.
    fn rebuild_from_snapshot(
        &self,
        snapshot: &BTreeMap<String, ConfigMap>,
        rebuilt_by: Option<&str>,
    ) -> Result<String, ConfigStoreError>;
}

// ============================================================================
// SECTION: Field Catalog
// ============================================================================

/// Supplies field metadata for the item projection.
pub trait FieldCatalog: Send + Sync {
    /// Returns metadata for `service`/`key`.
    fn field_meta(&self, service: &str, key: &str) -> FieldMeta;

    /// Returns a JSON description of each known service schema.
    ///
    /// Hashing these descriptions detects schema drift between releases. An
    /// empty map disables the check.
    fn service_schemas(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

/// Catalog that knows no fields: basic complexity, no description, not secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFieldCatalog;

impl FieldCatalog for DefaultFieldCatalog {
    fn field_meta(&self, _service: &str, _key: &str) -> FieldMeta {
        FieldMeta::default()
    }
}

/// In-memory catalog keyed by `(service, key)`.
#[derive(Debug, Clone, Default)]
pub struct StaticFieldCatalog {
    /// Registered fields.
    fields: BTreeMap<(String, String), FieldMeta>,
}

impl StaticFieldCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers metadata for one field.
    #[must_use]
    pub fn with_field(
        mut self,
        service: impl Into<String>,
        key: impl Into<String>,
        meta: FieldMeta,
    ) -> Self {
        self.fields.insert((service.into(), key.into()), meta);
        self
    }
}

impl FieldCatalog for StaticFieldCatalog {
    fn field_meta(&self, service: &str, key: &str) -> FieldMeta {
        self.fields.get(&(service.to_string(), key.to_string())).cloned().unwrap_or_default()
    }

    fn service_schemas(&self) -> BTreeMap<String, Value> {
        let mut schemas: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for ((service, key), meta) in &self.fields {
            schemas.entry(service.clone()).or_default().insert(
                key.clone(),
                json!({
                    "complexity": meta.complexity,
                    "description": meta.description,
                    "is_secret": meta.is_secret,
                }),
            );
        }
        schemas.into_iter().map(|(service, fields)| (service, Value::Object(fields))).collect()
    }
}
