// crates/fleetconf-store-sqlite/tests/common/mod.rs
// ============================================================================
// Module: Common Store Fixtures
// Description: Shared helpers for SQLite config store tests.
// Purpose: Open scratch stores and build config maps tersely.
// Dependencies: fleetconf-core, fleetconf-store-sqlite, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Each test gets its own temporary directory so stores never share files.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::sync::Arc;

use fleetconf_core::ConfigMap;
use fleetconf_core::FieldCatalog;
use fleetconf_store_sqlite::SqliteConfigStore;
use fleetconf_store_sqlite::SqliteStoreConfig;
use serde_json::Value;
use tempfile::TempDir;

/// Opens a fresh store in a new temporary directory.
pub fn temp_store() -> (TempDir, SqliteConfigStore) {
    let temp = TempDir::new().unwrap();
    let store = SqliteConfigStore::open(SqliteStoreConfig::new(temp.path().join("config.db")))
        .expect("store init");
    (temp, store)
}

/// Opens a fresh store with a custom field catalog.
pub fn temp_store_with_catalog(catalog: Arc<dyn FieldCatalog>) -> (TempDir, SqliteConfigStore) {
    let temp = TempDir::new().unwrap();
    let store = SqliteConfigStore::open_with_catalog(
        SqliteStoreConfig::new(temp.path().join("config.db")),
        catalog,
    )
    .expect("store init");
    (temp, store)
}

/// Converts a `json!` object literal into a config map.
pub fn cfg(value: Value) -> ConfigMap {
    value.as_object().cloned().expect("config literal must be an object")
}
