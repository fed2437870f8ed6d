// crates/fleetconf-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Config Store Schema Version
// Description: Field-schema fingerprints and the schema version singleton.
// Purpose: Detect drift between stored configs and the running field schemas.
// Dependencies: fleetconf-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The field schemas themselves live outside the store. Callers pass them in
//! as JSON values keyed by service; the store only hashes them. The singleton
//! `schema_version` row holds the combined model hash, and per-service
//! fingerprints let drift be pinned to the services that actually changed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use fleetconf_core::ConfigStoreError;
use fleetconf_core::SchemaFingerprint;
use fleetconf_core::SchemaVersion;
use fleetconf_core::hashing::config_checksum;
use fleetconf_core::time::unix_millis;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value;

use crate::store::SqliteConfigStore;
use crate::store::db_error;

// ============================================================================
// SECTION: Schema Version
// ============================================================================

impl SqliteConfigStore {
    /// Computes the combined model hash over every service schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Invalid`] when canonicalization fails.
    pub fn compute_model_hash(
        schemas: &BTreeMap<String, Value>,
    ) -> Result<String, ConfigStoreError> {
        Ok(config_checksum(schemas)?)
    }

    /// Returns true when the stored model hash equals `expected_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn validate_schema_version(&self, expected_hash: &str) -> Result<bool, ConfigStoreError> {
        Ok(self.schema_version()?.is_some_and(|current| current.model_hash == expected_hash))
    }

    /// Records `new_hash` and bumps the schema version. Returns the new number.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the write fails.
    pub fn increment_schema_version(&self, new_hash: &str) -> Result<i64, ConfigStoreError> {
        let now = unix_millis();
        let version = {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(db_error)?;
            let current = load_schema_version(&tx)?;
            let next = match current {
                Some(current) => current.version.checked_add(1).ok_or_else(|| {
                    ConfigStoreError::Storage("schema version overflow".to_string())
                })?,
                None => 1,
            };
            tx.execute(
                "INSERT INTO schema_version (id, version, model_hash, updated_at) VALUES (1, ?1, \
                 ?2, ?3) ON CONFLICT(id) DO UPDATE SET version = excluded.version, model_hash = \
                 excluded.model_hash, updated_at = excluded.updated_at",
                params![next, new_hash, now],
            )
            .map_err(db_error)?;
            tx.commit().map_err(db_error)?;
            drop(guard);
            next
        };
        tracing::info!(version, model_hash = new_hash, "schema version incremented");
        Ok(version)
    }

    /// Returns the schema version singleton.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>, ConfigStoreError> {
        let guard = self.lock()?;
        load_schema_version(&guard)
    }

    /// Records one fingerprint per service schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when hashing or the write fails.
    pub fn record_schema_fingerprints(
        &self,
        schemas: &BTreeMap<String, Value>,
    ) -> Result<(), ConfigStoreError> {
        let hashes = fingerprint_all(schemas)?;
        let now = unix_millis();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        for (service, schema_hash) in &hashes {
            tx.execute(
                "INSERT INTO schema_fingerprints (service, schema_hash, recorded_at) VALUES (?1, \
                 ?2, ?3) ON CONFLICT(service) DO UPDATE SET schema_hash = excluded.schema_hash, \
                 recorded_at = excluded.recorded_at",
                params![service, schema_hash, now],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)?;
        Ok(())
    }

    /// Returns every recorded fingerprint, sorted by service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn schema_fingerprints(&self) -> Result<Vec<SchemaFingerprint>, ConfigStoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT service, schema_hash, recorded_at FROM schema_fingerprints ORDER BY \
                 service",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(SchemaFingerprint {
                    service: row.get(0)?,
                    schema_hash: row.get(1)?,
                    recorded_at: row.get(2)?,
                })
            })
            .map_err(db_error)?;
        let fingerprints = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(fingerprints)
    }

    /// Returns services whose schema differs from the recorded fingerprint.
    ///
    /// Services with no recorded fingerprint count as drifted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when hashing or the read fails.
    pub fn drifted_services(
        &self,
        schemas: &BTreeMap<String, Value>,
    ) -> Result<Vec<String>, ConfigStoreError> {
        let recorded: BTreeMap<String, String> = self
            .schema_fingerprints()?
            .into_iter()
            .map(|fingerprint| (fingerprint.service, fingerprint.schema_hash))
            .collect();
        Ok(fingerprint_all(schemas)?
            .into_iter()
            .filter(|(service, hash)| recorded.get(service) != Some(hash))
            .map(|(service, _)| service)
            .collect())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads the schema version singleton.
pub(crate) fn load_schema_version(
    connection: &Connection,
) -> Result<Option<SchemaVersion>, ConfigStoreError> {
    connection
        .query_row(
            "SELECT version, model_hash, updated_at FROM schema_version WHERE id = 1",
            params![],
            |row| {
                Ok(SchemaVersion {
                    version: row.get(0)?,
                    model_hash: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_error)
}

/// Hashes each service schema.
fn fingerprint_all(
    schemas: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>, ConfigStoreError> {
    schemas
        .iter()
        .map(|(service, schema)| Ok((service.clone(), config_checksum(schema)?)))
        .collect()
}
