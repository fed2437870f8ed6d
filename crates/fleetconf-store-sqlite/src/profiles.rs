// crates/fleetconf-store-sqlite/src/profiles.rs
// ============================================================================
// Module: SQLite Config Store Profiles
// Description: Named full-platform configuration snapshots.
// Purpose: Save, list, load, and delete configuration profiles.
// Dependencies: fleetconf-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! A profile stores the config of every service under one name. Saving an
//! existing name overwrites the snapshot and description but keeps the
//! original creation stamp. Loading never mutates the store; the caller
//! feeds the returned configs through the normal write path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use fleetconf_core::ConfigMap;
use fleetconf_core::ConfigProfile;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::MAX_SERVICE_NAME_LENGTH;
use fleetconf_core::ServiceConfig;
use fleetconf_core::time::unix_millis;
use fleetconf_core::validate_service_name;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::store::SqliteConfigStore;
use crate::store::db_error;

// ============================================================================
// SECTION: Profiles
// ============================================================================

impl SqliteConfigStore {
    /// Upserts a profile and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Invalid`] when the name or snapshot is
    /// missing or malformed, or [`ConfigStoreError::Storage`] on write failure.
    pub fn save_profile(&self, profile: &ConfigProfile) -> Result<ConfigProfile, ConfigStoreError> {
        validate_profile_name(&profile.profile_name)?;
        let snapshot = profile.config_snapshot.as_ref().ok_or_else(|| {
            ConfigStoreError::Invalid("profile config_snapshot must be provided".to_string())
        })?;
        for service in snapshot.keys() {
            validate_service_name(service)?;
        }
        let snapshot_json = serde_json::to_string(snapshot)
            .map_err(|err| ConfigStoreError::Invalid(err.to_string()))?;
        let now = unix_millis();
        let saved = {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(db_error)?;
            tx.execute(
                "INSERT INTO config_profiles (profile_name, description, config_snapshot, \
                 created_at, created_by, updated_at, updated_by) VALUES (?1, ?2, ?3, ?4, ?5, ?4, \
                 ?6) ON CONFLICT(profile_name) DO UPDATE SET description = excluded.description, \
                 config_snapshot = excluded.config_snapshot, updated_at = excluded.updated_at, \
                 updated_by = excluded.updated_by",
                params![
                    profile.profile_name,
                    profile.description,
                    snapshot_json,
                    now,
                    profile.created_by,
                    profile.updated_by
                ],
            )
            .map_err(db_error)?;
            let saved = load_profile_row(&tx, &profile.profile_name)?;
            tx.commit().map_err(db_error)?;
            drop(guard);
            saved
        };
        let saved = saved.ok_or_else(|| {
            ConfigStoreError::Storage(format!("profile {} vanished after save", profile.profile_name))
        })?;
        tracing::info!(profile = %profile.profile_name, services = snapshot.len(), "profile saved");
        saved.into_profile(true)
    }

    /// Snapshots every current service into a profile named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when reading or saving fails.
    pub fn capture_profile(
        &self,
        name: &str,
        description: &str,
        saved_by: Option<&str>,
    ) -> Result<ConfigProfile, ConfigStoreError> {
        let snapshot: BTreeMap<String, ConfigMap> = self
            .all_configs()?
            .into_iter()
            .map(|config| (config.service, config.config))
            .collect();
        self.save_profile(&ConfigProfile::new(name, description, snapshot, saved_by))
    }

    /// Lists profiles without snapshots, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn list_profiles(&self) -> Result<Vec<ConfigProfile>, ConfigStoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT profile_name, description, NULL, created_at, created_by, updated_at, \
                 updated_by FROM config_profiles ORDER BY updated_at DESC, profile_name",
            )
            .map_err(db_error)?;
        let rows = stmt.query_map(params![], read_profile_row).map_err(db_error)?;
        let rows = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        drop(stmt);
        drop(guard);
        rows.into_iter().map(|row| row.into_profile(false)).collect()
    }

    /// Returns a profile with its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn get_profile(&self, name: &str) -> Result<Option<ConfigProfile>, ConfigStoreError> {
        let row = {
            let guard = self.lock()?;
            load_profile_row(&guard, name)?
        };
        row.map(|row| row.into_profile(true)).transpose()
    }

    /// Deletes a profile. Returns true when a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the write fails.
    pub fn delete_profile(&self, name: &str) -> Result<bool, ConfigStoreError> {
        let guard = self.lock()?;
        let removed = guard
            .execute("DELETE FROM config_profiles WHERE profile_name = ?1", params![name])
            .map_err(db_error)?;
        drop(guard);
        if removed > 0 {
            tracing::info!(profile = name, "profile deleted");
        }
        Ok(removed > 0)
    }

    /// Materializes a profile as in-memory configs stamped with `epoch`.
    ///
    /// The returned configs carry version 0 because they are not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::NotFound`] when the profile does not exist.
    pub fn load_profile(
        &self,
        name: &str,
        epoch: &str,
        loaded_by: Option<&str>,
    ) -> Result<BTreeMap<String, ServiceConfig>, ConfigStoreError> {
        let profile = self
            .get_profile(name)?
            .ok_or_else(|| ConfigStoreError::NotFound(format!("profile {name}")))?;
        let now = unix_millis();
        let snapshot = profile.config_snapshot.unwrap_or_default();
        Ok(snapshot
            .into_iter()
            .map(|(service, config)| {
                let loaded = ServiceConfig {
                    service: service.clone(),
                    config,
                    version: 0,
                    config_epoch: epoch.to_string(),
                    updated_at: now,
                    updated_by: loaded_by.map(str::to_string),
                };
                (service, loaded)
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw profile row with the snapshot still encoded.
struct ProfileRow {
    /// Profile name.
    profile_name: String,
    /// Description.
    description: String,
    /// Snapshot JSON; `None` in listings.
    config_snapshot: Option<String>,
    /// First save time.
    created_at: i64,
    /// First saver.
    created_by: Option<String>,
    /// Latest save time.
    updated_at: i64,
    /// Latest saver.
    updated_by: Option<String>,
}

impl ProfileRow {
    /// Converts the row, decoding the snapshot when requested.
    fn into_profile(self, with_snapshot: bool) -> Result<ConfigProfile, ConfigStoreError> {
        let config_snapshot = match (with_snapshot, self.config_snapshot) {
            (true, Some(text)) => Some(serde_json::from_str(&text).map_err(|err| {
                ConfigStoreError::Storage(format!(
                    "corrupt snapshot for profile {}: {err}",
                    self.profile_name
                ))
            })?),
            _ => None,
        };
        Ok(ConfigProfile {
            profile_name: self.profile_name,
            description: self.description,
            config_snapshot,
            created_at: self.created_at,
            created_by: self.created_by,
            updated_at: self.updated_at,
            updated_by: self.updated_by,
        })
    }
}

/// Maps a profile row.
fn read_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        profile_name: row.get(0)?,
        description: row.get(1)?,
        config_snapshot: row.get(2)?,
        created_at: row.get(3)?,
        created_by: row.get(4)?,
        updated_at: row.get(5)?,
        updated_by: row.get(6)?,
    })
}

/// Loads a full profile row by name.
fn load_profile_row(
    connection: &Connection,
    name: &str,
) -> Result<Option<ProfileRow>, ConfigStoreError> {
    connection
        .query_row(
            "SELECT profile_name, description, config_snapshot, created_at, created_by, \
             updated_at, updated_by FROM config_profiles WHERE profile_name = ?1",
            params![name],
            read_profile_row,
        )
        .optional()
        .map_err(db_error)
}

/// Validates a profile name.
fn validate_profile_name(name: &str) -> Result<(), ConfigStoreError> {
    if name.trim().is_empty() {
        return Err(ConfigStoreError::Invalid("profile name must be non-empty".to_string()));
    }
    if name.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(ConfigStoreError::Invalid("profile name exceeds max length".to_string()));
    }
    Ok(())
}
