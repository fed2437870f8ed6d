// crates/fleetconf-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Config Store
// Description: Durable configuration store backed by SQLite WAL.
// Purpose: Own every fleetconf table and the optimistic-locking write path.
// Dependencies: fleetconf-core, rusqlite, serde, serde_json, tracing, uuid
// ============================================================================

//! ## Overview
//! [`SqliteConfigStore`] persists one row per service plus the derived item
//! projection and the append-only history ledger. Every accepted write runs
//! in a single transaction: the version check, the row replacement, one
//! history row per changed key, and the projection rebuild either all land or
//! none do.
//!
//! The store is the sole owner of its tables. The LKG cache reads through
//! [`ConfigSnapshotSource`] and restores through [`ConfigRebuildTarget`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use fleetconf_core::CHANGE_REASON_KEY_DELETED;
use fleetconf_core::CHANGE_REASON_LKG_REBUILD;
use fleetconf_core::ConfigEpochMetadata;
use fleetconf_core::ConfigMap;
use fleetconf_core::ConfigRebuildTarget;
use fleetconf_core::ConfigSnapshotSource;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::ConfigUpdate;
use fleetconf_core::DefaultFieldCatalog;
use fleetconf_core::FieldCatalog;
use fleetconf_core::ServiceConfig;
use fleetconf_core::StoreSnapshot;
use fleetconf_core::hashing::canonical_json_string;
use fleetconf_core::time::unix_millis;
use fleetconf_core::validate_service_name;
use fleetconf_core::value_type_label;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::load_schema_version;

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
/// Placeholder written to history in place of secret field values.
pub const REDACTED_VALUE: &str = "<redacted>";
/// Columns selected for service rows, in [`ServiceRow`] order.
const SERVICE_COLUMNS: &str = "service, config_json, version, config_epoch, updated_at, updated_by";

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
    /// Delete journal mode (legacy).
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
    /// Full synchronous mode (safest).
    Full,
    /// Normal synchronous mode; durable in WAL mode across application crashes.
    #[default]
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

/// Configuration for the `SQLite` config store.
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
    /// Builds a config with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
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
// SECTION: Store
// ============================================================================

/// `SQLite`-backed configuration store with WAL support.
#[derive(Clone)]
pub struct SqliteConfigStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Field metadata source for the item projection.
    catalog: Arc<dyn FieldCatalog>,
}

impl SqliteConfigStore {
    /// Opens the store with the default field catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, ConfigStoreError> {
        Self::open_with_catalog(config, Arc::new(DefaultFieldCatalog))
    }

    /// Opens the store with a custom field catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open_with_catalog(
        config: SqliteStoreConfig,
        catalog: Arc<dyn FieldCatalog>,
    ) -> Result<Self, ConfigStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        tracing::info!(path = %config.path.display(), "config store opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
            catalog,
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the field catalog used by the projection.
    #[must_use]
    pub fn catalog(&self) -> &dyn FieldCatalog {
        self.catalog.as_ref()
    }

    /// Locks the shared connection.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, ConfigStoreError> {
        self.connection.lock().map_err(|_| ConfigStoreError::Storage("mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns the current config for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn get(&self, service: &str) -> Result<Option<ServiceConfig>, ConfigStoreError> {
        let guard = self.lock()?;
        let row = load_service_row(&guard, service)?;
        drop(guard);
        row.map(ServiceRow::into_config).transpose()
    }

    /// Returns every configured service name, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn list_services(&self) -> Result<Vec<String>, ConfigStoreError> {
        let guard = self.lock()?;
        let mut stmt =
            guard.prepare("SELECT service FROM service_configs ORDER BY service").map_err(db_error)?;
        let rows = stmt.query_map(params![], |row| row.get::<_, String>(0)).map_err(db_error)?;
        let services = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(services)
    }

    /// Returns every current service config, sorted by service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn all_configs(&self) -> Result<Vec<ServiceConfig>, ConfigStoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(&format!("SELECT {SERVICE_COLUMNS} FROM service_configs ORDER BY service"))
            .map_err(db_error)?;
        let rows = stmt.query_map(params![], read_service_row).map_err(db_error)?;
        let rows = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        drop(stmt);
        drop(guard);
        rows.into_iter().map(ServiceRow::into_config).collect()
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Writes `config` for `service` and returns the new version.
    ///
    /// When `expected_version` is supplied the write is rejected unless it
    /// equals the stored version (0 for a service that does not exist yet).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::VersionConflict`] on a version mismatch, or
    /// [`ConfigStoreError::Storage`] when the write fails.
    pub fn update(
        &self,
        service: &str,
        config: &ConfigMap,
        expected_version: Option<i64>,
        updated_by: Option<&str>,
    ) -> Result<i64, ConfigStoreError> {
        let mut request = ConfigUpdate::new(service, config.clone());
        request.expected_version = expected_version;
        request.updated_by = updated_by.map(str::to_string);
        self.apply(&request)
    }

    /// Writes unconditionally: creates version 1 or bumps the stored version.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the write fails.
    pub fn put(
        &self,
        service: &str,
        config: &ConfigMap,
        updated_by: Option<&str>,
    ) -> Result<i64, ConfigStoreError> {
        self.update(service, config, None, updated_by)
    }

    /// Writes only when the stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::VersionConflict`] on a version mismatch, or
    /// [`ConfigStoreError::Storage`] when the write fails.
    pub fn compare_and_swap(
        &self,
        service: &str,
        config: &ConfigMap,
        expected_version: i64,
        updated_by: Option<&str>,
    ) -> Result<i64, ConfigStoreError> {
        self.update(service, config, Some(expected_version), updated_by)
    }

    /// Applies a full write request and returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::VersionConflict`] on a version mismatch,
    /// [`ConfigStoreError::Invalid`] for a bad service name, or
    /// [`ConfigStoreError::Storage`] when the write fails.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<i64, ConfigStoreError> {
        self.commit(update).map(|committed| committed.version)
    }

    /// Applies a full write request and returns the row it committed.
    ///
    /// The returned config is built inside the write transaction, so it is
    /// exactly the version this call wrote even when other writers follow.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteConfigStore::apply`].
    pub fn commit(&self, update: &ConfigUpdate) -> Result<ServiceConfig, ConfigStoreError> {
        validate_service_name(&update.service)?;
        let config_json = serde_json::to_string(&update.config)
            .map_err(|err| ConfigStoreError::Invalid(err.to_string()))?;
        let now = unix_millis();
        let (committed, changed) = {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(db_error)?;
            let existing = load_service_row(&tx, &update.service)?;
            let current_version = existing.as_ref().map_or(0, |row| row.version);
            if let Some(expected) = update.expected_version {
                if expected != current_version {
                    return Err(ConfigStoreError::VersionConflict {
                        service: update.service.clone(),
                        expected,
                        current: current_version,
                    });
                }
            }
            let previous = match existing {
                Some(row) => row.into_config()?.config,
                None => ConfigMap::new(),
            };
            let next_version = current_version.checked_add(1).ok_or_else(|| {
                ConfigStoreError::Storage(format!("version overflow for {}", update.service))
            })?;
            let epoch = match current_epoch_in(&tx)? {
                Some(epoch) => epoch,
                None => mint_epoch(),
            };
            tx.execute(
                "INSERT INTO service_configs (service, config_json, version, config_epoch, \
                 updated_at, updated_by) VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(service) DO \
                 UPDATE SET config_json = excluded.config_json, version = excluded.version, \
                 config_epoch = excluded.config_epoch, updated_at = excluded.updated_at, \
                 updated_by = excluded.updated_by",
                params![
                    update.service,
                    config_json,
                    next_version,
                    epoch,
                    now,
                    update.updated_by
                ],
            )
            .map_err(db_error)?;
            let context = ChangeContext {
                service: &update.service,
                changed_at: now,
                changed_by: update.updated_by.as_deref(),
                change_reason: update.change_reason.as_deref(),
            };
            let changed =
                record_history(&tx, self.catalog.as_ref(), &context, &previous, &update.config)?;
            rebuild_items(&tx, self.catalog.as_ref(), &update.service, &update.config)?;
            tx.commit().map_err(db_error)?;
            drop(guard);
            let committed = ServiceConfig {
                service: update.service.clone(),
                config: update.config.clone(),
                version: next_version,
                config_epoch: epoch,
                updated_at: now,
                updated_by: update.updated_by.clone(),
            };
            (committed, changed)
        };
        tracing::debug!(
            service = %committed.service,
            version = committed.version,
            changed_keys = changed,
            "config write committed"
        );
        Ok(committed)
    }

    // ------------------------------------------------------------------------
    // Epoch
    // ------------------------------------------------------------------------

    /// Returns the current epoch, or `None` when no service is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn get_config_epoch(&self) -> Result<Option<String>, ConfigStoreError> {
        let guard = self.lock()?;
        current_epoch_in(&guard)
    }

    /// Returns true when some current row carries `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn validate_epoch(&self, epoch: &str) -> Result<bool, ConfigStoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM service_configs WHERE config_epoch = ?1)",
                params![epoch],
                |row| row.get::<_, bool>(0),
            )
            .map_err(db_error)
    }

    /// Returns the epoch paired with the schema version and service count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the read fails.
    pub fn epoch_metadata(&self) -> Result<Option<ConfigEpochMetadata>, ConfigStoreError> {
        let guard = self.lock()?;
        let Some(config_epoch) = current_epoch_in(&guard)? else {
            return Ok(None);
        };
        let schema_version = load_schema_version(&guard)?;
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM service_configs", params![], |row| row.get(0))
            .map_err(db_error)?;
        drop(guard);
        let service_count = usize::try_from(count)
            .map_err(|_| ConfigStoreError::Storage("negative service count".to_string()))?;
        Ok(Some(ConfigEpochMetadata {
            config_epoch,
            schema_version,
            service_count,
        }))
    }

    /// Replaces every service with `snapshot` under a freshly minted epoch.
    ///
    /// Versions restart at 1. Each restored key gets one history row.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Invalid`] for a bad service name, or
    /// [`ConfigStoreError::Storage`] when the rebuild fails.
    pub fn rebuild_from_snapshot(
        &self,
        snapshot: &BTreeMap<String, ConfigMap>,
        rebuilt_by: Option<&str>,
    ) -> Result<String, ConfigStoreError> {
        for service in snapshot.keys() {
            validate_service_name(service)?;
        }
        let epoch = mint_epoch();
        let now = unix_millis();
        {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(db_error)?;
            tx.execute("DELETE FROM config_items", params![]).map_err(db_error)?;
            tx.execute("DELETE FROM service_configs", params![]).map_err(db_error)?;
            let empty = ConfigMap::new();
            for (service, config) in snapshot {
                let config_json = serde_json::to_string(config)
                    .map_err(|err| ConfigStoreError::Invalid(err.to_string()))?;
                tx.execute(
                    "INSERT INTO service_configs (service, config_json, version, config_epoch, \
                     updated_at, updated_by) VALUES (?1, ?2, 1, ?3, ?4, ?5)",
                    params![service, config_json, epoch, now, rebuilt_by],
                )
                .map_err(db_error)?;
                let context = ChangeContext {
                    service,
                    changed_at: now,
                    changed_by: rebuilt_by,
                    change_reason: Some(CHANGE_REASON_LKG_REBUILD),
                };
                record_history(&tx, self.catalog.as_ref(), &context, &empty, config)?;
                rebuild_items(&tx, self.catalog.as_ref(), service, config)?;
            }
            tx.commit().map_err(db_error)?;
            drop(guard);
        }
        tracing::info!(
            epoch = %epoch,
            services = snapshot.len(),
            "config store rebuilt from snapshot"
        );
        Ok(epoch)
    }

    // ------------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------------

    /// Runs a trivial query to confirm the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Storage`] when the readiness query fails.
    pub fn readiness(&self) -> Result<(), ConfigStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", params![], |row| row.get::<_, i64>(0)).map_err(db_error)?;
        Ok(())
    }
}

impl ConfigSnapshotSource for SqliteConfigStore {
    fn consistent_snapshot(&self) -> Result<Option<StoreSnapshot>, ConfigStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let Some(config_epoch) = current_epoch_in(&tx)? else {
            return Ok(None);
        };
        let mut stmt = tx
            .prepare(&format!("SELECT {SERVICE_COLUMNS} FROM service_configs ORDER BY service"))
            .map_err(db_error)?;
        let rows = stmt.query_map(params![], read_service_row).map_err(db_error)?;
        let rows = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        drop(stmt);
        tx.finish().map_err(db_error)?;
        drop(guard);
        let configs = rows.into_iter().map(ServiceRow::into_config).collect::<Result<_, _>>()?;
        Ok(Some(StoreSnapshot {
            configs,
            config_epoch,
        }))
    }
}

impl ConfigRebuildTarget for SqliteConfigStore {
    fn rebuild_from_snapshot(
        &self,
        snapshot: &BTreeMap<String, ConfigMap>,
        rebuilt_by: Option<&str>,
    ) -> Result<String, ConfigStoreError> {
        Self::rebuild_from_snapshot(self, snapshot, rebuilt_by)
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw service row before config parsing.
struct ServiceRow {
    /// Service name.
    service: String,
    /// Stored config JSON.
    config_json: String,
    /// Stored version.
    version: i64,
    /// Stored epoch.
    config_epoch: String,
    /// Last write time.
    updated_at: i64,
    /// Last writer.
    updated_by: Option<String>,
}

impl ServiceRow {
    /// Parses the stored JSON into a [`ServiceConfig`].
    fn into_config(self) -> Result<ServiceConfig, ConfigStoreError> {
        let config: ConfigMap = serde_json::from_str(&self.config_json).map_err(|err| {
            ConfigStoreError::Storage(format!("corrupt config for {}: {err}", self.service))
        })?;
        Ok(ServiceConfig {
            service: self.service,
            config,
            version: self.version,
            config_epoch: self.config_epoch,
            updated_at: self.updated_at,
            updated_by: self.updated_by,
        })
    }
}

/// Maps a result row selected with [`SERVICE_COLUMNS`].
fn read_service_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRow> {
    Ok(ServiceRow {
        service: row.get(0)?,
        config_json: row.get(1)?,
        version: row.get(2)?,
        config_epoch: row.get(3)?,
        updated_at: row.get(4)?,
        updated_by: row.get(5)?,
    })
}

/// Loads the raw row for `service`.
fn load_service_row(
    connection: &Connection,
    service: &str,
) -> Result<Option<ServiceRow>, ConfigStoreError> {
    connection
        .query_row(
            &format!("SELECT {SERVICE_COLUMNS} FROM service_configs WHERE service = ?1"),
            params![service],
            read_service_row,
        )
        .optional()
        .map_err(db_error)
}

/// Returns the epoch carried by the current rows.
fn current_epoch_in(connection: &Connection) -> Result<Option<String>, ConfigStoreError> {
    connection
        .query_row(
            "SELECT config_epoch FROM service_configs ORDER BY updated_at DESC, service LIMIT 1",
            params![],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)
}

/// Mints a new epoch identifier.
fn mint_epoch() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// SECTION: History and Projection
// ============================================================================

/// Attribution shared by every history row of one write.
struct ChangeContext<'a> {
    /// Owning service.
    service: &'a str,
    /// Commit time.
    changed_at: i64,
    /// Writer.
    changed_by: Option<&'a str>,
    /// Reason for added and changed keys.
    change_reason: Option<&'a str>,
}

/// Appends one history row per added, changed, or removed key.
fn record_history(
    tx: &Transaction<'_>,
    catalog: &dyn FieldCatalog,
    context: &ChangeContext<'_>,
    previous: &ConfigMap,
    next: &ConfigMap,
) -> Result<usize, ConfigStoreError> {
    let keys: BTreeSet<&String> = previous.keys().chain(next.keys()).collect();
    let mut changed = 0;
    for key in keys {
        let old = previous.get(key);
        let new = next.get(key);
        let reason = match (old, new) {
            (Some(old), Some(new)) if old == new => continue,
            (None, None) => continue,
            (Some(_), None) => Some(CHANGE_REASON_KEY_DELETED),
            _ => context.change_reason,
        };
        let secret = catalog.field_meta(context.service, key).is_secret;
        let old_text = old.map(|value| history_text(value, secret)).transpose()?;
        let new_text = new.map(|value| history_text(value, secret)).transpose()?;
        tx.execute(
            "INSERT INTO config_history (service, key, old_value, new_value, changed_at, \
             changed_by, change_reason) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                context.service,
                key,
                old_text,
                new_text,
                context.changed_at,
                context.changed_by,
                reason
            ],
        )
        .map_err(db_error)?;
        changed += 1;
    }
    Ok(changed)
}

/// Serializes a value for the history ledger, masking secret fields.
fn history_text(value: &Value, secret: bool) -> Result<String, ConfigStoreError> {
    let text = if secret {
        serde_json::to_string(REDACTED_VALUE)
    } else {
        serde_json::to_string(value)
    };
    text.map_err(|err| ConfigStoreError::Invalid(err.to_string()))
}

/// Rebuilds the item projection for `service`.
fn rebuild_items(
    tx: &Transaction<'_>,
    catalog: &dyn FieldCatalog,
    service: &str,
    config: &ConfigMap,
) -> Result<(), ConfigStoreError> {
    tx.execute("DELETE FROM config_items WHERE service = ?1", params![service])
        .map_err(db_error)?;
    for (key, value) in config {
        let meta = catalog.field_meta(service, key);
        let text = if meta.is_secret { None } else { Some(canonical_json_string(value)?) };
        tx.execute(
            "INSERT INTO config_items (service, key, value, value_type, complexity, description, \
             is_secret) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                service,
                key,
                text,
                value_type_label(value),
                meta.complexity,
                meta.description,
                meta.is_secret
            ],
        )
        .map_err(db_error)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an engine error into the store taxonomy.
pub(crate) fn db_error(err: rusqlite::Error) -> ConfigStoreError {
    ConfigStoreError::Storage(err.to_string())
}

/// Converts a caller limit into a bound `LIMIT` parameter.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(fleetconf_core::clamp_limit(limit)).unwrap_or(i64::MAX)
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), ConfigStoreError> {
    let Some(parent) = path.parent() else {
        return Err(ConfigStoreError::Storage("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| ConfigStoreError::Storage(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), ConfigStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(ConfigStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, ConfigStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), ConfigStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), ConfigStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS service_configs (
                    service TEXT PRIMARY KEY,
                    config_json TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    config_epoch TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    updated_by TEXT
                );
                CREATE TABLE IF NOT EXISTS config_items (
                    service TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT,
                    value_type TEXT NOT NULL,
                    complexity TEXT NOT NULL,
                    description TEXT NOT NULL,
                    is_secret INTEGER NOT NULL,
                    PRIMARY KEY (service, key),
                    FOREIGN KEY (service) REFERENCES service_configs(service) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS config_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    service TEXT NOT NULL,
                    key TEXT NOT NULL,
                    old_value TEXT,
                    new_value TEXT,
                    changed_at INTEGER NOT NULL,
                    changed_by TEXT,
                    change_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_config_history_service_key
                    ON config_history (service, key, id);
                CREATE INDEX IF NOT EXISTS idx_config_history_changed_at
                    ON config_history (changed_at);
                CREATE TABLE IF NOT EXISTS encrypted_secrets (
                    service TEXT NOT NULL,
                    key TEXT NOT NULL,
                    encrypted_value TEXT NOT NULL,
                    key_id TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (service, key)
                );
                CREATE TABLE IF NOT EXISTS config_profiles (
                    profile_name TEXT PRIMARY KEY,
                    description TEXT NOT NULL,
                    config_snapshot TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    created_by TEXT,
                    updated_at INTEGER NOT NULL,
                    updated_by TEXT
                );
                CREATE TABLE IF NOT EXISTS schema_version (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    version INTEGER NOT NULL,
                    model_hash TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS schema_fingerprints (
                    service TEXT PRIMARY KEY,
                    schema_hash TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS access_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    service TEXT,
                    key TEXT,
                    success INTEGER NOT NULL,
                    reason TEXT,
                    timestamp INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_access_log_user
                    ON access_log (user_id, id);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(ConfigStoreError::Storage(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
