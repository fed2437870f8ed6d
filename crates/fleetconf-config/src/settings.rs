// crates/fleetconf-config/src/settings.rs
// ============================================================================
// Module: fleetconf Settings
// Description: Settings loading and validation for the config manager.
// Purpose: Provide strict, fail-closed settings parsing with hard limits.
// Dependencies: fleetconf-store-sqlite, fleetconf-lkg, fleetconf-distributor, serde, toml
// ============================================================================

//! ## Overview
//! Settings are loaded from a TOML file with strict size and path limits.
//! Unknown keys and inconsistent combinations are rejected before any
//! component is opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fleetconf_distributor::DEFAULT_TOPIC_PREFIX;
use fleetconf_distributor::DistributorConfig;
use fleetconf_lkg::LkgCacheConfig;
use fleetconf_store_sqlite::SqliteStoreConfig;
use fleetconf_store_sqlite::SqliteStoreMode;
use fleetconf_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum settings file size in bytes.
const MAX_SETTINGS_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default database file.
const DEFAULT_STORE_PATH: &str = "fleetconf.db";
/// Default LKG cache file.
const DEFAULT_LKG_PATH: &str = "fleetconf-lkg.json";
/// Default busy timeout.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper bound on the busy timeout.
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;
/// Maximum topic prefix length.
const MAX_TOPIC_PREFIX_LENGTH: usize = 256;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Top-level settings document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetconfSettings {
    /// Config database settings.
    #[serde(default)]
    pub store: StoreSettings,
    /// Last-known-good cache settings.
    #[serde(default)]
    pub lkg: LkgSettings,
    /// Update distribution settings.
    #[serde(default)]
    pub distribution: DistributionSettings,
    /// Audit event settings.
    #[serde(default)]
    pub audit: AuditSettings,
}

impl FleetconfSettings {
    /// Loads settings from `path` and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when reading, parsing, or validation fails.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| SettingsError::Io(err.to_string()))?;
        if bytes.len() > MAX_SETTINGS_FILE_SIZE {
            return Err(SettingsError::Invalid("settings file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| SettingsError::Invalid("settings file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            toml::from_str(content).map_err(|err| SettingsError::Parse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] when settings are inconsistent.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.store.validate()?;
        self.lkg.validate()?;
        self.distribution.validate()?;
        self.audit.validate()?;
        if self.lkg.enabled && self.lkg.path == self.store.path {
            return Err(SettingsError::Invalid(
                "lkg.path must differ from store.path".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.store.path.clone(),
            busy_timeout_ms: self.store.busy_timeout_ms,
            journal_mode: self.store.journal_mode,
            sync_mode: self.store.sync_mode,
        }
    }

    /// Returns the LKG cache configuration, or `None` when disabled.
    #[must_use]
    pub fn lkg_config(&self) -> Option<LkgCacheConfig> {
        self.lkg.enabled.then(|| LkgCacheConfig {
            path: self.lkg.path.clone(),
            allow_auto_rebuild: self.lkg.allow_auto_rebuild,
        })
    }

    /// Returns the distributor configuration.
    #[must_use]
    pub fn distributor_config(&self) -> DistributorConfig {
        DistributorConfig {
            topic_prefix: self.distribution.topic_prefix.clone(),
            allow_unsigned: self.distribution.allow_unsigned,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Refuse writes to services whose schema drifted until reconciled.
    #[serde(default = "default_true")]
    pub block_on_schema_drift: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            block_on_schema_drift: true,
        }
    }
}

impl StoreSettings {
    /// Validates store settings.
    fn validate(&self) -> Result<(), SettingsError> {
        validate_settings_path("store.path", &self.path)?;
        if self.busy_timeout_ms == 0 || self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(SettingsError::Invalid(format!(
                "store.busy_timeout_ms must be between 1 and {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: LKG
// ============================================================================

/// `[lkg]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LkgSettings {
    /// Whether the cache is maintained.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache file path.
    #[serde(default = "default_lkg_path")]
    pub path: PathBuf,
    /// Rebuild an empty store from the cache at startup.
    #[serde(default)]
    pub allow_auto_rebuild: bool,
}

impl Default for LkgSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_lkg_path(),
            allow_auto_rebuild: false,
        }
    }
}

impl LkgSettings {
    /// Validates LKG settings.
    fn validate(&self) -> Result<(), SettingsError> {
        if !self.enabled {
            if self.allow_auto_rebuild {
                return Err(SettingsError::Invalid(
                    "lkg.allow_auto_rebuild requires lkg.enabled".to_string(),
                ));
            }
            return Ok(());
        }
        validate_settings_path("lkg.path", &self.path)
    }
}

// ============================================================================
// SECTION: Distribution
// ============================================================================

/// `[distribution]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionSettings {
    /// Topic prefix; updates go to `<prefix>/<service>`.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Publish unsigned when signing fails.
    #[serde(default)]
    pub allow_unsigned: bool,
    /// Refuse to start without a signing key.
    #[serde(default)]
    pub require_signature: bool,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            allow_unsigned: false,
            require_signature: false,
        }
    }
}

impl DistributionSettings {
    /// Validates distribution settings.
    fn validate(&self) -> Result<(), SettingsError> {
        let prefix = self.topic_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(SettingsError::Invalid(
                "distribution.topic_prefix must be non-empty".to_string(),
            ));
        }
        if prefix.len() > MAX_TOPIC_PREFIX_LENGTH {
            return Err(SettingsError::Invalid(
                "distribution.topic_prefix exceeds max length".to_string(),
            ));
        }
        if prefix.contains(['+', '#']) || prefix.chars().any(char::is_whitespace) {
            return Err(SettingsError::Invalid(
                "distribution.topic_prefix must not contain wildcards or whitespace".to_string(),
            ));
        }
        if self.require_signature && self.allow_unsigned {
            return Err(SettingsError::Invalid(
                "distribution.allow_unsigned conflicts with require_signature".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Discard audit events.
    None,
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSettings {
    /// Sink selection.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Record reads in the access log as well as writes.
    #[serde(default)]
    pub log_reads: bool,
}

impl AuditSettings {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), SettingsError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, Some(path)) => validate_settings_path("audit.path", path),
            (AuditSinkKind::File, None) => {
                Err(SettingsError::Invalid("audit.sink = \"file\" requires audit.path".to_string()))
            }
            (_, Some(_)) => Err(SettingsError::Invalid(
                "audit.path is only valid with the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Settings loading errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O failure while reading settings.
    #[error("settings io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("settings parse error: {0}")]
    Parse(String),
    /// Invalid settings data.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the settings file path against length limits.
fn validate_path(path: &Path) -> Result<(), SettingsError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SettingsError::Invalid("settings path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SettingsError::Invalid("settings path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path field.
fn validate_settings_path(field: &str, path: &Path) -> Result<(), SettingsError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(SettingsError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SettingsError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SettingsError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Default cache path.
fn default_lkg_path() -> PathBuf {
    PathBuf::from(DEFAULT_LKG_PATH)
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default topic prefix.
fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

/// Serde helper for flags that default on.
const fn default_true() -> bool {
    true
}
