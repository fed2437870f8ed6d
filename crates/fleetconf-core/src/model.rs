// crates/fleetconf-core/src/model.rs
// ============================================================================
// Module: fleetconf Data Model
// Description: Persisted records, query filters, and write requests.
// Purpose: Shared types for the store, cache, distributor, and service.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Records mirror the tables owned by the SQLite store. A configuration is an
//! opaque [`ConfigMap`]; nothing in this module interprets values beyond the
//! JSON kind label used by the item projection.
//!
//! Timestamps are unix milliseconds throughout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Change reason recorded for keys removed by a write.
pub const CHANGE_REASON_KEY_DELETED: &str = "Key deleted";
/// Change reason recorded for keys restored by an LKG rebuild.
pub const CHANGE_REASON_LKG_REBUILD: &str = "Rebuilt from LKG cache";
/// Default row limit for history and access log queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// Upper bound on any query limit.
pub const MAX_QUERY_LIMIT: usize = 10_000;
/// Maximum service name length.
pub const MAX_SERVICE_NAME_LENGTH: usize = 128;
/// Default field complexity when no catalog entry exists.
pub const DEFAULT_COMPLEXITY: &str = "basic";

/// Opaque per-service configuration map.
pub type ConfigMap = serde_json::Map<String, Value>;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Current configuration of one service.
///
/// # Invariants
/// - `version` starts at 1 and grows by exactly 1 per accepted write.
/// - Every row written since the last rebuild shares one `config_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name.
    pub service: String,
    /// Opaque key/value configuration.
    pub config: ConfigMap,
    /// Optimistic-lock version.
    pub version: i64,
    /// Generation UUID.
    pub config_epoch: String,
    /// Last write time.
    pub updated_at: i64,
    /// Last writer.
    pub updated_by: Option<String>,
}

/// Per-key projection used for search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    /// Owning service.
    pub service: String,
    /// Config key.
    pub key: String,
    /// Canonical JSON text of the value; `None` for secret fields.
    pub value: Option<String>,
    /// JSON kind label, see [`value_type_label`].
    pub value_type: String,
    /// Field complexity tier supplied by the field catalog.
    pub complexity: String,
    /// Field description supplied by the field catalog.
    pub description: String,
    /// Whether the field is secret.
    pub is_secret: bool,
}

/// One changed key within one accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigHistory {
    /// Row identifier, increasing with insertion order.
    pub id: i64,
    /// Owning service.
    pub service: String,
    /// Changed key.
    pub key: String,
    /// Previous value; `None` when the key was created.
    pub old_value: Option<Value>,
    /// New value; `None` when the key was removed.
    pub new_value: Option<Value>,
    /// Commit time.
    pub changed_at: i64,
    /// Writer.
    pub changed_by: Option<String>,
    /// Optional reason.
    pub change_reason: Option<String>,
}

/// Encrypted secret row. Never carries plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Owning service.
    pub service: String,
    /// Secret key.
    pub key: String,
    /// Base64 of nonce followed by AES-256-GCM ciphertext.
    pub encrypted_value: String,
    /// Identifier of the master key used.
    pub key_id: String,
    /// Last write time.
    pub updated_at: i64,
}

/// Named snapshot of every service configuration.
///
/// # Invariants
/// - `created_at` and `created_by` never change after the first save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProfile {
    /// Unique profile name.
    pub profile_name: String,
    /// Free-form description.
    pub description: String,
    /// Service to config map; `None` in listings.
    pub config_snapshot: Option<BTreeMap<String, ConfigMap>>,
    /// First save time.
    pub created_at: i64,
    /// First saver.
    pub created_by: Option<String>,
    /// Latest save time.
    pub updated_at: i64,
    /// Latest saver.
    pub updated_by: Option<String>,
}

impl ConfigProfile {
    /// Builds a profile ready to save. Timestamps are assigned by the store.
    #[must_use]
    pub fn new(
        profile_name: impl Into<String>,
        description: impl Into<String>,
        snapshot: BTreeMap<String, ConfigMap>,
        saved_by: Option<&str>,
    ) -> Self {
        let saved_by = saved_by.map(str::to_string);
        Self {
            profile_name: profile_name.into(),
            description: description.into(),
            config_snapshot: Some(snapshot),
            created_at: 0,
            created_by: saved_by.clone(),
            updated_at: 0,
            updated_by: saved_by,
        }
    }
}

/// Singleton schema version row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Monotonic schema version.
    pub version: i64,
    /// Digest of the expected field schemas.
    pub model_hash: String,
    /// Last change time.
    pub updated_at: i64,
}

/// Per-service schema fingerprint recorded at reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFingerprint {
    /// Service name.
    pub service: String,
    /// Digest of the service's field schema.
    pub schema_hash: String,
    /// Recording time.
    pub recorded_at: i64,
}

/// Derived epoch view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEpochMetadata {
    /// Current epoch.
    pub config_epoch: String,
    /// Current schema version, if recorded.
    pub schema_version: Option<SchemaVersion>,
    /// Number of configured services.
    pub service_count: usize,
}

/// Every current config with the epoch they share, read in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Current configs, sorted by service.
    pub configs: Vec<ServiceConfig>,
    /// Epoch carried by the configs.
    pub config_epoch: String,
}

/// Audit record for an API access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// Row identifier; `None` before insertion.
    pub id: Option<i64>,
    /// Authenticated user.
    pub user_id: String,
    /// Action label such as `update_config`.
    pub action: String,
    /// Target service.
    pub service: Option<String>,
    /// Target key.
    pub key: Option<String>,
    /// Whether the action succeeded.
    pub success: bool,
    /// Failure reason or note.
    pub reason: Option<String>,
    /// Access time; 0 lets the store assign the current time.
    pub timestamp: i64,
}

impl AccessLogEntry {
    /// Builds a successful entry for `user_id` performing `action`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            action: action.into(),
            service: None,
            key: None,
            success: true,
            reason: None,
            timestamp: 0,
        }
    }

    /// Sets the target service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the target key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Marks the entry failed with a reason.
    #[must_use]
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.success = false;
        self.reason = Some(reason.into());
        self
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Full form of a configuration write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Target service.
    pub service: String,
    /// Replacement configuration.
    pub config: ConfigMap,
    /// Version the caller last observed; `None` skips the check.
    pub expected_version: Option<i64>,
    /// Writer.
    pub updated_by: Option<String>,
    /// Reason stored on history rows for added or changed keys.
    pub change_reason: Option<String>,
}

impl ConfigUpdate {
    /// Builds an unconditional write.
    #[must_use]
    pub fn new(service: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            service: service.into(),
            config,
            expected_version: None,
            updated_by: None,
            change_reason: None,
        }
    }

    /// Requires the stored version to equal `version`.
    #[must_use]
    pub const fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Sets the writer.
    #[must_use]
    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.updated_by = Some(user.into());
        self
    }

    /// Sets the change reason.
    #[must_use]
    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }
}

/// History filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Restrict to one service.
    pub service: Option<String>,
    /// Restrict to one key.
    pub key: Option<String>,
    /// Inclusive lower bound on `changed_at`.
    pub since: Option<i64>,
    /// Inclusive upper bound on `changed_at`.
    pub until: Option<i64>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            service: None,
            key: None,
            since: None,
            until: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Item search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSearch {
    /// Free text matched against key, description and value.
    pub query: Option<String>,
    /// Restrict to one service.
    pub service: Option<String>,
    /// Restrict to one JSON kind label.
    pub value_type: Option<String>,
    /// Restrict to one complexity tier.
    pub complexity: Option<String>,
    /// Restrict by secrecy.
    pub is_secret: Option<bool>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl Default for ItemSearch {
    fn default() -> Self {
        Self {
            query: None,
            service: None,
            value_type: None,
            complexity: None,
            is_secret: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Access log filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogQuery {
    /// Restrict to one user.
    pub user_id: Option<String>,
    /// Restrict to one service.
    pub service: Option<String>,
    /// Restrict to one action.
    pub action: Option<String>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl Default for AccessLogQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            service: None,
            action: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Field metadata supplied by a field catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Complexity tier.
    pub complexity: String,
    /// Human description.
    pub description: String,
    /// Whether the field holds a secret.
    pub is_secret: bool,
}

impl Default for FieldMeta {
    fn default() -> Self {
        Self {
            complexity: DEFAULT_COMPLEXITY.to_string(),
            description: String::new(),
            is_secret: false,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the JSON kind label stored on item rows.
#[must_use]
pub fn value_type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) => {
            if number.is_f64() {
                "number"
            } else {
                "integer"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validates a service name: non-empty, bounded, `[A-Za-z0-9_.-]`.
///
/// # Errors
///
/// Returns [`ConfigStoreError::Invalid`] when the name is rejected.
pub fn validate_service_name(service: &str) -> Result<(), ConfigStoreError> {
    if service.is_empty() {
        return Err(ConfigStoreError::Invalid("service name must be non-empty".to_string()));
    }
    if service.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(ConfigStoreError::Invalid("service name exceeds max length".to_string()));
    }
    if !service.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')) {
        return Err(ConfigStoreError::Invalid(format!(
            "service name contains invalid characters: {service}"
        )));
    }
    Ok(())
}

/// Clamps a caller-supplied limit into `1..=MAX_QUERY_LIMIT`.
#[must_use]
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}
