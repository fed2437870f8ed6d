// crates/fleetconf-service/src/service.rs
// ============================================================================
// Module: Config Manager Service
// Description: Lifecycle and write path for the fleet config store.
// Purpose: Tie the store, LKG cache, and distributor into one write path.
// Dependencies: fleetconf-store-sqlite, fleetconf-lkg, fleetconf-distributor, tracing
// ============================================================================

//! ## Overview
//! [`ConfigManagerService`] owns one store connection, the LKG cache manager,
//! and the distributor. It is constructed once by the embedding process and
//! passed explicitly to API layers.
//!
//! Startup order:
//! 1. Open the store.
//! 2. Rebuild an empty store from the LKG cache when permitted.
//! 3. Compare field schemas against the recorded fingerprints.
//! 4. Refresh the LKG cache.
//!
//! Writes commit first. The cache refresh and the distribution that follow
//! are reported in [`UpdateOutcome`] and never undo the commit.
//!
//! Security posture: audit events and logs carry identifiers and versions,
//! never config values or secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use fleetconf_config::FleetconfSettings;
use fleetconf_core::AccessLogEntry;
use fleetconf_core::AccessLogQuery;
use fleetconf_core::ConfigEpochMetadata;
use fleetconf_core::ConfigHistory;
use fleetconf_core::ConfigItem;
use fleetconf_core::ConfigMap;
use fleetconf_core::ConfigProfile;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::ConfigUpdate;
use fleetconf_core::CryptoError;
use fleetconf_core::ErrorKind;
use fleetconf_core::FieldCatalog;
use fleetconf_core::HistoryQuery;
use fleetconf_core::ItemSearch;
use fleetconf_core::MasterKey;
use fleetconf_core::ServiceConfig;
use fleetconf_distributor::ConfigDistributor;
use fleetconf_distributor::ConfigPublisher;
use fleetconf_distributor::DistributionError;
use fleetconf_distributor::DistributionOutcome;
use fleetconf_lkg::LkgCacheManager;
use fleetconf_lkg::LkgError;
use fleetconf_store_sqlite::SqliteConfigStore;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::audit::AuditSink;
use crate::audit::ConfigAuditEvent;
use crate::audit::audit_sink_from_settings;
use crate::error::ServiceError;
use crate::health::HealthReport;
use crate::health::HealthState;
use crate::health::HealthTracker;
use crate::keys::KeyMaterial;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Actor recorded for operations the service performs on its own.
pub const SYSTEM_USER: &str = "system";
/// Access-log action for config writes.
const ACTION_UPDATE: &str = "update_config";
/// Access-log action for config reads.
const ACTION_READ: &str = "read_config";
/// Access-log action for writes made while activating a profile.
const ACTION_ACTIVATE_PROFILE: &str = "activate_profile";
/// Access-log action for secret writes.
const ACTION_STORE_SECRET: &str = "store_secret";
/// Access-log action for secret reads.
const ACTION_READ_SECRET: &str = "read_secret";

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Config write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfigRequest {
    /// Target service.
    pub service: String,
    /// Full replacement config.
    pub config: ConfigMap,
    /// Last version the caller observed; `None` writes unconditionally.
    pub expected_version: Option<i64>,
    /// Acting user.
    pub user_id: Option<String>,
    /// Reason recorded in history.
    pub change_reason: Option<String>,
}

impl UpdateConfigRequest {
    /// Creates an unconditional write request.
    #[must_use]
    pub fn new(service: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            service: service.into(),
            config,
            expected_version: None,
            user_id: None,
            change_reason: None,
        }
    }

    /// Requires the stored version to equal `version`.
    #[must_use]
    pub const fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the change reason.
    #[must_use]
    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }
}

/// Result of the post-commit LKG refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LkgRefresh {
    /// The cache now mirrors the store.
    Refreshed,
    /// The cache is disabled in settings.
    Disabled,
    /// The refresh failed; the previous cache file is untouched.
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// Outcome of an accepted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Service written.
    pub service: String,
    /// New version.
    pub version: i64,
    /// Epoch the version belongs to.
    pub config_epoch: String,
    /// LKG refresh result.
    pub lkg: LkgRefresh,
    /// Distribution result.
    pub distribution: Result<DistributionOutcome, DistributionError>,
}

impl UpdateOutcome {
    /// Returns true when the cache refreshed and a signed message went out.
    #[must_use]
    pub const fn is_fully_propagated(&self) -> bool {
        !matches!(self.lkg, LkgRefresh::Failed { .. })
            && matches!(self.distribution, Ok(DistributionOutcome::Published { .. }))
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Config manager service.
pub struct ConfigManagerService {
    /// Validated settings.
    settings: FleetconfSettings,
    /// Authoritative store.
    store: SqliteConfigStore,
    /// LKG cache manager when enabled.
    lkg: Option<LkgCacheManager>,
    /// Update distributor.
    distributor: ConfigDistributor,
    /// Secrets master key.
    master_key: Option<MasterKey>,
    /// Audit event sink.
    audit: Arc<dyn AuditSink>,
    /// Services whose writes are refused until the schema is reconciled.
    blocked: Mutex<BTreeSet<String>>,
    /// Health state.
    health: Mutex<HealthTracker>,
    /// Held while the cache is rewritten so refreshes land in store order.
    lkg_refresh: Mutex<()>,
    /// Set once the service is shut down.
    closed: AtomicBool,
}

impl ConfigManagerService {
    /// Starts the service with the audit sink selected in settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when settings are invalid, the audit sink or
    /// store cannot be opened, or a required key is missing.
    pub fn start(
        settings: FleetconfSettings,
        keys: KeyMaterial,
        publisher: Arc<dyn ConfigPublisher>,
        catalog: Arc<dyn FieldCatalog>,
    ) -> Result<Self, ServiceError> {
        let audit = audit_sink_from_settings(&settings.audit)?;
        Self::start_with_audit(settings, keys, publisher, catalog, audit)
    }

    /// Starts the service with an explicit audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when settings are invalid, the store cannot
    /// be opened, or a required key is missing.
    pub fn start_with_audit(
        settings: FleetconfSettings,
        keys: KeyMaterial,
        publisher: Arc<dyn ConfigPublisher>,
        catalog: Arc<dyn FieldCatalog>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServiceError> {
        settings.validate()?;
        if settings.distribution.require_signature && keys.signing_key.is_none() {
            return Err(ServiceError::Startup(
                "distribution.require_signature is set but no signing key was provided".to_string(),
            ));
        }
        let KeyMaterial {
            master_key,
            signing_key,
            lkg_hmac_key,
        } = keys;
        let store = SqliteConfigStore::open_with_catalog(settings.store_config(), catalog)?;
        let lkg = settings
            .lkg_config()
            .map(move |config| LkgCacheManager::new(&config, lkg_hmac_key))
            .transpose()?;
        let distributor =
            ConfigDistributor::new(publisher, signing_key, settings.distributor_config());
        let service = Self {
            settings,
            store,
            lkg,
            distributor,
            master_key,
            audit,
            blocked: Mutex::new(BTreeSet::new()),
            health: Mutex::new(HealthTracker::starting()),
            lkg_refresh: Mutex::new(()),
            closed: AtomicBool::new(false),
        };
        service.restore_from_lkg()?;
        service.check_schema()?;
        if service.store.get_config_epoch()?.is_some()
            && let LkgRefresh::Failed {
                reason,
            } = service.refresh_lkg()
        {
            service.with_health(|health| {
                health.degrade(ErrorKind::StorageFailure, reason);
            });
        }
        service.with_health(HealthTracker::finish_startup);
        tracing::info!(
            path = %service.store.path().display(),
            lkg = service.lkg.is_some(),
            signing = service.distributor.is_signing(),
            "config manager started"
        );
        Ok(service)
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &SqliteConfigStore {
        &self.store
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> &FleetconfSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Writes a config, then refreshes the LKG cache and distributes it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the write is rejected. Cache and
    /// distribution failures are reported in the outcome instead.
    pub fn update_config(
        &self,
        request: &UpdateConfigRequest,
    ) -> Result<UpdateOutcome, ServiceError> {
        self.write_config(request, ACTION_UPDATE)
    }

    /// Applies every service in a saved profile.
    ///
    /// Each write expects the version observed when activation started, so a
    /// concurrent change aborts the remaining services with a version
    /// conflict. Services written before the conflict keep their new version.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the profile is missing or a write fails.
    pub fn activate_profile(
        &self,
        name: &str,
        user_id: Option<&str>,
    ) -> Result<BTreeMap<String, i64>, ServiceError> {
        self.ensure_open()?;
        let epoch = self.store.get_config_epoch()?.unwrap_or_default();
        let configs = match self.store.load_profile(name, &epoch, user_id) {
            Ok(configs) => configs,
            Err(err) => {
                let err = ServiceError::from(err);
                self.audit.record(
                    &ConfigAuditEvent::failure("profile_activation", user_id, err.kind())
                        .with_detail(name),
                );
                return Err(err);
            }
        };
        let mut observed = BTreeMap::new();
        for service in configs.keys() {
            let version = self.store.get(service)?.map_or(0, |config| config.version);
            observed.insert(service.clone(), version);
        }
        let mut applied = BTreeMap::new();
        for (service, config) in configs {
            let request = UpdateConfigRequest {
                expected_version: observed.get(&service).copied(),
                user_id: user_id.map(str::to_string),
                change_reason: Some(format!("Activated profile {name}")),
                ..UpdateConfigRequest::new(service.clone(), config.config)
            };
            let outcome = self.write_config(&request, ACTION_ACTIVATE_PROFILE)?;
            applied.insert(service, outcome.version);
        }
        self.audit.record(
            &ConfigAuditEvent::success("profile_activation", user_id)
                .with_detail(name)
                .with_epoch(epoch),
        );
        tracing::info!(profile = name, services = applied.len(), "profile activated");
        Ok(applied)
    }

    /// Records `schemas` as the current field schemas and unblocks services.
    /// Returns the new schema version.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when hashing or the store write fails.
    pub fn reconcile_schema(
        &self,
        schemas: &BTreeMap<String, Value>,
        user_id: Option<&str>,
    ) -> Result<i64, ServiceError> {
        self.ensure_open()?;
        let model_hash = SqliteConfigStore::compute_model_hash(schemas)?;
        let version = self.store.increment_schema_version(&model_hash)?;
        self.store.record_schema_fingerprints(schemas)?;
        let unblocked = {
            let mut blocked = self.lock_blocked()?;
            let count = blocked.len();
            blocked.clear();
            count
        };
        self.audit.record(
            &ConfigAuditEvent::success("schema_reconcile", user_id)
                .with_detail(format!("schema version {version}")),
        );
        tracing::info!(version, unblocked, "schema reconciled");
        Ok(version)
    }

    /// Captures every current config as a named profile.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read or save fails.
    pub fn save_profile(
        &self,
        name: &str,
        description: &str,
        user_id: Option<&str>,
    ) -> Result<ConfigProfile, ServiceError> {
        self.ensure_open()?;
        let profile = self.store.capture_profile(name, description, user_id)?;
        self.audit.record(&ConfigAuditEvent::success("profile_saved", user_id).with_detail(name));
        Ok(profile)
    }

    /// Deletes a saved profile. Returns false when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the delete fails.
    pub fn delete_profile(&self, name: &str, user_id: Option<&str>) -> Result<bool, ServiceError> {
        self.ensure_open()?;
        let deleted = self.store.delete_profile(name)?;
        if deleted {
            self.audit
                .record(&ConfigAuditEvent::success("profile_deleted", user_id).with_detail(name));
        }
        Ok(deleted)
    }

    /// Encrypts and stores a secret with the configured master key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Crypto`] without a master key, or the store error.
    pub fn store_secret(
        &self,
        service: &str,
        key: &str,
        plaintext: &str,
        user_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let master = self.master_key()?;
        self.store.store_secret(service, key, plaintext, master)?;
        self.log_access(
            AccessLogEntry::new(user_id.unwrap_or(SYSTEM_USER), ACTION_STORE_SECRET)
                .with_service(service)
                .with_key(key),
        );
        self.audit
            .record(&ConfigAuditEvent::success("secret_stored", user_id).with_service(service));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns a service config, recording the read when configured to.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn get_config(
        &self,
        service: &str,
        user_id: Option<&str>,
    ) -> Result<Option<ServiceConfig>, ServiceError> {
        self.ensure_open()?;
        let config = self.store.get(service)?;
        if self.settings.audit.log_reads {
            let entry = AccessLogEntry::new(user_id.unwrap_or(SYSTEM_USER), ACTION_READ)
                .with_service(service);
            self.log_access(if config.is_some() { entry } else { entry.failed("not found") });
        }
        Ok(config)
    }

    /// Decrypts a secret with the configured master key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Crypto`] without a master key, or the store error.
    pub fn retrieve_secret(
        &self,
        service: &str,
        key: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Zeroizing<String>>, ServiceError> {
        self.ensure_open()?;
        let master = self.master_key()?;
        let entry = AccessLogEntry::new(user_id.unwrap_or(SYSTEM_USER), ACTION_READ_SECRET)
            .with_service(service)
            .with_key(key);
        match self.store.retrieve_secret(service, key, master) {
            Ok(value) => {
                self.log_access(entry);
                Ok(value)
            }
            Err(err) => {
                self.log_access(entry.failed(err.kind().as_str()));
                Err(err.into())
            }
        }
    }

    /// Lists configured services.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn list_services(&self) -> Result<Vec<String>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.list_services()?)
    }

    /// Returns history rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn get_history(&self, query: &HistoryQuery) -> Result<Vec<ConfigHistory>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.get_history(query)?)
    }

    /// Searches the per-key projection.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn search_items(&self, search: &ItemSearch) -> Result<Vec<ConfigItem>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.search_items(search)?)
    }

    /// Returns access-log rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn access_log(&self, query: &AccessLogQuery) -> Result<Vec<AccessLogEntry>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.access_log(query)?)
    }

    /// Lists saved profiles without snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn list_profiles(&self) -> Result<Vec<ConfigProfile>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.list_profiles()?)
    }

    /// Returns the current epoch with schema version and service count.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails.
    pub fn epoch_metadata(&self) -> Result<Option<ConfigEpochMetadata>, ServiceError> {
        self.ensure_open()?;
        Ok(self.store.epoch_metadata()?)
    }

    // ------------------------------------------------------------------------
    // Health and lifecycle
    // ------------------------------------------------------------------------

    /// Returns a health snapshot.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let tracker = self
            .health
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone());
        let blocked_services = self
            .blocked
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone())
            .into_iter()
            .collect();
        let mut state = tracker.state;
        let mut last_error = tracker.last_error;
        let metadata = match self.store.epoch_metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                state = HealthState::Unhealthy;
                last_error = Some((err.kind(), err.to_string()));
                None
            }
        };
        let schema_version = match &metadata {
            Some(metadata) => metadata.schema_version.as_ref().map(|schema| schema.version),
            None => self.store.schema_version().ok().flatten().map(|schema| schema.version),
        };
        if self.closed.load(Ordering::Acquire) {
            state = HealthState::Unhealthy;
        }
        HealthReport {
            state,
            config_epoch: metadata.as_ref().map(|metadata| metadata.config_epoch.clone()),
            schema_version,
            service_count: metadata.as_ref().map_or(0, |metadata| metadata.service_count),
            blocked_services,
            lkg_enabled: self.lkg.is_some(),
            signing_enabled: self.distributor.is_signing(),
            last_error: last_error.as_ref().map(|(kind, _)| *kind),
            last_error_message: last_error.map(|(_, message)| message),
        }
    }

    /// Returns `Ok` when the service can accept traffic.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when shut down, still starting, unhealthy, or
    /// when the store does not answer.
    pub fn readiness(&self) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let state = self.lock_health()?.state;
        match state {
            HealthState::Ready | HealthState::Degraded => {}
            HealthState::Starting => {
                return Err(ServiceError::Startup("startup has not completed".to_string()));
            }
            HealthState::Unhealthy => {
                return Err(ServiceError::Store(ConfigStoreError::Storage(
                    "service is unhealthy".to_string(),
                )));
            }
        }
        Ok(self.store.readiness()?)
    }

    /// Marks the service closed; later calls fail with [`ServiceError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("config manager closed");
        }
    }

    /// Shuts the service down and releases the store connection.
    pub fn shutdown(self) {
        self.close();
        drop(self);
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Shared write path for updates and profile activation.
    fn write_config(
        &self,
        request: &UpdateConfigRequest,
        action: &'static str,
    ) -> Result<UpdateOutcome, ServiceError> {
        self.ensure_open()?;
        let user_id = request.user_id.as_deref();
        let actor = user_id.unwrap_or(SYSTEM_USER);
        if self.lock_blocked()?.contains(&request.service) {
            let err = ServiceError::Store(ConfigStoreError::SchemaMismatch(format!(
                "schema drift detected for {}; reconcile before writing",
                request.service
            )));
            self.record_write_failure(actor, user_id, action, &request.service, &err);
            return Err(err);
        }
        let update = ConfigUpdate {
            service: request.service.clone(),
            config: request.config.clone(),
            expected_version: request.expected_version,
            updated_by: request.user_id.clone(),
            change_reason: request.change_reason.clone(),
        };
        let stored = match self.store.commit(&update) {
            Ok(stored) => stored,
            Err(err) => {
                let err = ServiceError::from(err);
                self.record_write_failure(actor, user_id, action, &request.service, &err);
                self.with_health(|health| {
                    health.fail(err.kind(), err.is_recoverable(), err.to_string());
                });
                return Err(err);
            }
        };
        self.log_access(AccessLogEntry::new(actor, action).with_service(&request.service));

        let lkg = self.refresh_lkg();
        let distribution = self.distributor.publish_update(&stored);
        if let Err(err) = &distribution {
            tracing::warn!(
                service = %stored.service,
                version = stored.version,
                error = %err,
                "config update distribution failed"
            );
        }
        let degraded = match (&lkg, &distribution) {
            (LkgRefresh::Failed { reason }, _) => {
                Some((ErrorKind::StorageFailure, format!("lkg refresh failed: {reason}")))
            }
            (_, Err(err)) => {
                Some((distribution_error_kind(err), format!("distribution failed: {err}")))
            }
            (_, Ok(DistributionOutcome::Skipped { reason })) => {
                Some((ErrorKind::CryptoFailure, format!("distribution skipped: {reason}")))
            }
            _ => None,
        };
        self.with_health(|health| match degraded {
            Some((kind, message)) => health.degrade(kind, message),
            None => health.recover(),
        });

        self.audit.record(
            &ConfigAuditEvent::success(action, user_id)
                .with_service(&stored.service)
                .with_version(stored.version, &stored.config_epoch),
        );
        tracing::info!(
            service = %stored.service,
            version = stored.version,
            epoch = %stored.config_epoch,
            "config updated"
        );
        Ok(UpdateOutcome {
            service: stored.service,
            version: stored.version,
            config_epoch: stored.config_epoch,
            lkg,
            distribution,
        })
    }

    /// Refreshes the LKG cache from the store.
    ///
    /// Refreshes are serialized, so a snapshot read earlier never replaces
    /// one read later.
    fn refresh_lkg(&self) -> LkgRefresh {
        let Some(lkg) = &self.lkg else {
            return LkgRefresh::Disabled;
        };
        let _refresh = self.lkg_refresh.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match lkg.atomic_update_from_db(&self.store) {
            Ok(_) => LkgRefresh::Refreshed,
            Err(err) => {
                tracing::warn!(error = %err, "lkg cache refresh failed");
                LkgRefresh::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Rebuilds an empty store from the cache when settings allow it.
    fn restore_from_lkg(&self) -> Result<(), ServiceError> {
        let Some(lkg) = &self.lkg else {
            return Ok(());
        };
        if !lkg.allows_auto_rebuild() || !self.store.list_services()?.is_empty() {
            return Ok(());
        }
        match lkg.rebuild_store(&self.store, Some(SYSTEM_USER)) {
            Ok(epoch) => {
                self.audit.record(
                    &ConfigAuditEvent::success("lkg_rebuild", Some(SYSTEM_USER)).with_epoch(epoch),
                );
            }
            Err(LkgError::Missing) => {
                tracing::info!("store is empty and no lkg cache exists; starting fresh");
            }
            Err(err) => {
                let err = ServiceError::from(err);
                tracing::warn!(error = %err, "lkg rebuild failed; starting with empty store");
                self.audit.record(&ConfigAuditEvent::failure(
                    "lkg_rebuild",
                    Some(SYSTEM_USER),
                    err.kind(),
                ));
                self.with_health(|health| health.degrade(err.kind(), err.to_string()));
            }
        }
        Ok(())
    }

    /// Compares the catalog schemas with the recorded fingerprints.
    ///
    /// The first run records the schemas. Later runs block drifted services
    /// when `store.block_on_schema_drift` is set.
    fn check_schema(&self) -> Result<(), ServiceError> {
        let schemas = self.store.catalog().service_schemas();
        if schemas.is_empty() {
            return Ok(());
        }
        let model_hash = SqliteConfigStore::compute_model_hash(&schemas)?;
        if self.store.schema_version()?.is_none() {
            let version = self.store.increment_schema_version(&model_hash)?;
            self.store.record_schema_fingerprints(&schemas)?;
            tracing::info!(version, services = schemas.len(), "schema version initialized");
            return Ok(());
        }
        if self.store.validate_schema_version(&model_hash)? {
            return Ok(());
        }
        let drifted = self.store.drifted_services(&schemas)?;
        tracing::warn!(
            drifted = %drifted.join(","),
            blocking = self.settings.store.block_on_schema_drift,
            "field schemas changed since the last reconcile"
        );
        if self.settings.store.block_on_schema_drift {
            self.lock_blocked()?.extend(drifted);
        }
        Ok(())
    }

    /// Records a rejected write in the access log and audit trail.
    fn record_write_failure(
        &self,
        actor: &str,
        user_id: Option<&str>,
        action: &'static str,
        service: &str,
        err: &ServiceError,
    ) {
        self.log_access(
            AccessLogEntry::new(actor, action).with_service(service).failed(err.kind().as_str()),
        );
        self.audit
            .record(&ConfigAuditEvent::failure(action, user_id, err.kind()).with_service(service));
        tracing::warn!(service, action, error = %err, "config write rejected");
    }

    /// Writes an access-log row; failures are logged, not returned.
    fn log_access(&self, entry: AccessLogEntry) {
        if let Err(err) = self.store.log_access(&entry) {
            tracing::warn!(action = %entry.action, error = %err, "access log write failed");
        }
    }

    /// Returns the master key or a crypto error.
    fn master_key(&self) -> Result<&MasterKey, ServiceError> {
        self.master_key.as_ref().ok_or_else(|| {
            ServiceError::Crypto(CryptoError::InvalidKey("no master key configured".to_string()))
        })
    }

    /// Fails when the service is closed.
    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Closed);
        }
        Ok(())
    }

    /// Locks the blocked-service set.
    fn lock_blocked(&self) -> Result<MutexGuard<'_, BTreeSet<String>>, ServiceError> {
        self.blocked
            .lock()
            .map_err(|_| ServiceError::Store(ConfigStoreError::Storage("mutex poisoned".to_string())))
    }

    /// Locks the health tracker.
    fn lock_health(&self) -> Result<MutexGuard<'_, HealthTracker>, ServiceError> {
        self.health
            .lock()
            .map_err(|_| ServiceError::Store(ConfigStoreError::Storage("mutex poisoned".to_string())))
    }

    /// Applies `update` to the health tracker, tolerating poisoning.
    fn with_health(&self, update: impl FnOnce(&mut HealthTracker)) {
        let mut guard = self.health.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut guard);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a distribution failure onto the health error taxonomy.
const fn distribution_error_kind(err: &DistributionError) -> ErrorKind {
    match err {
        DistributionError::Encode(_) => ErrorKind::Invalid,
        DistributionError::Publish(_) => ErrorKind::DeliveryFailure,
    }
}
