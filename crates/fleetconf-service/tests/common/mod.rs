// crates/fleetconf-service/tests/common/mod.rs
// ============================================================================
// Module: Common Service Fixtures
// Description: Scratch settings, capture publishers, and memory audit sinks.
// Purpose: Start isolated config manager instances in tests.
// Dependencies: fleetconf-service, tempfile
// ============================================================================

//! ## Overview
//! Each [`Harness`] owns a temporary directory holding the store and cache,
//! a publisher that records every bus message, and an in-memory audit sink.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use ed25519_dalek::SigningKey;
use fleetconf_config::AuditSinkKind;
use fleetconf_config::FleetconfSettings;
use fleetconf_core::ConfigMap;
use fleetconf_core::DefaultFieldCatalog;
use fleetconf_core::FieldCatalog;
use fleetconf_core::FieldMeta;
use fleetconf_core::MasterKey;
use fleetconf_core::StaticFieldCatalog;
use fleetconf_distributor::BusMessage;
use fleetconf_distributor::CallbackPublisher;
use fleetconf_distributor::ConfigPublisher;
use fleetconf_distributor::PublishError;
use fleetconf_service::AuditSink;
use fleetconf_service::ConfigAuditEvent;
use fleetconf_service::ConfigManagerService;
use fleetconf_service::KeyMaterial;
use fleetconf_service::ServiceError;
use serde_json::Value;
use tempfile::TempDir;

/// HMAC key used for every test cache.
pub const LKG_KEY: &[u8] = b"lkg-test-hmac-key-0123456789abcdef";

// ============================================================================
// SECTION: Capture Helpers
// ============================================================================

/// Publisher that records messages and can be switched to fail.
#[derive(Clone, Default)]
pub struct CapturePublisher {
    /// Messages published so far.
    messages: Arc<Mutex<Vec<BusMessage>>>,
    /// When set, publishes fail.
    failing: Arc<Mutex<bool>>,
}

impl CapturePublisher {
    /// Returns every message published so far.
    pub fn messages(&self) -> Vec<BusMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Makes later publishes fail with a delivery error.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Wraps the capture in a shareable publisher.
    pub fn publisher(&self) -> Arc<dyn ConfigPublisher> {
        let messages = Arc::clone(&self.messages);
        let failing = Arc::clone(&self.failing);
        Arc::new(CallbackPublisher::new(move |message: &BusMessage| {
            if *failing.lock().unwrap() {
                return Err(PublishError::DeliveryFailed("broker offline".to_string()));
            }
            messages.lock().unwrap().push(message.clone());
            Ok(())
        }))
    }
}

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events.
    events: Mutex<Vec<ConfigAuditEvent>>,
}

impl MemoryAuditSink {
    /// Returns the recorded events.
    pub fn events(&self) -> Vec<ConfigAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the event names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Scratch environment for one or more service instances.
pub struct Harness {
    /// Directory holding the store and cache.
    pub temp: TempDir,
    /// Settings used for every start.
    pub settings: FleetconfSettings,
    /// Publisher shared by every start.
    pub publisher: CapturePublisher,
    /// Audit sink shared by every start.
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    /// Creates settings pointing into a fresh temporary directory.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut settings = FleetconfSettings::from_toml_str("").unwrap();
        settings.store.path = temp.path().join("config.db");
        settings.lkg.path = temp.path().join("lkg.json");
        settings.audit.sink = AuditSinkKind::None;
        Self {
            temp,
            settings,
            publisher: CapturePublisher::default(),
            audit: Arc::new(MemoryAuditSink::default()),
        }
    }

    /// Returns the cache path.
    pub fn lkg_path(&self) -> PathBuf {
        self.settings.lkg.path.clone()
    }

    /// Starts a service with signing and secret keys and the default catalog.
    pub fn start(&self) -> ConfigManagerService {
        self.try_start(full_keys(), Arc::new(DefaultFieldCatalog)).unwrap()
    }

    /// Starts a service with a custom catalog.
    pub fn start_with_catalog(&self, catalog: Arc<dyn FieldCatalog>) -> ConfigManagerService {
        self.try_start(full_keys(), catalog).unwrap()
    }

    /// Starts a service, returning the startup error on failure.
    pub fn try_start(
        &self,
        keys: KeyMaterial,
        catalog: Arc<dyn FieldCatalog>,
    ) -> Result<ConfigManagerService, ServiceError> {
        let audit: Arc<dyn AuditSink> = self.audit.clone();
        ConfigManagerService::start_with_audit(
            self.settings.clone(),
            keys,
            self.publisher.publisher(),
            catalog,
            audit,
        )
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Deterministic distribution signing key.
pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7; 32])
}

/// Key material with every key present.
pub fn full_keys() -> KeyMaterial {
    KeyMaterial::new(LKG_KEY)
        .with_signing_key(signing_key())
        .with_master_key(MasterKey::new("k1", [9; 32]).unwrap())
}

/// Catalog describing the `stt-worker` fields.
pub fn stt_catalog(description: &str) -> StaticFieldCatalog {
    StaticFieldCatalog::new()
        .with_field(
            "stt-worker",
            "whisper_model",
            FieldMeta {
                complexity: "basic".to_string(),
                description: description.to_string(),
                is_secret: false,
            },
        )
        .with_field(
            "stt-worker",
            "api_key",
            FieldMeta {
                complexity: "advanced".to_string(),
                description: "Provider key".to_string(),
                is_secret: true,
            },
        )
}

/// Converts a `json!` object literal into a config map.
pub fn cfg(value: Value) -> ConfigMap {
    value.as_object().cloned().expect("config literal must be an object")
}
