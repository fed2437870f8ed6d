// crates/fleetconf-service/tests/lifecycle.rs
// ============================================================================
// Module: Service Lifecycle Tests
// Description: Startup, LKG recovery, schema drift, health, and shutdown.
// Purpose: Validate startup ordering and fail-closed lifecycle behavior.
// Dependencies: fleetconf-service, tempfile
// ============================================================================

//! ## Overview
//! - Startup rejects signature requirements without a signing key.
//! - An empty store is rebuilt from the cache only with operator opt-in.
//! - Schema drift blocks writes for drifted services until reconciled.
//! - Closed services refuse every call.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::fs;
use std::sync::Arc;

use fleetconf_core::DefaultFieldCatalog;
use fleetconf_core::ErrorKind;
use fleetconf_core::FieldCatalog;
use fleetconf_service::HealthState;
use fleetconf_service::KeyMaterial;
use fleetconf_service::ServiceError;
use fleetconf_service::UpdateConfigRequest;
use serde_json::json;

use crate::common::Harness;
use crate::common::LKG_KEY;
use crate::common::cfg;
use crate::common::stt_catalog;

// ============================================================================
// SECTION: Startup
// ============================================================================

#[test]
fn fresh_start_is_ready_and_empty() {
    let harness = Harness::new();
    let service = harness.start();

    let health = service.health();
    assert_eq!(health.state, HealthState::Ready);
    assert_eq!(health.config_epoch, None);
    assert_eq!(health.service_count, 0);
    assert!(health.lkg_enabled);
    assert!(health.signing_enabled);
    assert!(health.blocked_services.is_empty());
    service.readiness().unwrap();
    assert!(!harness.lkg_path().exists());
}

#[test]
fn required_signature_without_key_fails_startup() {
    let mut harness = Harness::new();
    harness.settings.distribution.require_signature = true;

    let result = harness.try_start(KeyMaterial::new(LKG_KEY), Arc::new(DefaultFieldCatalog));
    assert!(matches!(result, Err(ServiceError::Startup(_))));
}

#[test]
fn invalid_settings_fail_startup() {
    let mut harness = Harness::new();
    harness.settings.lkg.path = harness.settings.store.path.clone();

    let result = harness.try_start(common::full_keys(), Arc::new(DefaultFieldCatalog));
    let err = result.err().unwrap();
    assert!(matches!(err, ServiceError::Settings(_)));
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn missing_signing_key_starts_unsigned() {
    let harness = Harness::new();
    let service =
        harness.try_start(KeyMaterial::new(LKG_KEY), Arc::new(DefaultFieldCatalog)).unwrap();
    assert!(!service.health().signing_enabled);
}

#[test]
fn existing_configs_refresh_cache_on_startup() {
    let harness = Harness::new();
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    service.shutdown();
    fs::remove_file(harness.lkg_path()).unwrap();

    let restarted = harness.start();
    assert!(harness.lkg_path().exists());
    assert_eq!(restarted.health().service_count, 1);
}

// ============================================================================
// SECTION: LKG Recovery
// ============================================================================

#[test]
fn empty_store_is_rebuilt_from_cache_with_opt_in() {
    let mut harness = Harness::new();
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    let original_epoch = service.health().config_epoch.unwrap();
    service.shutdown();

    harness.settings.store.path = harness.temp.path().join("replacement.db");
    harness.settings.lkg.allow_auto_rebuild = true;
    let rebuilt = harness.start();

    let config = rebuilt.get_config("stt-worker", None).unwrap().unwrap();
    assert_eq!(config.config, cfg(json!({"beam": 5})));
    assert_eq!(config.version, 1);
    assert_ne!(config.config_epoch, original_epoch);
    assert!(harness.audit.names().contains(&"lkg_rebuild"));
    assert_eq!(rebuilt.health().state, HealthState::Ready);
}

#[test]
fn empty_store_stays_empty_without_opt_in() {
    let mut harness = Harness::new();
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    service.shutdown();

    harness.settings.store.path = harness.temp.path().join("replacement.db");
    let fresh = harness.start();
    assert!(fresh.list_services().unwrap().is_empty());
}

#[test]
fn corrupt_cache_degrades_startup_without_rebuilding() {
    let mut harness = Harness::new();
    harness.settings.lkg.allow_auto_rebuild = true;
    fs::write(harness.lkg_path(), b"{not json").unwrap();

    let service = harness.start();
    let health = service.health();
    assert_eq!(health.state, HealthState::Degraded);
    assert!(health.last_error.is_some());
    assert!(service.list_services().unwrap().is_empty());
    service.readiness().unwrap();
}

#[test]
fn absent_cache_with_opt_in_starts_fresh() {
    let mut harness = Harness::new();
    harness.settings.lkg.allow_auto_rebuild = true;
    let service = harness.start();
    assert_eq!(service.health().state, HealthState::Ready);
}

// ============================================================================
// SECTION: Schema Drift
// ============================================================================

#[test]
fn first_start_records_schema_version() {
    let harness = Harness::new();
    let service = harness.start_with_catalog(Arc::new(stt_catalog("Model name")));
    assert_eq!(service.health().schema_version, Some(1));
    assert_eq!(service.store().schema_fingerprints().unwrap().len(), 1);
}

#[test]
fn drifted_services_are_blocked_until_reconciled() {
    let harness = Harness::new();
    let service = harness.start_with_catalog(Arc::new(stt_catalog("Model name")));
    service
        .update_config(&UpdateConfigRequest::new(
            "stt-worker",
            cfg(json!({"whisper_model": "base.en"})),
        ))
        .unwrap();
    service.shutdown();

    let changed = stt_catalog("Whisper checkpoint");
    let schemas = changed.service_schemas();
    let service = harness.start_with_catalog(Arc::new(changed));
    assert_eq!(service.health().blocked_services, vec!["stt-worker".to_string()]);

    let err = service
        .update_config(&UpdateConfigRequest::new(
            "stt-worker",
            cfg(json!({"whisper_model": "small.en"})),
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    service
        .update_config(&UpdateConfigRequest::new("llm-worker", cfg(json!({"model": "x"}))))
        .unwrap();

    let version = service.reconcile_schema(&schemas, Some("ops")).unwrap();
    assert_eq!(version, 2);
    assert!(service.health().blocked_services.is_empty());
    service
        .update_config(&UpdateConfigRequest::new(
            "stt-worker",
            cfg(json!({"whisper_model": "small.en"})),
        ))
        .unwrap();
    assert!(harness.audit.names().contains(&"schema_reconcile"));
}

#[test]
fn drift_only_warns_when_blocking_is_disabled() {
    let mut harness = Harness::new();
    let service = harness.start_with_catalog(Arc::new(stt_catalog("Model name")));
    service.shutdown();

    harness.settings.store.block_on_schema_drift = false;
    let service = harness.start_with_catalog(Arc::new(stt_catalog("Changed")));
    assert!(service.health().blocked_services.is_empty());
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 1}))))
        .unwrap();
}

// ============================================================================
// SECTION: Shutdown
// ============================================================================

#[test]
fn closed_service_refuses_calls() {
    let harness = Harness::new();
    let service = harness.start();
    service.close();

    assert!(matches!(service.list_services(), Err(ServiceError::Closed)));
    assert!(matches!(
        service.update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({})))),
        Err(ServiceError::Closed)
    ));
    assert!(matches!(service.readiness(), Err(ServiceError::Closed)));
    assert_eq!(service.health().state, HealthState::Unhealthy);
}
