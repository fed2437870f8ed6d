// crates/fleetconf-service/tests/updates.rs
// ============================================================================
// Module: Service Write Path Tests
// Description: Updates, conflicts, degraded propagation, profiles, secrets.
// Purpose: Validate commit-then-propagate ordering and audit coverage.
// Dependencies: fleetconf-service, fleetconf-distributor, tempfile
// ============================================================================

//! ## Overview
//! - Accepted writes refresh the cache and publish a signed message.
//! - Cache or publish failures degrade health but never undo the commit.
//! - Profile activation applies every service with optimistic locking.
//! - Secrets require the master key and never reach logs.

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

use fleetconf_core::AccessLogQuery;
use fleetconf_core::DefaultFieldCatalog;
use fleetconf_core::ErrorKind;
use fleetconf_core::HistoryQuery;
use fleetconf_distributor::ConfigVerifier;
use fleetconf_distributor::DistributionOutcome;
use fleetconf_distributor::QoS;
use fleetconf_distributor::SignatureStatus;
use fleetconf_lkg::LkgCacheManager;
use fleetconf_service::AuditOutcome;
use fleetconf_service::HealthState;
use fleetconf_service::KeyMaterial;
use fleetconf_service::LkgRefresh;
use fleetconf_service::ServiceError;
use fleetconf_service::UpdateConfigRequest;
use serde_json::json;
use zeroize::Zeroizing;

use crate::common::Harness;
use crate::common::LKG_KEY;
use crate::common::cfg;
use crate::common::signing_key;

// ============================================================================
// SECTION: Updates
// ============================================================================

#[test]
fn accepted_update_refreshes_cache_and_publishes_signed_message() {
    let harness = Harness::new();
    let service = harness.start();

    let outcome = service
        .update_config(
            &UpdateConfigRequest::new("stt-worker", cfg(json!({"whisper_model": "base.en"})))
                .expecting(0)
                .by("ops")
                .because("initial rollout"),
        )
        .unwrap();
    assert_eq!(outcome.version, 1);
    assert_eq!(outcome.lkg, LkgRefresh::Refreshed);
    assert_eq!(
        outcome.distribution,
        Ok(DistributionOutcome::Published {
            topic: "config/updated/stt-worker".to_string(),
        })
    );
    assert!(outcome.is_fully_propagated());

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].qos, QoS::AtLeastOnce);
    assert!(!messages[0].retain);
    let verifier = ConfigVerifier::new(Some(signing_key().verifying_key()), true).unwrap();
    let message = verifier.decode(&messages[0].payload).unwrap();
    assert_eq!(verifier.verify(&message).unwrap(), SignatureStatus::Verified);
    assert_eq!(message.version, 1);
    assert_eq!(message.config_epoch, outcome.config_epoch);

    let cache = LkgCacheManager::open_reader(harness.lkg_path(), Zeroizing::new(LKG_KEY.to_vec()))
        .unwrap();
    let snapshot = cache.read().unwrap();
    assert_eq!(snapshot.config_epoch, outcome.config_epoch);
    assert!(snapshot.payload.contains_key("stt-worker"));

    let history = service
        .get_history(&HistoryQuery {
            service: Some("stt-worker".to_string()),
            ..HistoryQuery::default()
        })
        .unwrap();
    assert_eq!(history[0].change_reason.as_deref(), Some("initial rollout"));

    let access = service.access_log(&AccessLogQuery::default()).unwrap();
    assert!(access.iter().any(|entry| entry.user_id == "ops" && entry.action == "update_config"));

    let events = harness.audit.events();
    let event = events.iter().find(|event| event.event == "update_config").unwrap();
    assert_eq!(event.outcome, AuditOutcome::Success);
    assert_eq!(event.version, Some(1));
}

#[test]
fn stale_version_is_rejected_without_publishing() {
    let harness = Harness::new();
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 6}))))
        .unwrap();

    let err = service
        .update_config(
            &UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 7}))).expecting(1).by("ops"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert!(err.is_recoverable());
    assert_eq!(harness.publisher.messages().len(), 2);
    assert_eq!(service.get_config("stt-worker", None).unwrap().unwrap().version, 2);
    assert_eq!(service.health().state, HealthState::Ready);

    let access = service.access_log(&AccessLogQuery::default()).unwrap();
    assert!(access.iter().any(|entry| !entry.success && entry.user_id == "ops"));
    let failure = harness
        .audit
        .events()
        .into_iter()
        .find(|event| event.outcome == AuditOutcome::Failure)
        .unwrap();
    assert_eq!(failure.error_kind, Some("version_conflict"));
}

#[test]
fn invalid_service_name_is_rejected() {
    let harness = Harness::new();
    let service = harness.start();
    let err = service
        .update_config(&UpdateConfigRequest::new("bad/name", cfg(json!({}))))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[test]
fn publish_failure_degrades_but_keeps_the_commit() {
    let harness = Harness::new();
    let service = harness.start();
    harness.publisher.set_failing(true);

    let outcome = service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    assert!(outcome.distribution.is_err());
    assert_eq!(outcome.lkg, LkgRefresh::Refreshed);
    assert!(!outcome.is_fully_propagated());
    assert_eq!(service.get_config("stt-worker", None).unwrap().unwrap().version, 1);
    let health = service.health();
    assert_eq!(health.state, HealthState::Degraded);
    assert_eq!(health.last_error, Some(ErrorKind::DeliveryFailure));

    harness.publisher.set_failing(false);
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 6}))))
        .unwrap();
    assert_eq!(service.health().state, HealthState::Ready);
}

#[test]
fn cache_failure_degrades_but_keeps_the_commit() {
    let harness = Harness::new();
    let service = harness.start();
    fs::create_dir(harness.lkg_path()).unwrap();

    let outcome = service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    assert!(matches!(outcome.lkg, LkgRefresh::Failed { .. }));
    assert!(outcome.distribution.is_ok());
    let health = service.health();
    assert_eq!(health.state, HealthState::Degraded);
    assert_eq!(health.last_error, Some(ErrorKind::StorageFailure));
}

#[test]
fn unsigned_and_cacheless_modes_are_reported() {
    let mut harness = Harness::new();
    harness.settings.lkg.enabled = false;
    let service =
        harness.try_start(KeyMaterial::new(LKG_KEY), Arc::new(DefaultFieldCatalog)).unwrap();

    let outcome = service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    assert_eq!(outcome.lkg, LkgRefresh::Disabled);
    assert_eq!(
        outcome.distribution,
        Ok(DistributionOutcome::PublishedUnsigned {
            topic: "config/updated/stt-worker".to_string(),
        })
    );
    assert!(!harness.lkg_path().exists());
}

#[test]
fn reads_are_logged_when_enabled() {
    let mut harness = Harness::new();
    harness.settings.audit.log_reads = true;
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();

    assert!(service.get_config("stt-worker", Some("viewer")).unwrap().is_some());
    assert!(service.get_config("absent", Some("viewer")).unwrap().is_none());

    let reads = service
        .access_log(&AccessLogQuery {
            action: Some("read_config".to_string()),
            ..AccessLogQuery::default()
        })
        .unwrap();
    assert_eq!(reads.len(), 2);
    assert!(reads.iter().any(|entry| !entry.success));
}

// ============================================================================
// SECTION: Profiles
// ============================================================================

#[test]
fn activating_a_profile_restores_every_service() {
    let harness = Harness::new();
    let service = harness.start();
    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 5}))))
        .unwrap();
    service
        .update_config(&UpdateConfigRequest::new("llm-worker", cfg(json!({"model": "large"}))))
        .unwrap();
    service.save_profile("Prod", "production baseline", Some("ops")).unwrap();

    service
        .update_config(&UpdateConfigRequest::new("stt-worker", cfg(json!({"beam": 1}))))
        .unwrap();
    let applied = service.activate_profile("Prod", Some("ops")).unwrap();

    assert_eq!(applied.get("stt-worker"), Some(&3));
    assert_eq!(applied.get("llm-worker"), Some(&2));
    let restored = service.get_config("stt-worker", None).unwrap().unwrap();
    assert_eq!(restored.config, cfg(json!({"beam": 5})));

    let history = service
        .get_history(&HistoryQuery {
            service: Some("stt-worker".to_string()),
            ..HistoryQuery::default()
        })
        .unwrap();
    assert!(
        history
            .iter()
            .any(|row| row.change_reason.as_deref() == Some("Activated profile Prod"))
    );
    assert!(harness.audit.names().contains(&"profile_activation"));
    assert_eq!(service.list_profiles().unwrap().len(), 1);
}

#[test]
fn missing_profile_is_not_found() {
    let harness = Harness::new();
    let service = harness.start();
    let err = service.activate_profile("Staging", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!service.delete_profile("Staging", None).unwrap());
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

#[test]
fn secrets_round_trip_and_stay_out_of_logs() {
    let harness = Harness::new();
    let service = harness.start();
    service.store_secret("stt-worker", "api_key", "sk-live-123", Some("ops")).unwrap();

    let value = service.retrieve_secret("stt-worker", "api_key", Some("ops")).unwrap().unwrap();
    assert_eq!(value.as_str(), "sk-live-123");

    let access = service.access_log(&AccessLogQuery::default()).unwrap();
    assert!(access.iter().any(|entry| entry.action == "store_secret"));
    assert!(access.iter().any(|entry| entry.action == "read_secret"));
    let rendered = format!("{:?}", harness.audit.events());
    assert!(!rendered.contains("sk-live-123"));
}

#[test]
fn secrets_require_master_key() {
    let harness = Harness::new();
    let service =
        harness.try_start(KeyMaterial::new(LKG_KEY), Arc::new(DefaultFieldCatalog)).unwrap();
    let err = service.store_secret("stt-worker", "api_key", "sk", None).unwrap_err();
    assert!(matches!(err, ServiceError::Crypto(_)));
    assert_eq!(err.kind(), ErrorKind::CryptoFailure);
}
