// crates/fleetconf-core/tests/model_hashing_unit.rs
// ============================================================================
// Module: Model and Hashing Tests
// Description: Canonical checksums, kind labels, and model helpers.
// Purpose: Validate checksum determinism and input validation.
// ============================================================================

//! ## Overview
//! - Checksums ignore key insertion order.
//! - Service names are validated before touching storage.
//! - Field catalogs fall back to basic metadata.
//! - Error kinds keep stable labels.

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

use fleetconf_core::ConfigMap;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::DefaultFieldCatalog;
use fleetconf_core::ErrorKind;
use fleetconf_core::FieldCatalog;
use fleetconf_core::FieldMeta;
use fleetconf_core::StaticFieldCatalog;
use fleetconf_core::hashing::canonical_json_string;
use fleetconf_core::hashing::config_checksum;
use fleetconf_core::validate_service_name;
use fleetconf_core::value_type_label;
use proptest::prelude::*;
use serde_json::json;

fn map(value: serde_json::Value) -> ConfigMap {
    value.as_object().cloned().unwrap()
}

#[test]
fn checksum_is_deterministic_for_a_fixed_config() {
    let config = map(json!({"whisper_model": "base.en", "beam": 5}));
    let first = config_checksum(&config).unwrap();
    let second = config_checksum(&config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
}

#[test]
fn canonical_json_sorts_keys() {
    let config = map(json!({"b": 1, "a": {"d": 2, "c": 3}}));
    assert_eq!(canonical_json_string(&config).unwrap(), r#"{"a":{"c":3,"d":2},"b":1}"#);
}

proptest! {
    #[test]
    fn checksum_ignores_insertion_order(entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)) {
        let mut forward = ConfigMap::new();
        for (key, value) in &entries {
            forward.insert(key.clone(), json!(value));
        }
        let mut reverse = ConfigMap::new();
        for (key, value) in entries.iter().rev() {
            reverse.insert(key.clone(), json!(value));
        }
        prop_assert_eq!(config_checksum(&forward).unwrap(), config_checksum(&reverse).unwrap());
    }
}

#[test]
fn value_type_labels_cover_json_kinds() {
    assert_eq!(value_type_label(&json!(null)), "null");
    assert_eq!(value_type_label(&json!(true)), "boolean");
    assert_eq!(value_type_label(&json!(3)), "integer");
    assert_eq!(value_type_label(&json!(0.5)), "number");
    assert_eq!(value_type_label(&json!("x")), "string");
    assert_eq!(value_type_label(&json!([1])), "array");
    assert_eq!(value_type_label(&json!({})), "object");
}

#[test]
fn service_names_are_validated() {
    validate_service_name("stt-worker").unwrap();
    validate_service_name("llm.v2_main").unwrap();
    assert!(validate_service_name("").is_err());
    assert!(validate_service_name("bad/name").is_err());
    assert!(validate_service_name(&"x".repeat(129)).is_err());
}

#[test]
fn catalogs_fall_back_to_basic_metadata() {
    let default = DefaultFieldCatalog.field_meta("stt-worker", "anything");
    assert_eq!(default, FieldMeta::default());
    assert_eq!(default.complexity, "basic");

    let catalog = StaticFieldCatalog::new().with_field(
        "stt-worker",
        "api_key",
        FieldMeta {
            complexity: "advanced".to_string(),
            description: "Provider key".to_string(),
            is_secret: true,
        },
    );
    assert!(catalog.field_meta("stt-worker", "api_key").is_secret);
    assert!(!catalog.field_meta("stt-worker", "model").is_secret);

    assert!(DefaultFieldCatalog.service_schemas().is_empty());
    let schemas = catalog.service_schemas();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas["stt-worker"]["api_key"]["is_secret"], json!(true));
}

#[test]
fn error_kinds_have_stable_labels() {
    let conflict = ConfigStoreError::VersionConflict {
        service: "stt-worker".to_string(),
        expected: 1,
        current: 2,
    };
    assert_eq!(conflict.kind(), ErrorKind::VersionConflict);
    assert_eq!(conflict.kind().as_str(), "version_conflict");
    assert!(conflict.is_recoverable());
    assert!(!ConfigStoreError::Storage("disk".to_string()).is_recoverable());
    assert_eq!(ConfigStoreError::Crypto("x".to_string()).kind().as_str(), "crypto_failure");
    assert_eq!(ErrorKind::DeliveryFailure.as_str(), "delivery_failure");
}
