// crates/fleetconf-store-sqlite/tests/config_store.rs
// ============================================================================
// Module: SQLite Config Store Tests
// Description: Optimistic locking, history ledger, projection, and epochs.
// Purpose: Validate the write path and its read-side views.
// Dependencies: fleetconf-core, fleetconf-store-sqlite, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Exercises the write path end to end:
//! - Version conflicts reject the write and leave no history
//! - Versions grow by one per accepted write, never reused
//! - One history row per changed key, deletions tagged
//! - Item projection and search filters
//! - Epoch stability and persistence across reopen

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

use std::sync::Arc;
use std::thread;

use fleetconf_core::AccessLogEntry;
use fleetconf_core::AccessLogQuery;
use fleetconf_core::ConfigSnapshotSource;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::ConfigUpdate;
use fleetconf_core::FieldMeta;
use fleetconf_core::HistoryQuery;
use fleetconf_core::ItemSearch;
use fleetconf_core::StaticFieldCatalog;
use fleetconf_store_sqlite::REDACTED_VALUE;
use fleetconf_store_sqlite::SqliteConfigStore;
use fleetconf_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

use crate::common::cfg;
use crate::common::temp_store;
use crate::common::temp_store_with_catalog;

// ============================================================================
// SECTION: Optimistic Locking
// ============================================================================

#[test]
fn stale_expected_version_is_rejected_and_config_kept() {
    let (_temp, store) = temp_store();
    let first = store.update("svc", &cfg(json!({"a": 1})), None, Some("alice")).unwrap();
    assert_eq!(first, 1);

    let err = store.update("svc", &cfg(json!({"a": 2})), Some(first + 5), Some("bob")).unwrap_err();
    assert_eq!(
        err,
        ConfigStoreError::VersionConflict {
            service: "svc".to_string(),
            expected: 6,
            current: 1,
        }
    );
    let stored = store.get("svc").unwrap().unwrap();
    assert_eq!(stored.config, cfg(json!({"a": 1})));
    assert_eq!(stored.version, 1);
    assert_eq!(store.get_key_history("svc", "a", 10).unwrap().len(), 1);
}

#[test]
fn expected_version_zero_creates_missing_service() {
    let (_temp, store) = temp_store();
    assert!(matches!(
        store.compare_and_swap("svc", &cfg(json!({"a": 1})), 3, None),
        Err(ConfigStoreError::VersionConflict { current: 0, .. })
    ));
    assert!(store.get("svc").unwrap().is_none());
    assert_eq!(store.compare_and_swap("svc", &cfg(json!({"a": 1})), 0, None).unwrap(), 1);
}

#[test]
fn versions_increase_by_one_even_when_reverting() {
    let (_temp, store) = temp_store();
    let a = cfg(json!({"mode": "a"}));
    let b = cfg(json!({"mode": "b"}));
    let versions: Vec<i64> = [&a, &b, &a, &a]
        .iter()
        .map(|config| store.put("svc", config, None).unwrap())
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

#[test]
fn invalid_service_names_are_rejected_before_writing() {
    let (_temp, store) = temp_store();
    let err = store.put("bad name", &cfg(json!({})), None).unwrap_err();
    assert!(matches!(err, ConfigStoreError::Invalid(_)));
    assert!(store.list_services().unwrap().is_empty());
}

// ============================================================================
// SECTION: History
// ============================================================================

#[test]
fn history_records_one_row_per_changed_key() {
    let (_temp, store) = temp_store();
    store.put("svc", &cfg(json!({"a": 1, "b": 2})), Some("alice")).unwrap();
    store.put("svc", &cfg(json!({"a": 1, "b": 3, "c": 4})), Some("bob")).unwrap();

    let b = store.get_key_history("svc", "b", 10).unwrap();
    assert_eq!(b.len(), 2);
    assert_eq!(b[0].old_value, Some(json!(2)));
    assert_eq!(b[0].new_value, Some(json!(3)));
    assert_eq!(b[0].changed_by.as_deref(), Some("bob"));

    let c = store.get_key_history("svc", "c", 10).unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c[0].old_value, None);
    assert_eq!(c[0].new_value, Some(json!(4)));

    let a = store.get_key_history("svc", "a", 10).unwrap();
    assert_eq!(a.len(), 1, "unchanged key must not gain history");
}

#[test]
fn removed_keys_are_tagged_key_deleted() {
    let (_temp, store) = temp_store();
    store.put("svc", &cfg(json!({"a": 1, "b": 2})), None).unwrap();
    store.put("svc", &cfg(json!({"a": 1})), None).unwrap();
    let latest = &store.get_key_history("svc", "b", 10).unwrap()[0];
    assert_eq!(latest.old_value, Some(json!(2)));
    assert_eq!(latest.new_value, None);
    assert_eq!(latest.change_reason.as_deref(), Some("Key deleted"));
}

#[test]
fn null_value_is_distinct_from_missing_key() {
    let (_temp, store) = temp_store();
    store.put("svc", &cfg(json!({"a": null})), None).unwrap();
    let row = &store.get_key_history("svc", "a", 10).unwrap()[0];
    assert_eq!(row.old_value, None);
    assert_eq!(row.new_value, Some(json!(null)));
}

#[test]
fn change_reason_is_recorded_for_changed_keys() {
    let (_temp, store) = temp_store();
    store
        .apply(&ConfigUpdate::new("svc", cfg(json!({"a": 1}))).by("ops").because("tuning"))
        .unwrap();
    let row = &store.get_key_history("svc", "a", 10).unwrap()[0];
    assert_eq!(row.change_reason.as_deref(), Some("tuning"));
    assert_eq!(row.changed_by.as_deref(), Some("ops"));
}

#[test]
fn history_query_filters_and_orders_most_recent_first() {
    let (_temp, store) = temp_store();
    store.put("one", &cfg(json!({"k": 1})), None).unwrap();
    store.put("two", &cfg(json!({"k": 1})), None).unwrap();
    store.put("one", &cfg(json!({"k": 2})), None).unwrap();

    let all = store.get_history(&HistoryQuery::default()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|pair| pair[0].id > pair[1].id));

    let one = store
        .get_history(&HistoryQuery {
            service: Some("one".to_string()),
            ..HistoryQuery::default()
        })
        .unwrap();
    assert_eq!(one.len(), 2);
    assert_eq!(one[0].new_value, Some(json!(2)));

    let limited = store
        .get_history(&HistoryQuery {
            limit: 1,
            ..HistoryQuery::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 1);

    let future = store
        .get_history(&HistoryQuery {
            since: Some(i64::MAX - 1),
            ..HistoryQuery::default()
        })
        .unwrap();
    assert!(future.is_empty());
}

#[test]
fn secret_fields_are_masked_in_history_and_projection() {
    let catalog = StaticFieldCatalog::new().with_field(
        "llm",
        "api_key",
        FieldMeta {
            complexity: "advanced".to_string(),
            description: "Provider key".to_string(),
            is_secret: true,
        },
    );
    let (_temp, store) = temp_store_with_catalog(Arc::new(catalog));
    store.put("llm", &cfg(json!({"api_key": "sk-live", "model": "m"})), None).unwrap();

    let history = store.get_key_history("llm", "api_key", 10).unwrap();
    assert_eq!(history[0].new_value, Some(json!(REDACTED_VALUE)));

    let items = store
        .search_items(&ItemSearch {
            is_secret: Some(true),
            ..ItemSearch::default()
        })
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "api_key");
    assert_eq!(items[0].value, None);
    assert_eq!(items[0].complexity, "advanced");
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn stt_worker_update_produces_two_history_rows() {
    let (_temp, store) = temp_store();
    let v1 = store.update("stt-worker", &cfg(json!({"whisper_model": "base.en"})), None, None).unwrap();
    assert_eq!(v1, 1);
    let v2 = store
        .update(
            "stt-worker",
            &cfg(json!({"whisper_model": "small.en", "new_key": "v"})),
            Some(1),
            Some("op"),
        )
        .unwrap();
    assert_eq!(v2, 2);

    let since_first = store
        .get_history(&HistoryQuery {
            service: Some("stt-worker".to_string()),
            ..HistoryQuery::default()
        })
        .unwrap();
    let second_write: Vec<_> =
        since_first.iter().filter(|row| row.changed_by.as_deref() == Some("op")).collect();
    assert_eq!(second_write.len(), 2);
    let model = store.get_key_history("stt-worker", "whisper_model", 10).unwrap();
    assert_eq!(model[0].old_value, Some(json!("base.en")));
    assert_eq!(model[0].new_value, Some(json!("small.en")));
    let added = store.get_key_history("stt-worker", "new_key", 10).unwrap();
    assert_eq!(added[0].old_value, None);
}

// ============================================================================
// SECTION: Projection and Search
// ============================================================================

#[test]
fn projection_is_rebuilt_on_every_write() {
    let (_temp, store) = temp_store();
    store.put("svc", &cfg(json!({"a": 1, "b": "x"})), None).unwrap();
    store.put("svc", &cfg(json!({"b": "y"})), None).unwrap();
    let items = store
        .search_items(&ItemSearch {
            service: Some("svc".to_string()),
            ..ItemSearch::default()
        })
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "b");
    assert_eq!(items[0].value.as_deref(), Some("\"y\""));
    assert_eq!(items[0].value_type, "string");
    assert_eq!(items[0].complexity, "basic");
}

#[test]
fn search_matches_text_and_filters_by_type() {
    let (_temp, store) = temp_store();
    store.put("stt", &cfg(json!({"whisper_model": "base.en", "beam": 5})), None).unwrap();
    store.put("tts", &cfg(json!({"voice": "whisper-soft", "rate": 1.5})), None).unwrap();

    let text = store
        .search_items(&ItemSearch {
            query: Some("WHISPER".to_string()),
            ..ItemSearch::default()
        })
        .unwrap();
    let keys: Vec<_> = text.iter().map(|item| item.key.as_str()).collect();
    assert_eq!(keys, vec!["whisper_model", "voice"]);

    let numbers = store
        .search_items(&ItemSearch {
            value_type: Some("number".to_string()),
            ..ItemSearch::default()
        })
        .unwrap();
    assert_eq!(numbers.len(), 1);
    assert_eq!(numbers[0].key, "rate");

    let wildcard = store
        .search_items(&ItemSearch {
            query: Some("%".to_string()),
            ..ItemSearch::default()
        })
        .unwrap();
    assert!(wildcard.is_empty(), "LIKE wildcards in caller text must be literal");
}

// ============================================================================
// SECTION: Epoch
// ============================================================================

#[test]
fn epoch_is_minted_once_and_stable_across_writes() {
    let (_temp, store) = temp_store();
    assert_eq!(store.get_config_epoch().unwrap(), None);
    store.put("a", &cfg(json!({"x": 1})), None).unwrap();
    let first = store.get_config_epoch().unwrap().unwrap();
    assert_eq!(store.get_config_epoch().unwrap().unwrap(), first);

    store.put("b", &cfg(json!({"y": 1})), None).unwrap();
    assert_eq!(store.get("b").unwrap().unwrap().config_epoch, first);
    assert!(store.validate_epoch(&first).unwrap());
    assert!(!store.validate_epoch("not-an-epoch").unwrap());

    let metadata = store.epoch_metadata().unwrap().unwrap();
    assert_eq!(metadata.config_epoch, first);
    assert_eq!(metadata.service_count, 2);
    assert!(metadata.schema_version.is_none());
}

#[test]
fn data_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.db");
    let epoch = {
        let store = SqliteConfigStore::open(SqliteStoreConfig::new(&path)).unwrap();
        store.put("svc", &cfg(json!({"a": 1})), Some("alice")).unwrap();
        store.get_config_epoch().unwrap().unwrap()
    };
    let store = SqliteConfigStore::open(SqliteStoreConfig::new(&path)).unwrap();
    let stored = store.get("svc").unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.config_epoch, epoch);
    assert_eq!(stored.updated_by.as_deref(), Some("alice"));
    store.readiness().unwrap();
}

#[test]
fn directory_path_is_rejected() {
    let temp = TempDir::new().unwrap();
    let result = SqliteConfigStore::open(SqliteStoreConfig::new(temp.path()));
    assert!(matches!(result, Err(ConfigStoreError::Invalid(_))));
}

#[test]
fn concurrent_writers_never_skip_versions() {
    let (_temp, store) = temp_store();
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                for step in 0..10 {
                    store.put("svc", &cfg(json!({"worker": worker, "step": step})), None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get("svc").unwrap().unwrap().version, 40);
}

#[test]
fn commit_returns_the_row_each_writer_committed() {
    let (_temp, store) = temp_store();
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|step| {
                        let config = cfg(json!({"worker": worker, "step": step}));
                        let update = ConfigUpdate::new("svc", config.clone()).by("writer");
                        let committed = store.commit(&update).unwrap();
                        assert_eq!(committed.config, config);
                        assert_eq!(committed.updated_by.as_deref(), Some("writer"));
                        committed
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut versions = Vec::new();
    for handle in handles {
        versions.extend(handle.join().unwrap().into_iter().map(|committed| committed.version));
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=40).collect::<Vec<i64>>());

    let latest = store.get("svc").unwrap().unwrap();
    let again = store.commit(&ConfigUpdate::new("svc", latest.config.clone())).unwrap();
    assert_eq!(again.version, 41);
    assert_eq!(Some(again), store.get("svc").unwrap());
}

#[test]
fn consistent_snapshot_pairs_rows_with_their_epoch() {
    let (_temp, store) = temp_store();
    assert_eq!(store.consistent_snapshot().unwrap(), None);

    store.put("b", &cfg(json!({"y": 1})), None).unwrap();
    store.put("a", &cfg(json!({"x": 1})), None).unwrap();
    let snapshot = store.consistent_snapshot().unwrap().unwrap();
    assert_eq!(Some(snapshot.config_epoch.clone()), store.get_config_epoch().unwrap());
    assert_eq!(snapshot.configs, store.all_configs().unwrap());
    let services: Vec<_> = snapshot.configs.iter().map(|config| config.service.as_str()).collect();
    assert_eq!(services, vec!["a", "b"]);
    assert!(snapshot.configs.iter().all(|config| config.config_epoch == snapshot.config_epoch));
}

// ============================================================================
// SECTION: Access Log
// ============================================================================

#[test]
fn access_log_round_trips_most_recent_first() {
    let (_temp, store) = temp_store();
    store
        .log_access(&AccessLogEntry::new("alice", "update_config").with_service("svc"))
        .unwrap();
    store
        .log_access(
            &AccessLogEntry::new("bob", "update_config")
                .with_service("svc")
                .with_key("a")
                .failed("version conflict"),
        )
        .unwrap();

    let all = store.access_log(&AccessLogQuery::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].user_id, "bob");
    assert!(!all[0].success);
    assert_eq!(all[0].reason.as_deref(), Some("version conflict"));
    assert!(all[0].timestamp > 0);

    let alice = store
        .access_log(&AccessLogQuery {
            user_id: Some("alice".to_string()),
            ..AccessLogQuery::default()
        })
        .unwrap();
    assert_eq!(alice.len(), 1);
    assert!(alice[0].success);
}
