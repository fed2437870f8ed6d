// crates/fleetconf-lkg/tests/lkg_cache.rs
// ============================================================================
// Module: LKG Cache Tests
// Description: Snapshot signing, tamper detection, and rebuild gating.
// Purpose: Ensure the cache never serves untrusted data.
// Dependencies: fleetconf-lkg, fleetconf-store-sqlite, serde_json, tempfile
// ============================================================================

//! ## Overview
//! - A refreshed cache verifies and mirrors the store.
//! - Any single flipped byte makes `read()` return nothing.
//! - Wrong keys and unknown algorithms are rejected.
//! - Rebuild requires operator opt-in and restores under a new epoch.

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

use std::fs;
use std::path::Path;

use fleetconf_core::ConfigMap;
use fleetconf_lkg::LkgCacheConfig;
use fleetconf_lkg::LkgCacheManager;
use fleetconf_lkg::LkgError;
use fleetconf_store_sqlite::SqliteConfigStore;
use fleetconf_store_sqlite::SqliteStoreConfig;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn cfg(value: Value) -> ConfigMap {
    value.as_object().cloned().unwrap()
}

fn key(bytes: &[u8]) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(bytes.to_vec())
}

fn store_in(dir: &Path, name: &str) -> SqliteConfigStore {
    SqliteConfigStore::open(SqliteStoreConfig::new(dir.join(name))).unwrap()
}

fn manager(dir: &Path, allow_auto_rebuild: bool) -> LkgCacheManager {
    LkgCacheManager::new(
        &LkgCacheConfig {
            path: dir.join("cache").join("lkg.json"),
            allow_auto_rebuild,
        },
        key(b"lkg-secret"),
    )
    .unwrap()
}

fn seeded_store(dir: &Path) -> SqliteConfigStore {
    let store = store_in(dir, "config.db");
    store.put("stt-worker", &cfg(json!({"whisper_model": "base.en", "beam": 5})), None).unwrap();
    store.put("tts-worker", &cfg(json!({"voice": "amy"})), None).unwrap();
    store
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn refreshed_cache_verifies_and_mirrors_store() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let cache = manager(temp.path(), false);

    let written = cache.atomic_update_from_db(&store).unwrap();
    assert_eq!(written.config_epoch, store.get_config_epoch().unwrap().unwrap());
    assert_eq!(written.payload.len(), 2);
    assert!(fleetconf_core::time::is_rfc3339(&written.generated_at));

    let read = cache.read().unwrap();
    assert_eq!(read, written);

    let raw: Value = serde_json::from_slice(&fs::read(cache.path()).unwrap()).unwrap();
    assert_eq!(raw["algorithm"], json!("hmac-sha256"));
    assert_eq!(raw["signature"].as_str().unwrap().len(), 64);

    let leftovers = fs::read_dir(cache.path().parent().unwrap()).unwrap().count();
    assert_eq!(leftovers, 1, "temporary files must not survive the rename");
}

#[test]
fn flipping_any_byte_makes_read_return_nothing() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let cache = manager(temp.path(), false);
    cache.atomic_update_from_db(&store).unwrap();
    let original = fs::read(cache.path()).unwrap();

    for index in 0..original.len() {
        let mut tampered = original.clone();
        tampered[index] ^= 0x01;
        fs::write(cache.path(), &tampered).unwrap();
        assert!(cache.read().is_none(), "tampered byte {index} was accepted");
    }

    fs::write(cache.path(), &original).unwrap();
    assert!(cache.read().is_some());
}

#[test]
fn wrong_key_and_unknown_algorithm_are_rejected() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let cache = manager(temp.path(), false);
    cache.atomic_update_from_db(&store).unwrap();

    let other = LkgCacheManager::open_reader(cache.path(), key(b"other-secret")).unwrap();
    assert!(matches!(other.read_verified(), Err(LkgError::SignatureMismatch)));
    assert!(other.read().is_none());

    let mut raw: Value = serde_json::from_slice(&fs::read(cache.path()).unwrap()).unwrap();
    raw["algorithm"] = json!("md5");
    fs::write(cache.path(), serde_json::to_vec(&raw).unwrap()).unwrap();
    assert!(matches!(cache.read_verified(), Err(LkgError::UnknownAlgorithm(_))));
}

#[test]
fn missing_cache_and_empty_store_are_reported() {
    let temp = TempDir::new().unwrap();
    let cache = manager(temp.path(), false);
    assert!(matches!(cache.read_verified(), Err(LkgError::Missing)));
    assert!(cache.read().is_none());

    let empty = store_in(temp.path(), "empty.db");
    assert!(matches!(cache.atomic_update_from_db(&empty), Err(LkgError::EmptyStore)));
    assert!(!cache.path().exists());
}

#[test]
fn empty_hmac_key_is_rejected() {
    let temp = TempDir::new().unwrap();
    let result = LkgCacheManager::open_reader(temp.path().join("lkg.json"), key(b""));
    assert!(matches!(result, Err(LkgError::Crypto(_))));
}

#[test]
fn rebuild_requires_opt_in() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let locked = manager(temp.path(), false);
    locked.atomic_update_from_db(&store).unwrap();
    let fresh = store_in(temp.path(), "fresh.db");
    assert!(matches!(locked.rebuild_store(&fresh, Some("ops")), Err(LkgError::RebuildNotAllowed)));
    assert!(fresh.list_services().unwrap().is_empty());

    let reader = LkgCacheManager::open_reader(locked.path(), key(b"lkg-secret")).unwrap();
    assert!(!reader.allows_auto_rebuild());
    assert!(reader.read().is_some());
}

#[test]
fn rebuild_restores_configs_under_new_epoch() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let cache = manager(temp.path(), true);
    let snapshot = cache.atomic_update_from_db(&store).unwrap();

    let fresh = store_in(temp.path(), "fresh.db");
    let epoch = cache.rebuild_store(&fresh, Some("ops")).unwrap();
    assert_ne!(epoch, snapshot.config_epoch);
    let restored = fresh.get("stt-worker").unwrap().unwrap();
    assert_eq!(restored.config, snapshot.payload["stt-worker"]);
    assert_eq!(restored.version, 1);
    assert_eq!(restored.config_epoch, epoch);
}

#[test]
fn tampered_cache_blocks_rebuild() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(temp.path());
    let cache = manager(temp.path(), true);
    cache.atomic_update_from_db(&store).unwrap();
    let mut raw: Value = serde_json::from_slice(&fs::read(cache.path()).unwrap()).unwrap();
    raw["payload"]["tts-worker"]["voice"] = json!("mallory");
    fs::write(cache.path(), serde_json::to_vec(&raw).unwrap()).unwrap();

    let fresh = store_in(temp.path(), "fresh.db");
    assert!(matches!(cache.rebuild_store(&fresh, None), Err(LkgError::SignatureMismatch)));
    assert!(fresh.get("tts-worker").unwrap().is_none());
}
