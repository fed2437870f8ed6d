// crates/fleetconf-distributor/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures for distributor tests.
// Purpose: Build sample configs, keys, and capture buffers.
// Dependencies: ed25519-dalek, fleetconf-core, serde_json
// ============================================================================

//! ## Overview
//! Sample configs, deterministic keys, and writers for publisher tests.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use ed25519_dalek::SigningKey;
use fleetconf_core::ServiceConfig;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns a committed `stt-worker` config at the given version.
pub fn sample_config(version: i64) -> ServiceConfig {
    ServiceConfig {
        service: "stt-worker".to_string(),
        config: json!({"whisper_model": "base.en", "beam": 5}).as_object().cloned().unwrap(),
        version,
        config_epoch: "epoch-1".to_string(),
        updated_at: 1_700_000_000_000,
        updated_by: Some("ops".to_string()),
    }
}

/// Returns a deterministic signing key.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

// ============================================================================
// SECTION: Writers
// ============================================================================

/// Thread-safe capture buffer.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Returns the captured text.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("simulated write failure"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
