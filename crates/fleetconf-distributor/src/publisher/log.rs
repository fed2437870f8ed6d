// crates/fleetconf-distributor/src/publisher/log.rs
// ============================================================================
// Module: Log Publisher
// Description: Publisher that records messages as JSON lines.
// Purpose: Keep an audit trail of announcements without a live bus.
// Dependencies: fleetconf-core, serde_json, std
// ============================================================================

//! ## Overview
//! `LogPublisher` writes one JSON record per message. Records carry routing
//! metadata and a payload digest, not the payload itself, so config values
//! never reach the log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;

use fleetconf_core::hashing::DEFAULT_HASH_ALGORITHM;
use fleetconf_core::hashing::hash_bytes;
use fleetconf_core::time::unix_millis;
use serde_json::json;

use crate::message::BusMessage;
use crate::publisher::ConfigPublisher;
use crate::publisher::PublishError;

// ============================================================================
// SECTION: Log Publisher
// ============================================================================

/// JSON-line publisher.
pub struct LogPublisher<W: Write + Send> {
    /// Output writer for records.
    writer: Mutex<W>,
}

impl<W: Write + Send> LogPublisher<W> {
    /// Creates a log publisher over `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> ConfigPublisher for LogPublisher<W> {
    fn publish(&self, message: &BusMessage) -> Result<(), PublishError> {
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &message.payload);
        let record = json!({
            "topic": message.topic,
            "qos": message.qos.level(),
            "retain": message.retain,
            "payload_len": message.payload.len(),
            "payload_sha256": digest.value,
            "published_at": unix_millis(),
        });
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| PublishError::LogWriteFailed("log writer mutex poisoned".to_string()))?;
        serde_json::to_writer(&mut *guard, &record)
            .map_err(|err| PublishError::LogWriteFailed(err.to_string()))?;
        guard.write_all(b"\n").map_err(|err| PublishError::LogWriteFailed(err.to_string()))?;
        drop(guard);
        Ok(())
    }
}
