// crates/fleetconf-distributor/src/message.rs
// ============================================================================
// Module: Distribution Messages
// Description: Config-change message and bus envelope types.
// Purpose: Define the wire shape workers receive on config topics.
// Dependencies: ed25519-dalek, fleetconf-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`DistributionMessage`] carries the full config of one service together
//! with its version, epoch, and checksum. The optional Ed25519 signature covers
//! the RFC 8785 form of every other field.
//! Invariants:
//! - `checksum` is the SHA-256 hex of the canonical `config`.
//! - [`DistributionMessage::signing_bytes`] never includes `signature`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ed25519_dalek::SigningKey;
use fleetconf_core::ConfigMap;
use fleetconf_core::HashError;
use fleetconf_core::ServiceConfig;
use fleetconf_core::crypto::sign_hex;
use fleetconf_core::hashing::canonical_json_bytes;
use fleetconf_core::hashing::config_checksum;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default topic prefix; messages go to `<prefix>/<service>`.
pub const DEFAULT_TOPIC_PREFIX: &str = "config/updated";

// ============================================================================
// SECTION: Quality of Service
// ============================================================================

/// MQTT-style delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Redelivered until acknowledged; consumers must tolerate duplicates.
    AtLeastOnce,
    /// Exactly once.
    ExactlyOnce,
}

impl QoS {
    /// Returns the numeric level used on the wire.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

// ============================================================================
// SECTION: Distribution Message
// ============================================================================

/// Config change announced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMessage {
    /// Service the config belongs to.
    pub service: String,
    /// Full config after the change.
    pub config: ConfigMap,
    /// Store version after the change.
    pub version: i64,
    /// Store epoch the version belongs to.
    pub config_epoch: String,
    /// SHA-256 hex of the canonical config.
    pub checksum: String,
    /// Hex Ed25519 signature over [`DistributionMessage::signing_bytes`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl DistributionMessage {
    /// Builds an unsigned message from a stored config.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the config cannot be canonicalized.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, HashError> {
        Ok(Self {
            service: config.service.clone(),
            checksum: config_checksum(&config.config)?,
            config: config.config.clone(),
            version: config.version,
            config_epoch: config.config_epoch.clone(),
            signature: None,
        })
    }

    /// Returns the canonical bytes covered by the signature.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, HashError> {
        let unsigned = UnsignedView::from(self);
        canonical_json_bytes(&unsigned)
    }

    /// Signs the message in place, replacing any previous signature.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), HashError> {
        let bytes = self.signing_bytes()?;
        self.signature = Some(sign_hex(key, &bytes));
        Ok(())
    }

    /// Returns the checksum recomputed from the carried config.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn computed_checksum(&self) -> Result<String, HashError> {
        config_checksum(&self.config)
    }
}

/// Borrowed view of the signed fields.
#[derive(Serialize)]
struct UnsignedView<'a> {
    /// Service name.
    service: &'a str,
    /// Config payload.
    config: &'a ConfigMap,
    /// Version.
    version: i64,
    /// Epoch.
    config_epoch: &'a str,
    /// Checksum.
    checksum: &'a str,
}

impl<'a> From<&'a DistributionMessage> for UnsignedView<'a> {
    fn from(message: &'a DistributionMessage) -> Self {
        Self {
            service: &message.service,
            config: &message.config,
            version: message.version,
            config_epoch: &message.config_epoch,
            checksum: &message.checksum,
        }
    }
}

// ============================================================================
// SECTION: Bus Message
// ============================================================================

/// Serialized message addressed to a bus topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Destination topic.
    pub topic: String,
    /// JSON-encoded [`DistributionMessage`].
    pub payload: Vec<u8>,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Broker retain flag.
    pub retain: bool,
}

impl BusMessage {
    /// Decodes the payload back into a distribution message.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the payload is not a message.
    pub fn decode(&self) -> Result<DistributionMessage, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Joins a prefix and service name into a topic.
#[must_use]
pub fn topic_for(prefix: &str, service: &str) -> String {
    format!("{}/{service}", prefix.trim_end_matches('/'))
}
