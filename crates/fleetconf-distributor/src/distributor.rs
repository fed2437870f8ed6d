// crates/fleetconf-distributor/src/distributor.rs
// ============================================================================
// Module: Config Distributor
// Description: Signs and publishes config changes after a committed write.
// Purpose: Announce every accepted version to subscribed workers.
// Dependencies: ed25519-dalek, fleetconf-core, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`ConfigDistributor::publish_update`] turns a stored [`ServiceConfig`] into
//! a [`DistributionMessage`], signs it when a key is configured, and hands it
//! to the publisher at QoS 1 with `retain = false`.
//!
//! Degraded modes:
//! - Without a signing key the message goes out unsigned and a warning is
//!   logged.
//! - If signing fails the message goes out unsigned only when
//!   `allow_unsigned` is set; otherwise it is skipped.
//!
//! Distribution runs after commit. Callers report failures; they never roll
//! back the write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use fleetconf_core::ServiceConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::message::BusMessage;
use crate::message::DEFAULT_TOPIC_PREFIX;
use crate::message::DistributionMessage;
use crate::message::QoS;
use crate::message::topic_for;
use crate::publisher::ConfigPublisher;
use crate::publisher::PublishError;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Distributor routing and signing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributorConfig {
    /// Topic prefix; the service name is appended.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Publish unsigned when signing fails.
    #[serde(default)]
    pub allow_unsigned: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            allow_unsigned: false,
        }
    }
}

/// Default topic prefix for serde.
fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

// ============================================================================
// SECTION: Errors and Outcomes
// ============================================================================

/// Distribution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DistributionError {
    /// The message could not be encoded.
    #[error("failed to encode distribution message: {0}")]
    Encode(String),
    /// The publisher rejected the message.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Result of a distribution attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionOutcome {
    /// Published with a signature.
    Published {
        /// Destination topic.
        topic: String,
    },
    /// Published without a signature.
    PublishedUnsigned {
        /// Destination topic.
        topic: String,
    },
    /// Not published.
    Skipped {
        /// Why the message was withheld.
        reason: String,
    },
}

impl DistributionOutcome {
    /// Returns true when the message reached the publisher.
    #[must_use]
    pub const fn was_published(&self) -> bool {
        matches!(self, Self::Published { .. } | Self::PublishedUnsigned { .. })
    }
}

// ============================================================================
// SECTION: Distributor
// ============================================================================

/// Signs and publishes config changes.
#[derive(Clone)]
pub struct ConfigDistributor {
    /// Transport seam.
    publisher: Arc<dyn ConfigPublisher>,
    /// Optional Ed25519 signing key.
    signing_key: Option<SigningKey>,
    /// Routing and degraded-mode policy.
    config: DistributorConfig,
}

impl ConfigDistributor {
    /// Creates a distributor.
    #[must_use]
    pub fn new(
        publisher: Arc<dyn ConfigPublisher>,
        signing_key: Option<SigningKey>,
        config: DistributorConfig,
    ) -> Self {
        if signing_key.is_none() {
            tracing::warn!("no distribution signing key configured; messages will be unsigned");
        }
        Self {
            publisher,
            signing_key,
            config,
        }
    }

    /// Returns true when a signing key is configured.
    #[must_use]
    pub const fn is_signing(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Returns the topic a service's updates are published to.
    #[must_use]
    pub fn topic(&self, service: &str) -> String {
        topic_for(&self.config.topic_prefix, service)
    }

    /// Publishes the given committed config.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Encode`] when the message cannot be built
    /// and [`DistributionError::Publish`] when the transport rejects it.
    pub fn publish_update(
        &self,
        config: &ServiceConfig,
    ) -> Result<DistributionOutcome, DistributionError> {
        let mut message = DistributionMessage::from_config(config)
            .map_err(|err| DistributionError::Encode(err.to_string()))?;
        let topic = self.topic(&config.service);
        let signed = match &self.signing_key {
            None => {
                tracing::warn!(
                    service = %config.service,
                    version = config.version,
                    "publishing unsigned config update"
                );
                false
            }
            Some(key) => match message.sign(key) {
                Ok(()) => true,
                Err(err) if self.config.allow_unsigned => {
                    tracing::warn!(
                        service = %config.service,
                        error = %err,
                        "signing failed; publishing unsigned"
                    );
                    false
                }
                Err(err) => {
                    tracing::error!(
                        service = %config.service,
                        version = config.version,
                        error = %err,
                        "signing failed; update not published"
                    );
                    return Ok(DistributionOutcome::Skipped {
                        reason: format!("signing failed: {err}"),
                    });
                }
            },
        };
        let payload =
            serde_json::to_vec(&message).map_err(|err| DistributionError::Encode(err.to_string()))?;
        let bus_message = BusMessage {
            topic: topic.clone(),
            payload,
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        self.publisher.publish(&bus_message)?;
        tracing::info!(
            service = %config.service,
            version = config.version,
            epoch = %config.config_epoch,
            topic = %topic,
            signed,
            "config update published"
        );
        if signed {
            Ok(DistributionOutcome::Published {
                topic,
            })
        } else {
            Ok(DistributionOutcome::PublishedUnsigned {
                topic,
            })
        }
    }
}

impl fmt::Debug for ConfigDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDistributor")
            .field("signing", &self.signing_key.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
