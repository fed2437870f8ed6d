// crates/fleetconf-distributor/src/verifier.rs
// ============================================================================
// Module: Consumer Verifier
// Description: Authenticates received config messages and decides whether to apply them.
// Purpose: Give workers one fail-closed path from bus payload to applied config.
// Dependencies: ed25519-dalek, fleetconf-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Workers decode a bus payload with [`ConfigVerifier::decode`], which checks
//! the checksum and, when a public key is configured, the signature. They
//! then call [`classify_update`] against their local state.
//! Invariants:
//! - A message whose checksum does not match its config is never returned.
//! - With `require_signature`, unsigned messages are rejected.
//! - A message from a different epoch always requests a resync.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ed25519_dalek::VerifyingKey;
use fleetconf_core::ServiceConfig;
use fleetconf_core::crypto::verify_hex;
use thiserror::Error;

use crate::message::DistributionMessage;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a received message is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Payload is not a distribution message.
    #[error("malformed config message: {0}")]
    Malformed(String),
    /// Carried checksum does not match the config.
    #[error("checksum mismatch for {service}")]
    ChecksumMismatch {
        /// Service named in the message.
        service: String,
    },
    /// The message is unsigned but a signature is required.
    #[error("config message for {service} is unsigned")]
    MissingSignature {
        /// Service named in the message.
        service: String,
    },
    /// The signature did not verify.
    #[error("invalid signature for {service}: {reason}")]
    InvalidSignature {
        /// Service named in the message.
        service: String,
        /// Verification failure detail.
        reason: String,
    },
    /// Signatures are required but no public key was supplied.
    #[error("signature required but no public key configured")]
    NoPublicKey,
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// How a message's signature was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Signature present and valid.
    Verified,
    /// No signature present.
    Unsigned,
    /// Signature present but no public key to check it with.
    Unchecked,
}

/// Checks integrity and authenticity of received messages.
#[derive(Debug, Clone)]
pub struct ConfigVerifier {
    /// Distributor public key.
    public_key: Option<VerifyingKey>,
    /// Reject unsigned messages.
    require_signature: bool,
}

impl ConfigVerifier {
    /// Creates a verifier.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::NoPublicKey`] when signatures are required
    /// without a key to check them.
    pub fn new(
        public_key: Option<VerifyingKey>,
        require_signature: bool,
    ) -> Result<Self, VerificationError> {
        if require_signature && public_key.is_none() {
            return Err(VerificationError::NoPublicKey);
        }
        Ok(Self {
            public_key,
            require_signature,
        })
    }

    /// Decodes and verifies a raw bus payload.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the payload fails any check.
    pub fn decode(&self, payload: &[u8]) -> Result<DistributionMessage, VerificationError> {
        let message: DistributionMessage = serde_json::from_slice(payload)
            .map_err(|err| VerificationError::Malformed(err.to_string()))?;
        self.verify(&message)?;
        Ok(message)
    }

    /// Verifies an already-decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the checksum or signature fails.
    pub fn verify(&self, message: &DistributionMessage) -> Result<SignatureStatus, VerificationError> {
        let computed = message
            .computed_checksum()
            .map_err(|err| VerificationError::Malformed(err.to_string()))?;
        if computed != message.checksum {
            return Err(VerificationError::ChecksumMismatch {
                service: message.service.clone(),
            });
        }
        let Some(signature) = message.signature.as_deref() else {
            if self.require_signature {
                return Err(VerificationError::MissingSignature {
                    service: message.service.clone(),
                });
            }
            return Ok(SignatureStatus::Unsigned);
        };
        let Some(key) = &self.public_key else {
            return Ok(SignatureStatus::Unchecked);
        };
        let bytes =
            message.signing_bytes().map_err(|err| VerificationError::Malformed(err.to_string()))?;
        verify_hex(key, &bytes, signature).map_err(|err| VerificationError::InvalidSignature {
            service: message.service.clone(),
            reason: err.to_string(),
        })?;
        Ok(SignatureStatus::Verified)
    }
}

// ============================================================================
// SECTION: Update Classification
// ============================================================================

/// Version and epoch a worker currently runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfigState {
    /// Applied version.
    pub version: i64,
    /// Epoch of the applied version.
    pub config_epoch: String,
}

impl From<&ServiceConfig> for LocalConfigState {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            version: config.version,
            config_epoch: config.config_epoch.clone(),
        }
    }
}

/// What a worker should do with a verified message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Replace the local config with the message's config.
    Apply,
    /// Duplicate or stale delivery.
    Ignore,
    /// The store was rebuilt; fetch authoritative state before applying.
    Resync,
}

/// Classifies a verified message against the worker's local state.
///
/// Messages carry the full config, so a version gap within one epoch is
/// applied directly.
#[must_use]
pub fn classify_update(
    local: Option<&LocalConfigState>,
    message: &DistributionMessage,
) -> UpdateDecision {
    let Some(local) = local else {
        return UpdateDecision::Apply;
    };
    if local.config_epoch != message.config_epoch {
        return UpdateDecision::Resync;
    }
    if message.version > local.version { UpdateDecision::Apply } else { UpdateDecision::Ignore }
}
