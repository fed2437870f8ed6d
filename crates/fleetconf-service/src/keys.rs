// crates/fleetconf-service/src/keys.rs
// ============================================================================
// Module: Key Material
// Description: Resolved keys handed to the config manager at startup.
// Purpose: Keep key sourcing outside the core and key bytes out of logs.
// Dependencies: ed25519-dalek, fleetconf-core, zeroize
// ============================================================================

//! ## Overview
//! The embedding process resolves keys from files, environment, or a KMS and
//! passes the bytes in through [`KeyMaterial`]. Nothing in this workspace
//! reads key sources itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ed25519_dalek::SigningKey;
use fleetconf_core::CryptoError;
use fleetconf_core::MasterKey;
use fleetconf_core::crypto::parse_signing_key;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Key Material
// ============================================================================

/// Keys used by the config manager.
pub struct KeyMaterial {
    /// AES-256-GCM key for encrypted secrets.
    pub master_key: Option<MasterKey>,
    /// Ed25519 key for signing distribution messages.
    pub signing_key: Option<SigningKey>,
    /// HMAC key for the LKG cache.
    pub lkg_hmac_key: Zeroizing<Vec<u8>>,
}

impl KeyMaterial {
    /// Creates key material with only the LKG HMAC key.
    #[must_use]
    pub fn new(lkg_hmac_key: impl Into<Vec<u8>>) -> Self {
        Self {
            master_key: None,
            signing_key: None,
            lkg_hmac_key: Zeroizing::new(lkg_hmac_key.into()),
        }
    }

    /// Adds the secrets master key.
    #[must_use]
    pub fn with_master_key(mut self, master_key: MasterKey) -> Self {
        self.master_key = Some(master_key);
        self
    }

    /// Adds the distribution signing key.
    #[must_use]
    pub fn with_signing_key(mut self, signing_key: SigningKey) -> Self {
        self.signing_key = Some(signing_key);
        self
    }

    /// Parses and adds a signing key from raw, hex, base64, or PEM material.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] when the material cannot be parsed.
    pub fn with_signing_key_material(self, material: &[u8]) -> Result<Self, CryptoError> {
        Ok(self.with_signing_key(parse_signing_key(material)?))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("master_key", &self.master_key.as_ref().map(MasterKey::key_id))
            .field("signing_key", &self.signing_key.is_some())
            .field("lkg_hmac_key", &"<redacted>")
            .finish()
    }
}
