// crates/fleetconf-core/src/crypto.rs
// ============================================================================
// Module: fleetconf Crypto Primitives
// Description: AES-256-GCM secrets, Ed25519 signatures, HMAC-SHA256 tags.
// Purpose: Stateless crypto used by the store, LKG cache, and distributor.
// Dependencies: aes-gcm, ed25519-dalek, hmac, sha2, base64, hex, rand, zeroize
// ============================================================================

//! ## Overview
//! Stateless cryptographic helpers. Nothing here reads keys from disk or the
//! environment; callers hand in key material that the bootstrap layer already
//! resolved.
//!
//! - Secret values are sealed with AES-256-GCM under a [`MasterKey`]. The
//!   encoded form is base64 of `nonce || ciphertext`. Associated data binds a
//!   ciphertext to the row it was written for.
//! - Distribution messages are signed with Ed25519 and carried as hex.
//! - The LKG cache is tagged with HMAC-SHA256 and verified in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::Payload;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::pkcs8::DecodePublicKey;
use hmac::Hmac;
use hmac::Mac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// AES-256 key length in bytes.
pub const MASTER_KEY_BYTES: usize = 32;
/// AES-GCM nonce length in bytes.
pub const NONCE_BYTES: usize = 12;
/// Ed25519 key length in bytes.
pub const ED25519_KEY_BYTES: usize = 32;
/// Algorithm label written next to HMAC-SHA256 tags.
pub const HMAC_SHA256_ALGORITHM: &str = "hmac-sha256";
/// Maximum accepted key identifier length.
const MAX_KEY_ID_LENGTH: usize = 128;
/// PEM armor prefix.
const PEM_PREFIX: &str = "-----BEGIN";

/// HMAC-SHA256 instance.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cryptographic failures.
///
/// # Invariants
/// - Messages never include key bytes or plaintext.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material could not be parsed or has the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
    /// Decryption or authentication failed.
    #[error("decryption failed: {0}")]
    Decryption(String),
    /// Signature creation or verification failed.
    #[error("signature failure: {0}")]
    Signature(String),
}

// ============================================================================
// SECTION: Master Key
// ============================================================================

/// AES-256 master key tagged with the identifier used for rotation.
#[derive(Clone)]
pub struct MasterKey {
    /// Key identifier persisted next to each ciphertext.
    key_id: String,
    /// Raw key bytes, wiped on drop.
    key: Zeroizing<[u8; MASTER_KEY_BYTES]>,
}

impl MasterKey {
    /// Creates a master key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] when the key id is empty or too long.
    pub fn new(key_id: impl Into<String>, key: [u8; MASTER_KEY_BYTES]) -> Result<Self, CryptoError> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self {
            key_id,
            key: Zeroizing::new(key),
        })
    }

    /// Parses a master key from resolved material: 32 raw bytes, base64, or hex.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] when the material is not a 256-bit key.
    pub fn from_material(key_id: impl Into<String>, material: &[u8]) -> Result<Self, CryptoError> {
        let bytes = decode_key_material(material, MASTER_KEY_BYTES, "master key")?;
        let mut key = [0_u8; MASTER_KEY_BYTES];
        key.copy_from_slice(&bytes);
        let master = Self::new(key_id, key);
        key.fill(0);
        master
    }

    /// Generates a fresh random master key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] when the key id is invalid.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, CryptoError> {
        let mut key = [0_u8; MASTER_KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        let master = Self::new(key_id, key);
        key.fill(0);
        master
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Builds the AES-GCM cipher for this key.
    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|_| CryptoError::InvalidKey("master key length rejected".to_string()))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

/// Validates a key identifier.
fn validate_key_id(key_id: &str) -> Result<(), CryptoError> {
    if key_id.trim().is_empty() {
        return Err(CryptoError::InvalidKey("key id must be non-empty".to_string()));
    }
    if key_id.len() > MAX_KEY_ID_LENGTH {
        return Err(CryptoError::InvalidKey("key id exceeds max length".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Secret Encryption
// ============================================================================

/// Encrypts a secret value; `aad` binds the ciphertext to its storage row.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] when the cipher rejects the input.
pub fn encrypt_secret(
    master: &MasterKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<String, CryptoError> {
    let cipher = master.cipher()?;
    let mut nonce_bytes = [0_u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("aes-gcm seal failed".to_string()))?;
    let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Decrypts a value produced by [`encrypt_secret`].
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on malformed input, a wrong key, a
/// mismatched `aad`, or tampered ciphertext.
pub fn decrypt_secret(
    master: &MasterKey,
    aad: &[u8],
    encoded: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let sealed = BASE64
        .decode(encoded.trim())
        .map_err(|_| CryptoError::Decryption("ciphertext is not valid base64".to_string()))?;
    if sealed.len() <= NONCE_BYTES {
        return Err(CryptoError::Decryption("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_BYTES);
    let cipher = master.cipher()?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption("aes-gcm open failed".to_string()))?;
    Ok(Zeroizing::new(plaintext))
}

// ============================================================================
// SECTION: Ed25519
// ============================================================================

/// Parses an Ed25519 signing key: 32 raw bytes, base64, hex, or PKCS#8 PEM.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the material cannot be decoded.
pub fn parse_signing_key(material: &[u8]) -> Result<SigningKey, CryptoError> {
    if let Some(pem) = pem_text(material) {
        return SigningKey::from_pkcs8_pem(pem)
            .map_err(|_| CryptoError::InvalidKey("invalid ed25519 private key pem".to_string()));
    }
    let bytes = decode_key_material(material, ED25519_KEY_BYTES, "ed25519 private key")?;
    let key: [u8; ED25519_KEY_BYTES] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("invalid ed25519 private key".to_string()))?;
    Ok(SigningKey::from_bytes(&key))
}

/// Parses an Ed25519 public key: 32 raw bytes, base64, hex, or SPKI PEM.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the material cannot be decoded.
pub fn parse_verifying_key(material: &[u8]) -> Result<VerifyingKey, CryptoError> {
    if let Some(pem) = pem_text(material) {
        return VerifyingKey::from_public_key_pem(pem)
            .map_err(|_| CryptoError::InvalidKey("invalid ed25519 public key pem".to_string()));
    }
    let bytes = decode_key_material(material, ED25519_KEY_BYTES, "ed25519 public key")?;
    let key: [u8; ED25519_KEY_BYTES] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("invalid ed25519 public key".to_string()))?;
    VerifyingKey::from_bytes(&key)
        .map_err(|_| CryptoError::InvalidKey("invalid ed25519 public key".to_string()))
}

/// Signs a message and returns the hex-encoded signature.
#[must_use]
pub fn sign_hex(key: &SigningKey, message: &[u8]) -> String {
    hex::encode(key.sign(message).to_bytes())
}

/// Verifies a hex-encoded Ed25519 signature.
///
/// # Errors
///
/// Returns [`CryptoError::Signature`] when decoding or verification fails.
pub fn verify_hex(
    key: &VerifyingKey,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), CryptoError> {
    let bytes = hex::decode(signature_hex.trim())
        .map_err(|_| CryptoError::Signature("signature is not valid hex".to_string()))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|_| CryptoError::Signature("invalid signature bytes".to_string()))?;
    key.verify_strict(message, &signature)
        .map_err(|_| CryptoError::Signature("signature verification failed".to_string()))
}

// ============================================================================
// SECTION: HMAC-SHA256
// ============================================================================

/// Computes a hex-encoded HMAC-SHA256 tag.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the key is empty.
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidKey("hmac key must be non-empty".to_string()));
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKey("hmac key rejected".to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex-encoded HMAC-SHA256 tag in constant time.
#[must_use]
pub fn verify_hmac_sha256_hex(key: &[u8], message: &[u8], tag_hex: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(tag_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the trimmed PEM text when the material is PEM armored.
fn pem_text(material: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(material).ok()?.trim();
    text.starts_with(PEM_PREFIX).then_some(text)
}

/// Decodes raw, base64, or hex key material into exactly `expected` bytes.
fn decode_key_material(
    material: &[u8],
    expected: usize,
    label: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if material.len() == expected {
        return Ok(Zeroizing::new(material.to_vec()));
    }
    let text = std::str::from_utf8(material)
        .map_err(|_| CryptoError::InvalidKey(format!("{label} must be {expected} bytes or text")))?
        .trim();
    let decoded = if text.len() == expected * 2 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(text).map_err(|_| CryptoError::InvalidKey(format!("invalid hex {label}")))?
    } else {
        BASE64.decode(text).map_err(|_| CryptoError::InvalidKey(format!("invalid base64 {label}")))?
    };
    let decoded = Zeroizing::new(decoded);
    if decoded.len() != expected {
        return Err(CryptoError::InvalidKey(format!("{label} must decode to {expected} bytes")));
    }
    Ok(decoded)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
