// crates/fleetconf-core/src/error.rs
// ============================================================================
// Module: fleetconf Error Taxonomy
// Description: Typed failures surfaced by the configuration store.
// Purpose: Give callers a stable, machine-readable error kind per failure.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`ConfigStoreError`] is the one error type every store operation returns.
//! Version conflicts and missing entities are recoverable; storage and crypto
//! failures are fatal for the operation and should mark the caller
//! unhealthy. Messages never embed configuration values or secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::hashing::HashError;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Stable machine-readable error classification.
///
/// # Invariants
/// - Labels are stable; API layers map them to client-visible responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Optimistic-lock version mismatch.
    VersionConflict,
    /// Unknown service, profile or secret.
    NotFound,
    /// Stored schema fingerprint no longer matches the running schemas.
    SchemaMismatch,
    /// Database or filesystem failure.
    StorageFailure,
    /// Encryption, signing or verification failure.
    CryptoFailure,
    /// Caller supplied invalid input.
    Invalid,
    /// A committed change could not be handed to the message bus.
    DeliveryFailure,
}

impl ErrorKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VersionConflict => "version_conflict",
            Self::NotFound => "not_found",
            Self::SchemaMismatch => "schema_mismatch",
            Self::StorageFailure => "storage_failure",
            Self::CryptoFailure => "crypto_failure",
            Self::Invalid => "invalid",
            Self::DeliveryFailure => "delivery_failure",
        }
    }
}

// ============================================================================
// SECTION: Store Error
// ============================================================================

/// Errors returned by configuration store operations.
///
/// # Invariants
/// - `VersionConflict` is returned only when nothing was persisted.
/// - Error messages avoid embedding config values or secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigStoreError {
    /// Expected version did not match the stored version.
    #[error("version conflict for {service}: expected {expected}, current {current}")]
    VersionConflict {
        /// Service whose write was rejected.
        service: String,
        /// Version the caller expected.
        expected: i64,
        /// Version currently stored (0 when the service does not exist).
        current: i64,
    },
    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Schema fingerprint drift blocks the operation.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Storage engine or I/O failure.
    #[error("storage failure: {0}")]
    Storage(String),
    /// Cryptographic failure.
    #[error("crypto failure: {0}")]
    Crypto(String),
    /// Invalid caller input.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ConfigStoreError {
    /// Returns the stable error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::VersionConflict {
                ..
            } => ErrorKind::VersionConflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::Crypto(_) => ErrorKind::CryptoFailure,
            Self::Invalid(_) => ErrorKind::Invalid,
        }
    }

    /// Returns true when the caller can recover without restarting.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::VersionConflict
                | ErrorKind::NotFound
                | ErrorKind::SchemaMismatch
                | ErrorKind::Invalid
        )
    }
}

impl From<CryptoError> for ConfigStoreError {
    fn from(error: CryptoError) -> Self {
        Self::Crypto(error.to_string())
    }
}

impl From<HashError> for ConfigStoreError {
    fn from(error: HashError) -> Self {
        Self::Invalid(error.to_string())
    }
}
