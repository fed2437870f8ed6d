// crates/fleetconf-service/src/error.rs
// ============================================================================
// Module: Service Errors
// Description: Error type for config manager operations.
// Purpose: Wrap component failures and expose one stable error kind.
// Dependencies: fleetconf-core, fleetconf-lkg, fleetconf-config, thiserror
// ============================================================================

//! ## Overview
//! [`ServiceError`] wraps store, cache, settings, and crypto failures.
//! [`ServiceError::kind`] maps every variant onto the shared [`ErrorKind`]
//! labels that API layers translate into client responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fleetconf_config::SettingsError;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::CryptoError;
use fleetconf_core::ErrorKind;
use fleetconf_lkg::LkgError;
use thiserror::Error;

// ============================================================================
// SECTION: Service Error
// ============================================================================

/// Errors returned by [`crate::ConfigManagerService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Config store failure.
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
    /// LKG cache failure.
    #[error(transparent)]
    Lkg(#[from] LkgError),
    /// Settings failure.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// Key handling failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Audit sink could not be opened.
    #[error("audit sink unavailable: {0}")]
    Audit(String),
    /// Startup preconditions not met.
    #[error("startup failed: {0}")]
    Startup(String),
    /// The service was shut down.
    #[error("config manager is shut down")]
    Closed,
    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl ServiceError {
    /// Returns the stable error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err)
            | Self::Lkg(LkgError::Store(err)) => err.kind(),
            Self::Lkg(
                LkgError::Crypto(_) | LkgError::SignatureMismatch | LkgError::UnknownAlgorithm(_),
            )
            | Self::Crypto(_) => ErrorKind::CryptoFailure,
            Self::Lkg(LkgError::Missing) => ErrorKind::NotFound,
            Self::Lkg(LkgError::EmptyStore | LkgError::RebuildNotAllowed)
            | Self::Settings(_)
            | Self::Startup(_) => ErrorKind::Invalid,
            Self::Lkg(LkgError::Io(_) | LkgError::Parse(_))
            | Self::Audit(_)
            | Self::Closed
            | Self::Join(_) => ErrorKind::StorageFailure,
        }
    }

    /// Returns true when the caller can retry or correct the request.
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
