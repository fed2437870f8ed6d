// crates/fleetconf-lkg/src/cache.rs
// ============================================================================
// Module: LKG Cache Manager
// Description: Signed on-disk snapshot of every service configuration.
// Purpose: Serve trusted configs while the live store is unavailable.
// Dependencies: fleetconf-core, serde, serde_json, tempfile, tracing, zeroize
// ============================================================================

//! ## Overview
//! The cache file holds the full `{service: config}` map together with the
//! epoch it was taken from and an HMAC-SHA256 tag over the RFC 8785 form of
//! `{payload, config_epoch, generated_at}`.
//!
//! Writes go to a temporary sibling that is fsynced and then renamed over the
//! cache path, so readers only ever observe a complete file. Reads fail
//! closed: any parse error, unknown algorithm, or tag mismatch yields no data.
//! Restoring the live store from the cache requires `allow_auto_rebuild`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use fleetconf_core::ConfigMap;
use fleetconf_core::ConfigRebuildTarget;
use fleetconf_core::ConfigSnapshotSource;
use fleetconf_core::ConfigStoreError;
use fleetconf_core::CryptoError;
use fleetconf_core::StoreSnapshot;
use fleetconf_core::crypto::HMAC_SHA256_ALGORITHM;
use fleetconf_core::crypto::hmac_sha256_hex;
use fleetconf_core::crypto::verify_hmac_sha256_hex;
use fleetconf_core::hashing::canonical_json_bytes;
use fleetconf_core::time::rfc3339_now;
use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum cache file size accepted on read.
pub const MAX_LKG_FILE_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// LKG cache location and rebuild policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LkgCacheConfig {
    /// Cache file path.
    pub path: PathBuf,
    /// Whether the live store may be rebuilt from the cache.
    #[serde(default)]
    pub allow_auto_rebuild: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// LKG cache errors.
#[derive(Debug, Error)]
pub enum LkgError {
    /// The cache file does not exist.
    #[error("lkg cache file missing")]
    Missing,
    /// Filesystem failure.
    #[error("lkg cache io error: {0}")]
    Io(String),
    /// The cache file is not a well-formed snapshot.
    #[error("lkg cache parse error: {0}")]
    Parse(String),
    /// The cache names an algorithm this build does not verify.
    #[error("lkg cache uses unsupported algorithm: {0}")]
    UnknownAlgorithm(String),
    /// The HMAC tag does not match the content.
    #[error("lkg cache signature mismatch")]
    SignatureMismatch,
    /// The store has no configuration to snapshot.
    #[error("config store is empty; nothing to snapshot")]
    EmptyStore,
    /// Rebuild was requested without operator opt-in.
    #[error("lkg rebuild not allowed; set allow_auto_rebuild to enable")]
    RebuildNotAllowed,
    /// Key or tag computation failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Verified cache content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LkgSnapshot {
    /// Service to config map.
    pub payload: BTreeMap<String, ConfigMap>,
    /// Epoch of the store the snapshot was taken from.
    pub config_epoch: String,
    /// RFC 3339 generation time.
    pub generated_at: String,
}

/// Fields covered by the HMAC tag.
#[derive(Serialize)]
struct SignedContent<'a> {
    /// Service to config map.
    payload: &'a BTreeMap<String, ConfigMap>,
    /// Source epoch.
    config_epoch: &'a str,
    /// Generation time.
    generated_at: &'a str,
}

impl<'a> From<&'a LkgSnapshot> for SignedContent<'a> {
    fn from(snapshot: &'a LkgSnapshot) -> Self {
        Self {
            payload: &snapshot.payload,
            config_epoch: &snapshot.config_epoch,
            generated_at: &snapshot.generated_at,
        }
    }
}

/// On-disk cache document.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LkgFile {
    /// Service to config map.
    payload: BTreeMap<String, ConfigMap>,
    /// Source epoch.
    config_epoch: String,
    /// Generation time.
    generated_at: String,
    /// Hex HMAC tag.
    signature: String,
    /// Tag algorithm label.
    algorithm: String,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Builds, verifies, and restores the LKG cache.
pub struct LkgCacheManager {
    /// Cache file path.
    path: PathBuf,
    /// HMAC key, wiped on drop.
    hmac_key: Zeroizing<Vec<u8>>,
    /// Whether [`LkgCacheManager::rebuild_store`] is permitted.
    allow_auto_rebuild: bool,
}

impl LkgCacheManager {
    /// Creates a manager for the configured cache.
    ///
    /// # Errors
    ///
    /// Returns [`LkgError::Crypto`] when the HMAC key is empty.
    pub fn new(config: &LkgCacheConfig, hmac_key: Zeroizing<Vec<u8>>) -> Result<Self, LkgError> {
        if hmac_key.is_empty() {
            return Err(CryptoError::InvalidKey("lkg hmac key must be non-empty".to_string()).into());
        }
        Ok(Self {
            path: config.path.clone(),
            hmac_key,
            allow_auto_rebuild: config.allow_auto_rebuild,
        })
    }

    /// Creates a read-only manager for downstream workers. Rebuild is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LkgError::Crypto`] when the HMAC key is empty.
    pub fn open_reader(
        path: impl Into<PathBuf>,
        hmac_key: Zeroizing<Vec<u8>>,
    ) -> Result<Self, LkgError> {
        Self::new(
            &LkgCacheConfig {
                path: path.into(),
                allow_auto_rebuild: false,
            },
            hmac_key,
        )
    }

    /// Returns the cache path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether rebuilding the store from the cache is permitted.
    #[must_use]
    pub const fn allows_auto_rebuild(&self) -> bool {
        self.allow_auto_rebuild
    }

    /// Snapshots every config from `source`, signs it, and replaces the file.
    ///
    /// # Errors
    ///
    /// Returns [`LkgError::EmptyStore`] when there is nothing to snapshot,
    /// [`LkgError::Store`] when reading fails, or [`LkgError::Io`] when the
    /// file cannot be written.
    pub fn atomic_update_from_db(
        &self,
        source: &impl ConfigSnapshotSource,
    ) -> Result<LkgSnapshot, LkgError> {
        let Some(StoreSnapshot {
            configs,
            config_epoch,
        }) = source.consistent_snapshot()?
        else {
            return Err(LkgError::EmptyStore);
        };
        let snapshot = LkgSnapshot {
            payload: configs.into_iter().map(|config| (config.service, config.config)).collect(),
            config_epoch,
            generated_at: rfc3339_now(),
        };
        let signature = self.sign(&snapshot)?;
        let file = LkgFile {
            payload: snapshot.payload.clone(),
            config_epoch: snapshot.config_epoch.clone(),
            generated_at: snapshot.generated_at.clone(),
            signature,
            algorithm: HMAC_SHA256_ALGORITHM.to_string(),
        };
        let bytes = serde_json::to_vec(&file).map_err(|err| LkgError::Parse(err.to_string()))?;
        write_atomic(&self.path, &bytes)?;
        tracing::info!(
            path = %self.path.display(),
            epoch = %snapshot.config_epoch,
            services = snapshot.payload.len(),
            "lkg cache refreshed"
        );
        Ok(snapshot)
    }

    /// Returns the verified snapshot, or `None` when it cannot be trusted.
    #[must_use]
    pub fn read(&self) -> Option<LkgSnapshot> {
        match self.read_verified() {
            Ok(snapshot) => Some(snapshot),
            Err(LkgError::Missing) => {
                tracing::debug!(path = %self.path.display(), "lkg cache not present");
                None
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "lkg cache rejected");
                None
            }
        }
    }

    /// Reads and verifies the cache, reporting why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`LkgError`] describing the first failed check.
    pub fn read_verified(&self) -> Result<LkgSnapshot, LkgError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(LkgError::Missing),
            Err(err) => return Err(LkgError::Io(err.to_string())),
        };
        if bytes.len() > MAX_LKG_FILE_BYTES {
            return Err(LkgError::Parse("cache file exceeds size limit".to_string()));
        }
        let file: LkgFile =
            serde_json::from_slice(&bytes).map_err(|err| LkgError::Parse(err.to_string()))?;
        if file.algorithm != HMAC_SHA256_ALGORITHM {
            return Err(LkgError::UnknownAlgorithm(file.algorithm));
        }
        let snapshot = LkgSnapshot {
            payload: file.payload,
            config_epoch: file.config_epoch,
            generated_at: file.generated_at,
        };
        let content = canonical_json_bytes(&SignedContent::from(&snapshot))
            .map_err(|err| LkgError::Parse(err.to_string()))?;
        if !verify_hmac_sha256_hex(&self.hmac_key, &content, &file.signature) {
            return Err(LkgError::SignatureMismatch);
        }
        Ok(snapshot)
    }

    /// Replaces the live store with the verified cache. Returns the new epoch.
    ///
    /// # Errors
    ///
    /// Returns [`LkgError::RebuildNotAllowed`] without operator opt-in, any
    /// verification error from [`LkgCacheManager::read_verified`], or
    /// [`LkgError::Store`] when the rebuild fails.
    pub fn rebuild_store(
        &self,
        target: &impl ConfigRebuildTarget,
        rebuilt_by: Option<&str>,
    ) -> Result<String, LkgError> {
        if !self.allow_auto_rebuild {
            return Err(LkgError::RebuildNotAllowed);
        }
        let snapshot = self.read_verified()?;
        let epoch = target.rebuild_from_snapshot(&snapshot.payload, rebuilt_by)?;
        tracing::warn!(
            previous_epoch = %snapshot.config_epoch,
            epoch = %epoch,
            services = snapshot.payload.len(),
            "config store rebuilt from lkg cache"
        );
        Ok(epoch)
    }

    /// Computes the HMAC tag for a snapshot.
    fn sign(&self, snapshot: &LkgSnapshot) -> Result<String, LkgError> {
        let content = canonical_json_bytes(&SignedContent::from(snapshot))
            .map_err(|err| LkgError::Parse(err.to_string()))?;
        Ok(hmac_sha256_hex(&self.hmac_key, &content)?)
    }
}

impl fmt::Debug for LkgCacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LkgCacheManager")
            .field("path", &self.path)
            .field("allow_auto_rebuild", &self.allow_auto_rebuild)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes `bytes` to a synced temporary sibling and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LkgError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| LkgError::Io(err.to_string()))?;
    let mut temp = NamedTempFile::new_in(parent).map_err(|err| LkgError::Io(err.to_string()))?;
    temp.write_all(bytes).map_err(|err| LkgError::Io(err.to_string()))?;
    temp.as_file().sync_all().map_err(|err| LkgError::Io(err.to_string()))?;
    temp.persist(path).map_err(|err| LkgError::Io(err.error.to_string()))?;
    Ok(())
}
