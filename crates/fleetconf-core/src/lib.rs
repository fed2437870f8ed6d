// crates/fleetconf-core/src/lib.rs
// ============================================================================
// Module: fleetconf Core Library
// Description: Shared data model, hashing, errors, and crypto for fleetconf.
// Purpose: Single source of truth for types exchanged between fleetconf crates.
// Dependencies: serde, serde_jcs, sha2, hmac, aes-gcm, ed25519-dalek
// ============================================================================

//! ## Overview
//! `fleetconf-core` holds everything the store, cache, distributor and
//! service crates agree on: the configuration data model, RFC 8785 canonical
//! hashing, the error taxonomy surfaced to callers, the stateless crypto
//! primitives, and the trait seams between components.
//!
//! Configurations are opaque key/value maps. The core never interprets
//! values; it only diffs keys for history and hashes canonical encodings.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod crypto;
pub mod error;
pub mod hashing;
pub mod interfaces;
pub mod model;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crypto::CryptoError;
pub use crypto::MasterKey;
pub use error::ConfigStoreError;
pub use error::ErrorKind;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use interfaces::ConfigRebuildTarget;
pub use interfaces::ConfigSnapshotSource;
pub use interfaces::DefaultFieldCatalog;
pub use interfaces::FieldCatalog;
pub use interfaces::StaticFieldCatalog;
pub use model::*;
