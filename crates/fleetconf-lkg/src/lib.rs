// crates/fleetconf-lkg/src/lib.rs
// ============================================================================
// Module: fleetconf LKG Cache
// Description: HMAC-signed last-known-good configuration snapshots.
// Purpose: Keep workers running on trusted config while the service is down.
// Dependencies: fleetconf-core, tempfile
// ============================================================================

//! ## Overview
//! [`LkgCacheManager`] writes a signed snapshot of every service config after
//! each accepted write and verifies it on read. Tampered or malformed caches
//! are never served. Rebuilding the live store from the cache is an explicit
//! operator opt-in.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::LkgCacheConfig;
pub use cache::LkgCacheManager;
pub use cache::LkgError;
pub use cache::LkgSnapshot;
pub use cache::MAX_LKG_FILE_BYTES;
