// crates/fleetconf-store-sqlite/src/lib.rs
// ============================================================================
// Module: fleetconf SQLite Store
// Description: Durable configuration store backend using SQLite WAL.
// Purpose: Persist service configs, history, secrets, profiles, and audit rows.
// Dependencies: fleetconf-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteConfigStore`], the single owner of every
//! fleetconf table. Writes use optimistic locking on a per-service version
//! counter and append a per-key history ledger in the same transaction.
//! Rows carry a generation epoch that changes only when the store is rebuilt
//! from a last-known-good snapshot.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod profiles;
mod queries;
mod schema;
mod secrets;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::REDACTED_VALUE;
pub use store::SqliteConfigStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
