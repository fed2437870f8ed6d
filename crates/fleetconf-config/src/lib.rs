// crates/fleetconf-config/src/lib.rs
// ============================================================================
// Module: fleetconf Config Library
// Description: Settings model for the config manager service.
// Purpose: Load and validate `fleetconf.toml`.
// Dependencies: fleetconf-store-sqlite, fleetconf-lkg, fleetconf-distributor, toml
// ============================================================================

//! ## Overview
//! [`FleetconfSettings`] is the single settings document for the service.
//! Key material is not part of it; callers resolve keys and pass them in.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod settings;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use settings::AuditSettings;
pub use settings::AuditSinkKind;
pub use settings::DistributionSettings;
pub use settings::FleetconfSettings;
pub use settings::LkgSettings;
pub use settings::SettingsError;
pub use settings::StoreSettings;
