// crates/fleetconf-service/src/lib.rs
// ============================================================================
// Module: fleetconf Service Library
// Description: Config manager service wiring the store, cache, and distributor.
// Purpose: Provide one explicitly constructed entry point for API layers.
// Dependencies: fleetconf-config, fleetconf-core, fleetconf-distributor,
//               fleetconf-lkg, fleetconf-store-sqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ConfigManagerService`] is constructed once from [`FleetconfSettings`],
//! [`KeyMaterial`], a [`ConfigPublisher`], and a field catalog. There is no
//! process-wide instance; callers pass the service (or an
//! [`AsyncConfigManager`]) to whatever serves requests.
//!
//! [`FleetconfSettings`]: fleetconf_config::FleetconfSettings
//! [`ConfigPublisher`]: fleetconf_distributor::ConfigPublisher

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod async_api;
pub mod audit;
pub mod error;
pub mod health;
pub mod keys;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use async_api::AsyncConfigManager;
pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::ConfigAuditEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::audit_sink_from_settings;
pub use error::ServiceError;
pub use health::HealthReport;
pub use health::HealthState;
pub use keys::KeyMaterial;
pub use service::ConfigManagerService;
pub use service::LkgRefresh;
pub use service::SYSTEM_USER;
pub use service::UpdateConfigRequest;
pub use service::UpdateOutcome;
