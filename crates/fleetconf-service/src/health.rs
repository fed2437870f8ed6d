// crates/fleetconf-service/src/health.rs
// ============================================================================
// Module: Service Health
// Description: Lifecycle state and the health report exposed to operators.
// Purpose: Distinguish a degraded but writable service from a broken one.
// Dependencies: fleetconf-core, serde
// ============================================================================

//! ## Overview
//! Best-effort failures (cache refresh, distribution) move the service to
//! [`HealthState::Degraded`]. Unrecoverable store failures move it to
//! [`HealthState::Unhealthy`]. A later fully successful write returns it to
//! [`HealthState::Ready`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use fleetconf_core::ErrorKind;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Coarse lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Startup has not finished.
    Starting,
    /// Fully operational.
    Ready,
    /// Writes succeed but a best-effort step is failing.
    Degraded,
    /// The store is failing or the service was shut down.
    Unhealthy,
}

/// Health snapshot for monitoring and operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Lifecycle state.
    pub state: HealthState,
    /// Current store epoch.
    pub config_epoch: Option<String>,
    /// Current schema version.
    pub schema_version: Option<i64>,
    /// Number of configured services.
    pub service_count: usize,
    /// Services blocked by schema drift.
    pub blocked_services: Vec<String>,
    /// Whether the LKG cache is maintained.
    pub lkg_enabled: bool,
    /// Whether distribution messages are signed.
    pub signing_enabled: bool,
    /// Kind of the most recent failure.
    pub last_error: Option<ErrorKind>,
    /// Message of the most recent failure.
    pub last_error_message: Option<String>,
}

// ============================================================================
// SECTION: Tracker
// ============================================================================

/// Mutable health state held by the service.
#[derive(Debug, Clone)]
pub(crate) struct HealthTracker {
    /// Current state.
    pub(crate) state: HealthState,
    /// Most recent failure.
    pub(crate) last_error: Option<(ErrorKind, String)>,
}

impl HealthTracker {
    /// Creates a tracker in the starting state.
    pub(crate) const fn starting() -> Self {
        Self {
            state: HealthState::Starting,
            last_error: None,
        }
    }

    /// Completes startup, keeping any degradation seen along the way.
    pub(crate) const fn finish_startup(&mut self) {
        if matches!(self.state, HealthState::Starting) {
            self.state = HealthState::Ready;
        }
    }

    /// Records a best-effort failure.
    pub(crate) fn degrade(&mut self, kind: ErrorKind, message: impl Into<String>) {
        if !matches!(self.state, HealthState::Unhealthy) {
            self.state = HealthState::Degraded;
        }
        self.last_error = Some((kind, message.into()));
    }

    /// Records a failed operation; unrecoverable kinds mark the service unhealthy.
    pub(crate) fn fail(&mut self, kind: ErrorKind, recoverable: bool, message: impl Into<String>) {
        if !recoverable {
            self.state = HealthState::Unhealthy;
        }
        self.last_error = Some((kind, message.into()));
    }

    /// Records a fully successful write.
    pub(crate) const fn recover(&mut self) {
        if !matches!(self.state, HealthState::Starting) {
            self.state = HealthState::Ready;
        }
    }
}
