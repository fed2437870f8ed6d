// crates/fleetconf-service/src/audit.rs
// ============================================================================
// Module: Config Audit Events
// Description: Structured audit events for config manager operations.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: fleetconf-config, fleetconf-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Each mutating operation emits a [`ConfigAuditEvent`] to an [`AuditSink`].
//! Events carry identifiers, versions, and error kinds only. Config values
//! and secrets never appear in audit output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use fleetconf_config::AuditSettings;
use fleetconf_config::AuditSinkKind;
use fleetconf_core::ErrorKind;
use fleetconf_core::time::unix_millis;
use serde::Serialize;

use crate::error::ServiceError;

// ============================================================================
// SECTION: Event
// ============================================================================

/// Operation outcome recorded in an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The operation completed.
    Success,
    /// The operation failed.
    Failure,
}

/// Config manager audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Acting user when known.
    pub user_id: Option<String>,
    /// Affected service.
    pub service: Option<String>,
    /// Resulting config version.
    pub version: Option<i64>,
    /// Resulting config epoch.
    pub config_epoch: Option<String>,
    /// Operation outcome.
    pub outcome: AuditOutcome,
    /// Error kind label on failure.
    pub error_kind: Option<&'static str>,
    /// Short free-form detail such as a profile name.
    pub detail: Option<String>,
}

impl ConfigAuditEvent {
    /// Creates a success event.
    #[must_use]
    pub fn success(event: &'static str, user_id: Option<&str>) -> Self {
        Self {
            event,
            timestamp_ms: unix_millis(),
            user_id: user_id.map(str::to_string),
            service: None,
            version: None,
            config_epoch: None,
            outcome: AuditOutcome::Success,
            error_kind: None,
            detail: None,
        }
    }

    /// Creates a failure event labelled with `kind`.
    #[must_use]
    pub fn failure(event: &'static str, user_id: Option<&str>, kind: ErrorKind) -> Self {
        Self {
            outcome: AuditOutcome::Failure,
            error_kind: Some(kind.as_str()),
            ..Self::success(event, user_id)
        }
    }

    /// Sets the affected service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the resulting version and epoch.
    #[must_use]
    pub fn with_version(mut self, version: i64, config_epoch: impl Into<String>) -> Self {
        self.version = Some(version);
        self.config_epoch = Some(config_epoch.into());
        self
    }

    /// Sets the resulting epoch without a version.
    #[must_use]
    pub fn with_epoch(mut self, config_epoch: impl Into<String>) -> Self {
        self.config_epoch = Some(config_epoch.into());
        self
    }

    /// Sets the detail field.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for config manager events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &ConfigAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &ConfigAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &ConfigAuditEvent) {}
}

/// Builds the sink selected by `[audit]` settings.
///
/// # Errors
///
/// Returns [`ServiceError::Audit`] when the file sink cannot be opened.
pub fn audit_sink_from_settings(
    settings: &AuditSettings,
) -> Result<Arc<dyn AuditSink>, ServiceError> {
    match (settings.sink, &settings.path) {
        (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
        (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkKind::File, Some(path)) => FileAuditSink::new(path)
            .map(|sink| Arc::new(sink) as Arc<dyn AuditSink>)
            .map_err(|err| ServiceError::Audit(err.to_string())),
        (AuditSinkKind::File, None) => {
            Err(ServiceError::Audit("file audit sink requires a path".to_string()))
        }
    }
}
