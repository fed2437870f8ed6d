// crates/fleetconf-service/src/async_api.rs
// ============================================================================
// Module: Async Config Manager
// Description: Tokio facade over the blocking config manager.
// Purpose: Keep SQLite and file I/O off async worker threads.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`AsyncConfigManager`] shares one [`ConfigManagerService`] and runs each
//! call on the blocking pool. Requests are serialized by the store's
//! connection mutex, so concurrent callers observe the same ordering as
//! blocking callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use fleetconf_core::ServiceConfig;
use serde_json::Value;

use crate::error::ServiceError;
use crate::health::HealthReport;
use crate::service::ConfigManagerService;
use crate::service::UpdateConfigRequest;
use crate::service::UpdateOutcome;

// ============================================================================
// SECTION: Facade
// ============================================================================

/// Async handle to a shared [`ConfigManagerService`].
#[derive(Clone)]
pub struct AsyncConfigManager {
    /// Shared service.
    inner: Arc<ConfigManagerService>,
}

impl AsyncConfigManager {
    /// Wraps a started service.
    #[must_use]
    pub fn new(service: ConfigManagerService) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Returns the shared blocking service.
    #[must_use]
    pub fn service(&self) -> &ConfigManagerService {
        &self.inner
    }

    /// Writes a config on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the write is rejected or the task fails.
    pub async fn update_config(
        &self,
        request: UpdateConfigRequest,
    ) -> Result<UpdateOutcome, ServiceError> {
        self.run_blocking("update_config", move |service| service.update_config(&request)).await
    }

    /// Activates a saved profile on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when activation fails or the task fails.
    pub async fn activate_profile(
        &self,
        name: String,
        user_id: Option<String>,
    ) -> Result<BTreeMap<String, i64>, ServiceError> {
        self.run_blocking("activate_profile", move |service| {
            service.activate_profile(&name, user_id.as_deref())
        })
        .await
    }

    /// Reads a service config on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the read fails or the task fails.
    pub async fn get_config(
        &self,
        service: String,
        user_id: Option<String>,
    ) -> Result<Option<ServiceConfig>, ServiceError> {
        self.run_blocking("get_config", move |manager| {
            manager.get_config(&service, user_id.as_deref())
        })
        .await
    }

    /// Reconciles field schemas on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when reconciliation fails or the task fails.
    pub async fn reconcile_schema(
        &self,
        schemas: BTreeMap<String, Value>,
        user_id: Option<String>,
    ) -> Result<i64, ServiceError> {
        self.run_blocking("reconcile_schema", move |service| {
            service.reconcile_schema(&schemas, user_id.as_deref())
        })
        .await
    }

    /// Returns a health snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Join`] when the task fails.
    pub async fn health(&self) -> Result<HealthReport, ServiceError> {
        self.run_blocking("health", |service| Ok(service.health())).await
    }

    /// Shuts the service down. Other live handles see [`ServiceError::Closed`].
    pub fn shutdown(self) {
        match Arc::try_unwrap(self.inner) {
            Ok(service) => service.shutdown(),
            Err(shared) => shared.close(),
        }
    }

    /// Runs `call` against the service on the blocking pool.
    async fn run_blocking<T, F>(&self, operation: &'static str, call: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&ConfigManagerService) -> Result<T, ServiceError> + Send + 'static,
    {
        let service = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(service.as_ref()))
            .await
            .map_err(|err| ServiceError::Join(format!("{operation} join failed: {err}")))?
    }
}
