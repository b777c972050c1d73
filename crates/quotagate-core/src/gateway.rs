//! Request admission.
//!
//! Flow for one credentialed request:
//! 1. Hash the presented secret
//! 2. Ask the admission backend to validate and charge, under a timeout
//! 3. Map the decision onto [`Admission`] or [`AuthError`]
//!
//! Backend failures fail closed. The one exception is a backend that reports
//! itself not provisioned while fallback keys are enabled: the secret is then
//! matched against the fallback set instead. A deployment without a store
//! goes to the fallback set directly.

use crate::config::{AuthMode, ConfigError, GatewayConfig, DEFAULT_BACKEND_TIMEOUT_MS};
use crate::decision::Admission;
use crate::error::AuthError;
use crate::fallback::FallbackKeySet;
use crate::store::AdmissionBackend;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

#[path = "gateway_internal/mod.rs"]
mod gateway_internal;

#[derive(Clone)]
pub struct AuthorizationGateway {
    mode: AuthMode,
    backend: Option<Arc<dyn AdmissionBackend>>,
    fallback: Option<FallbackKeySet>,
    timeout: Duration,
}

impl AuthorizationGateway {
    /// Enforcing gateway over `backend`, fallback off, default timeout.
    pub fn new(backend: Option<Arc<dyn AdmissionBackend>>) -> Self {
        Self {
            mode: AuthMode::Required,
            backend,
            fallback: None,
            timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }

    /// Gateway that admits everything as the anonymous identity.
    pub fn disabled() -> Self {
        Self {
            mode: AuthMode::Disabled,
            ..Self::new(None)
        }
    }

    /// Validate `config` and wire it to an already opened backend.
    pub fn from_config(
        config: &GatewayConfig,
        backend: Option<Arc<dyn AdmissionBackend>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            mode: config.mode,
            backend,
            fallback: config.fallback_keys(),
            timeout: config.backend_timeout(),
        })
    }

    /// Validate `config`, open its store and build the gateway.
    pub fn open(config: &GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let store = config.open_store()?;
        Self::from_config(config, store.backend())
    }

    pub fn with_fallback(mut self, keys: FallbackKeySet) -> Self {
        self.fallback = Some(keys);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback.is_some()
    }

    /// Authorize a presented secret. Ignores the enforcement mode.
    pub async fn authorize(&self, raw: &str, now: DateTime<Utc>) -> Result<Admission, AuthError> {
        gateway_internal::run::authorize_impl(self, raw, now).await
    }

    /// Transport entry point: applies the enforcement mode and treats an
    /// absent or blank secret as missing.
    pub async fn authorize_request(
        &self,
        raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission, AuthError> {
        gateway_internal::run::authorize_request_impl(self, raw, now).await
    }
}

impl std::fmt::Debug for AuthorizationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGateway")
            .field("mode", &self.mode)
            .field("backend", &self.backend.is_some())
            .field("fallback", &self.fallback)
            .field("timeout", &self.timeout)
            .finish()
    }
}
