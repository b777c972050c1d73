use super::super::AuthorizationGateway;
use crate::config::AuthMode;
use crate::credential::{CredentialHash, Fingerprint};
use crate::decision::{Admission, Reason, UsageDecision};
use crate::error::AuthError;
use crate::window::Window;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

const MAX_BACKEND_WAIT: Duration = Duration::from_secs(3600);

pub(crate) async fn authorize_request_impl(
    gateway: &AuthorizationGateway,
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Admission, AuthError> {
    if gateway.mode == AuthMode::Disabled {
        tracing::debug!(event = "admitted", source = "anonymous");
        return Ok(Admission::anonymous());
    }

    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => authorize_impl(gateway, secret, now).await,
        None => {
            tracing::info!(event = "denied", reason = "credential_required");
            Err(AuthError::MissingCredential)
        }
    }
}

pub(crate) async fn authorize_impl(
    gateway: &AuthorizationGateway,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<Admission, AuthError> {
    let hash = CredentialHash::of(raw);
    let fingerprint = hash.fingerprint();

    let Some(backend) = gateway.backend.as_ref() else {
        return fallback_or_deny(gateway, raw, fingerprint, "store_disabled");
    };

    let deadline = Instant::now() + gateway.timeout.min(MAX_BACKEND_WAIT);
    let call = backend.validate_and_consume(&hash, now, deadline);
    match tokio::time::timeout_at(deadline.into(), call).await {
        Err(_) => {
            tracing::error!(
                event = "backend_timeout",
                fingerprint = %fingerprint,
                timeout_ms = gateway.timeout.as_millis() as u64
            );
            Err(AuthError::backend("admission backend timed out"))
        }
        Ok(Err(e)) if e.is_not_provisioned() && gateway.fallback.is_some() => {
            fallback_or_deny(gateway, raw, fingerprint, "store_not_provisioned")
        }
        Ok(Err(e)) => {
            tracing::error!(event = "backend_error", fingerprint = %fingerprint, error = %e);
            Err(AuthError::backend(e.to_string()))
        }
        Ok(Ok(decision)) => map_decision(decision, fingerprint),
    }
}

fn fallback_or_deny(
    gateway: &AuthorizationGateway,
    raw: &str,
    fingerprint: Fingerprint,
    cause: &'static str,
) -> Result<Admission, AuthError> {
    let Some(keys) = gateway.fallback.as_ref() else {
        tracing::error!(event = "backend_error", cause, "no credential source available");
        return Err(AuthError::backend("no credential source available"));
    };

    if let Some(admission) = keys.admit(raw) {
        tracing::warn!(
            event = "fallback_admitted",
            source = "fallback",
            cause,
            fingerprint = %fingerprint
        );
        return Ok(admission);
    }

    tracing::info!(
        event = "denied",
        reason = Reason::InvalidKey.as_str(),
        source = "fallback",
        cause,
        fingerprint = %fingerprint
    );
    Err(AuthError::InvalidCredential {
        decision: Box::new(UsageDecision::invalid_key()),
    })
}

fn map_decision(
    decision: UsageDecision,
    fingerprint: Fingerprint,
) -> Result<Admission, AuthError> {
    let reason = decision.reason;
    let credential_id = decision.credential_id.clone().unwrap_or_default();

    match reason {
        Reason::Ok => {
            tracing::debug!(
                event = "admitted",
                source = "store",
                credential_id = %credential_id,
                minute_count = ?decision.minute_count,
                daily_count = ?decision.daily_count
            );
            Ok(Admission::store(fingerprint, decision))
        }
        Reason::InvalidKey => {
            tracing::info!(event = "denied", reason = reason.as_str(), fingerprint = %fingerprint);
            Err(AuthError::InvalidCredential {
                decision: Box::new(decision),
            })
        }
        Reason::RevokedKey => {
            tracing::info!(event = "denied", reason = reason.as_str(), credential_id = %credential_id);
            Err(AuthError::RevokedCredential {
                decision: Box::new(decision),
            })
        }
        Reason::MinuteLimitExceeded | Reason::DailyLimitExceeded => {
            let scope = if reason == Reason::MinuteLimitExceeded {
                Window::Minute
            } else {
                Window::Day
            };
            tracing::warn!(
                event = "rate_limited",
                reason = reason.as_str(),
                scope = scope.as_str(),
                credential_id = %credential_id
            );
            Err(AuthError::RateLimited {
                scope,
                decision: Box::new(decision),
            })
        }
    }
}
