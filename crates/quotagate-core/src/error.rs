//! Authorization outcomes that deny a request, and their fixed transport
//! mapping.

use crate::decision::UsageDecision;
use crate::window::Window;
use serde::Serialize;
use thiserror::Error;

/// Why a request was not admitted.
///
/// Denials that came out of the store carry the full [`UsageDecision`] so
/// the transport can echo quotas and counts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("API key required")]
    MissingCredential,

    #[error("Invalid API key")]
    InvalidCredential { decision: Box<UsageDecision> },

    #[error("API key has been revoked")]
    RevokedCredential { decision: Box<UsageDecision> },

    #[error("{} rate limit exceeded", scope_label(*scope))]
    RateLimited {
        scope: Window,
        decision: Box<UsageDecision>,
    },

    #[error("Authorization backend unavailable: {detail}")]
    BackendUnavailable { detail: String },

    #[error("Session belongs to a different credential")]
    SessionMismatch,

    #[error("Unknown session")]
    UnknownSession,
}

fn scope_label(scope: Window) -> &'static str {
    match scope {
        Window::Minute => "Per-minute",
        Window::Day => "Daily",
    }
}

impl AuthError {
    pub fn backend(detail: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            detail: detail.into(),
        }
    }

    /// The decision record behind a store-originated denial.
    pub fn decision(&self) -> Option<&UsageDecision> {
        match self {
            Self::InvalidCredential { decision }
            | Self::RevokedCredential { decision }
            | Self::RateLimited { decision, .. } => Some(decision),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "credential_required",
            Self::InvalidCredential { .. } => "invalid_api_key",
            Self::RevokedCredential { .. } => "revoked_api_key",
            Self::RateLimited {
                scope: Window::Minute,
                ..
            } => "minute_limit_exceeded",
            Self::RateLimited {
                scope: Window::Day, ..
            } => "daily_limit_exceeded",
            Self::BackendUnavailable { .. } => "auth_backend_unavailable",
            Self::SessionMismatch => "session_credential_mismatch",
            Self::UnknownSession => "session_not_found",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::MissingCredential => 401,
            Self::InvalidCredential { .. }
            | Self::RevokedCredential { .. }
            | Self::SessionMismatch => 403,
            Self::UnknownSession => 404,
            Self::RateLimited { .. } => 429,
            Self::BackendUnavailable { .. } => 500,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { scope, .. } => Some(scope.retry_after_secs()),
            _ => None,
        }
    }

    /// Transport-neutral rendering. Backend detail stays out of the message.
    pub fn denial(&self) -> Denial {
        let message = match self {
            Self::BackendUnavailable { .. } => "Authorization backend unavailable".to_string(),
            other => other.to_string(),
        };
        Denial {
            status: self.status(),
            code: self.code(),
            message,
            retry_after: self.retry_after(),
        }
    }
}

/// What a transport sends back for a denied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    #[serde(skip)]
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(scope: Window) -> AuthError {
        AuthError::RateLimited {
            scope,
            decision: Box::new(UsageDecision::invalid_key()),
        }
    }

    #[test]
    fn test_outcome_mapping() {
        let invalid = AuthError::InvalidCredential {
            decision: Box::new(UsageDecision::invalid_key()),
        };
        assert_eq!(invalid.denial().status, 403);
        assert_eq!(invalid.denial().retry_after, None);

        let minute = limited(Window::Minute).denial();
        assert_eq!((minute.status, minute.retry_after), (429, Some(60)));
        assert_eq!(minute.code, "minute_limit_exceeded");

        let day = limited(Window::Day).denial();
        assert_eq!((day.status, day.retry_after), (429, Some(3600)));
        assert_eq!(day.code, "daily_limit_exceeded");

        let backend = AuthError::backend("disk I/O error").denial();
        assert_eq!((backend.status, backend.retry_after), (500, None));
        assert!(!backend.message.contains("disk"));

        assert_eq!(AuthError::MissingCredential.status(), 401);
        assert_eq!(AuthError::SessionMismatch.status(), 403);
        assert_eq!(AuthError::UnknownSession.status(), 404);
    }

    #[test]
    fn test_denial_body_shape() {
        let body = serde_json::to_value(limited(Window::Day).denial()).unwrap();
        assert_eq!(body["code"], "daily_limit_exceeded");
        assert_eq!(body["retry_after"], 3600);
        assert!(body.get("status").is_none());

        let body = serde_json::to_value(AuthError::MissingCredential.denial()).unwrap();
        assert!(body.get("retry_after").is_none());
    }
}
