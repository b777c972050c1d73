//! Session-bearing `/mcp` endpoint.
//!
//! A `POST` without a session id opens a session bound to the caller's
//! fingerprint. Later requests on that session must come from the same
//! fingerprint; the message payload itself is handed through untouched.

use super::admission::denial_response;
use super::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use quotagate_core::{Admission, BindOutcome};
use serde_json::json;

pub const SESSION_HEADER: &str = "mcp-session-id";

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(super) async fn open_or_continue(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    headers: HeaderMap,
) -> Response {
    if let Some(id) = session_id(&headers) {
        if let Err(err) = state.sessions.verify(id, &admission.fingerprint) {
            return denial_response(&err);
        }
        return session_reply(StatusCode::OK, id, &admission);
    }

    let id = uuid::Uuid::new_v4().to_string();
    match state.sessions.bind(&id, admission.fingerprint.clone()) {
        BindOutcome::Created => {
            tracing::info!(
                event = "session_opened",
                session_id = %id,
                source = %admission.source,
                fingerprint = %admission.fingerprint
            );
        }
        BindOutcome::Existing(_) => {
            tracing::warn!(event = "session_id_collision", session_id = %id);
            return StatusCode::CONFLICT.into_response();
        }
    }
    session_reply(StatusCode::OK, &id, &admission)
}

pub(super) async fn close(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = session_id(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "session_required",
                "message": format!("{SESSION_HEADER} header required"),
            })),
        )
            .into_response();
    };

    if let Err(err) = state.sessions.verify(id, &admission.fingerprint) {
        return denial_response(&err);
    }
    state.sessions.close(id);
    tracing::info!(event = "session_closed", session_id = %id);
    StatusCode::NO_CONTENT.into_response()
}

fn session_reply(status: StatusCode, id: &str, admission: &Admission) -> Response {
    let mut response = (
        status,
        Json(json!({
            "session_id": id,
            "source": admission.source,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}
