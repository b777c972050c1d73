use super::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use quotagate_core::AuthError;

const API_KEY_HEADER: &str = "x-api-key";
const CHALLENGE: &str = "Bearer realm=\"quotagate\"";

/// Admit or deny every request that reaches the guarded routes.
///
/// Admitted requests carry the [`quotagate_core::Admission`] as a request
/// extension and get quota headers on the way out.
pub async fn admission_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let secret = extract_secret(request.headers());
    let admission = match state
        .gateway
        .authorize_request(secret.as_deref(), Utc::now())
        .await
    {
        Ok(admission) => admission,
        Err(err) => return denial_response(&err),
    };

    let quota_headers = admission.quota_headers();
    request.extensions_mut().insert(admission);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in quota_headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    response
}

/// `Authorization: Bearer <secret>` first, then `X-API-Key: <secret>`.
pub fn extract_secret(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = auth.trim().splitn(2, ' ');
        if let (Some(scheme), Some(token)) = (parts.next(), parts.next()) {
            if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
    }

    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// JSON body `{code, message, retry_after?}` with the mapped status.
pub fn denial_response(err: &AuthError) -> Response {
    let denial = err.denial();
    let status =
        StatusCode::from_u16(denial.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (status, Json(&denial)).into_response();
    let headers = response.headers_mut();
    if let Some(secs) = denial.retry_after {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    if status == StatusCode::UNAUTHORIZED {
        headers.insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(CHALLENGE),
        );
    }
    response
}
