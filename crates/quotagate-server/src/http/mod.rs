//! Router and shared state for the HTTP surface.

mod admission;
mod session;

pub use admission::{admission_layer, denial_response, extract_secret};
pub use session::SESSION_HEADER;

use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use quotagate_core::{AuthorizationGateway, SessionBindings};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthorizationGateway>,
    pub sessions: Arc<SessionBindings>,
}

impl AppState {
    pub fn new(gateway: AuthorizationGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            sessions: Arc::new(SessionBindings::new()),
        }
    }
}

/// `/health` is open; everything under `/mcp` passes the admission layer.
pub fn router(state: AppState) -> Router {
    let guarded = Router::new()
        .route(
            "/mcp",
            post(session::open_or_continue).delete(session::close),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission_layer,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
