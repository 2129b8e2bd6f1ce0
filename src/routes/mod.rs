use axum::Router;

use crate::state::SharedState;

/// Admin session control endpoints.
pub mod admin;
/// Decision submission endpoint.
pub mod decision;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health check endpoint.
pub mod health;
/// Team status endpoint.
pub mod session;
/// WebSocket upgrade endpoints.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(decision::router())
        .merge(websocket::router())
        .merge(admin::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
