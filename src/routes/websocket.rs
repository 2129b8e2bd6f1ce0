use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{error::AppError, services::ws_service, state::SharedState};

/// Query parameters accepted on the admin WebSocket upgrade. Browsers cannot
/// set headers on WebSocket requests, so the token travels as a query param.
#[derive(Debug, Deserialize)]
pub struct AdminWsQuery {
    /// Configured admin token.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "broker",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a team WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let shared_state = state.clone();
    ws.on_upgrade(move |socket| ws_service::handle_team_socket(shared_state.clone(), socket))
}

#[utoipa::path(
    get,
    path = "/ws/admin",
    tag = "broker",
    params(("token" = Option<String>, Query, description = "Configured admin token")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or invalid admin token")
    )
)]
/// Upgrade the HTTP connection into an admin WebSocket session.
pub async fn admin_ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<AdminWsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    if let Some(expected) = &state.config().admin_token {
        match query.token.as_deref() {
            Some(provided) if provided == expected => {}
            Some(_) => return Err(AppError::Unauthorized("invalid admin token".into())),
            None => return Err(AppError::Unauthorized("missing admin token".into())),
        }
    }

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| ws_service::handle_admin_socket(shared_state.clone(), socket)))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws", get(ws_handler))
        .route("/ws/admin", get(admin_ws_handler))
}
