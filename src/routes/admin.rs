use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::admin::{ActionResponse, AdminSessionResponse, PositionUpdateRequest, TeamSummary},
    error::AppError,
    services::{broker_events, session_service, ws_service},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving the session lifecycle.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/session", get(get_session))
        .route("/admin/session/start", post(start_session))
        .route("/admin/session/advance", post(advance_session))
        .route("/admin/session/end", post(end_session))
        .route("/admin/session/reset", post(reset_session))
        .route("/admin/session/position", put(set_position))
        .route("/admin/teams", get(list_teams))
        .route("/admin/teams/{id}/kick", post(kick_team))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Retrieve the current session state as seen by the lifecycle machine.
#[utoipa::path(
    get,
    path = "/admin/session",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses((status = 200, description = "Session state", body = AdminSessionResponse))
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<AdminSessionResponse> {
    Json(session_service::admin_session(&state).await)
}

/// Start the session for every team.
#[utoipa::path(
    post,
    path = "/admin/session/start",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses(
        (status = 200, description = "Session started", body = ActionResponse),
        (status = 409, description = "Session is not in the waiting phase")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(session_service::start_session(&state).await?))
}

/// Announce the next scenario position.
#[utoipa::path(
    post,
    path = "/admin/session/advance",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses(
        (status = 200, description = "Position advanced", body = ActionResponse),
        (status = 409, description = "Session is not running or already at the last scenario")
    )
)]
pub async fn advance_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(session_service::advance_session(&state).await?))
}

/// End the session, freezing scores.
#[utoipa::path(
    post,
    path = "/admin/session/end",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses(
        (status = 200, description = "Session ended", body = ActionResponse),
        (status = 409, description = "Session is not running")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(session_service::end_session(&state).await?))
}

/// Full reset: decisions wiped, teams rewound, denylist cleared.
#[utoipa::path(
    post,
    path = "/admin/session/reset",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses((status = 200, description = "Session reset", body = ActionResponse))
)]
pub async fn reset_session(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(session_service::reset_session(&state).await?))
}

/// Jump the announced scenario position forward.
#[utoipa::path(
    put,
    path = "/admin/session/position",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    request_body = PositionUpdateRequest,
    responses(
        (status = 200, description = "Position updated", body = ActionResponse),
        (status = 409, description = "Position would move backwards")
    )
)]
pub async fn set_position(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<PositionUpdateRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(
        session_service::set_position(&state, payload.position).await?,
    ))
}

/// List every team, best score first, with presence and denylist flags.
#[utoipa::path(
    get,
    path = "/admin/teams",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses((status = 200, description = "Teams", body = [TeamSummary]))
)]
pub async fn list_teams(State(state): State<SharedState>) -> Json<Vec<TeamSummary>> {
    Json(session_service::list_teams(&state))
}

/// Kick a team: close its connections and deny it until the next reset.
#[utoipa::path(
    post,
    path = "/admin/teams/{id}/kick",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"),
    ("id" = Uuid, Path, description = "Team to kick")),
    responses((status = 204, description = "Team kicked"))
)]
pub async fn kick_team(State(state): State<SharedState>, Path(id): Path<Uuid>) -> StatusCode {
    ws_service::kick_team(&state, id);
    broker_events::broadcast_state_update(&state, state.session_state().await);
    StatusCode::NO_CONTENT
}

/// Reject requests without the configured admin token. When no token is
/// configured the admin surface is open, which is the local-drill default.
async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config().admin_token.clone() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized("invalid admin token".into()))
    }
}
