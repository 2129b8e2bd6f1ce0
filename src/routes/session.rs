use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::session::TeamStatusResponse, error::AppError, services::session_service,
    state::SharedState,
};

/// Routes serving authoritative session status to team clients.
pub fn router() -> Router<SharedState> {
    Router::new().route("/session/{team_id}/status", get(team_status))
}

/// Fetch the authoritative session status for one team.
///
/// Clients call this on load, on reconnect, and whenever a broker event
/// hints that something changed.
#[utoipa::path(
    get,
    path = "/session/{team_id}/status",
    tag = "session",
    params(("team_id" = Uuid, Path, description = "Team identifier")),
    responses(
        (status = 200, description = "Authoritative status", body = TeamStatusResponse),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn team_status(
    State(state): State<SharedState>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<TeamStatusResponse>, AppError> {
    Ok(Json(session_service::team_status(&state, team_id).await?))
}
