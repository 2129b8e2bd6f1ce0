use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::decision::{SubmitDecisionRequest, SubmitDecisionResponse},
    error::AppError,
    services::decision_service,
    state::SharedState,
};

/// Routes handling decision submissions.
pub fn router() -> Router<SharedState> {
    Router::new().route("/teams/{team_id}/decisions", post(submit_decision))
}

/// Submit a team's decision for the announced scenario.
///
/// At most one decision is recorded per team and position; a duplicate
/// submission answers 409 and leaves the first commit untouched.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/decisions",
    tag = "decisions",
    params(("team_id" = Uuid, Path, description = "Team identifier")),
    request_body = SubmitDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = SubmitDecisionResponse),
        (status = 403, description = "Submission not open for this position"),
        (status = 404, description = "Unknown team or scenario"),
        (status = 409, description = "Decision already recorded for this position")
    )
)]
pub async fn submit_decision(
    State(state): State<SharedState>,
    Path(team_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitDecisionRequest>>,
) -> Result<Json<SubmitDecisionResponse>, AppError> {
    Ok(Json(
        decision_service::submit_decision(&state, team_id, payload).await?,
    ))
}
