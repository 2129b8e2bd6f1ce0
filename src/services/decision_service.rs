//! Decision submission pipeline: gate on the announced scenario, score,
//! persist exactly once, then fan the outcome out to every scope.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{MAX_SCENARIO_POSITION, models::DecisionEntity},
    dto::{
        decision::{SubmitDecisionRequest, SubmitDecisionResponse},
        events::ProgressUpdateEvent,
    },
    error::ServiceError,
    scoring::{Reference, Submission},
    services::broker_events,
    state::{SharedState, cache::DecisionSummary, now_ms, session::SessionPhase},
};

/// Record a team's decision for the announced scenario.
///
/// The globally announced position is the sole submission authority: a
/// submission is accepted only while the session is running and the request
/// targets exactly that position. The store's `(team, position)` primary key
/// makes the commit at-most-once even under concurrent duplicate requests.
pub async fn submit_decision(
    state: &SharedState,
    team_id: Uuid,
    request: SubmitDecisionRequest,
) -> Result<SubmitDecisionResponse, ServiceError> {
    let position = request.position;
    if !(1..=MAX_SCENARIO_POSITION).contains(&position) {
        return Err(ServiceError::OutOfRange { position });
    }

    let session = state.session_state().await;
    if session.phase != SessionPhase::Running || position != session.position {
        return Err(ServiceError::Forbidden(format!(
            "submissions are only accepted for the announced scenario (position {})",
            session.position
        )));
    }

    if state.cache().is_kicked(&team_id) {
        return Err(ServiceError::Forbidden(
            "team has been removed from the session".into(),
        ));
    }

    let store = state.store();
    store
        .find_team(team_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;

    let scenario = store
        .find_scenario(position)
        .await?
        .ok_or(ServiceError::UnknownScenario { position })?;

    let score = state.scorer().score(
        Submission {
            decision: &request.decision,
            rationale: &request.rationale,
        },
        Reference {
            answer: &scenario.reference_answer,
            rationale: &scenario.reference_rationale,
        },
    );

    let entity = DecisionEntity {
        team_id,
        position,
        decision: request.decision,
        rationale: request.rationale,
        score,
        created_at_ms: now_ms(),
    };

    let updated = match store.record_decision(entity.clone()).await {
        Ok(updated) => updated,
        Err(err) if err.is_transient() => {
            warn!(
                team_id = %team_id,
                position,
                error = %err,
                "transient storage error while recording decision; retrying once"
            );
            store.record_decision(entity.clone()).await?
        }
        Err(err) => return Err(err.into()),
    };

    state.cache().add_decision(
        team_id,
        DecisionSummary::from(&entity),
        updated.current_position,
        updated.total_score,
    );

    info!(
        team_id = %team_id,
        position,
        score,
        new_position = updated.current_position,
        "decision recorded"
    );

    broker_events::broadcast_decision_submitted(state, team_id, position, score);
    broker_events::broadcast_progress_update(
        state,
        ProgressUpdateEvent {
            team_id,
            current_position: updated.current_position,
            total_score: updated.total_score,
            is_completed: updated.is_complete(),
        },
    );
    broker_events::broadcast_state_update(state, session);

    Ok(SubmitDecisionResponse {
        score,
        new_position: updated.current_position,
        new_total_score: updated.total_score,
        is_complete: updated.is_complete(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            DecisionStore,
            models::{SessionEntity, TeamEntity},
            sqlite::SqliteStore,
        },
        scoring::KeywordOverlapScorer,
        state::AppState,
    };

    async fn running_state(position: u8) -> (SharedState, Uuid) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = Arc::new(AppConfig {
            snapshot_path: "/nonexistent/snapshot.json".into(),
            backup_path: "/nonexistent/backup.json".into(),
            ..AppConfig::default()
        });
        store
            .replace_scenarios(config.scenario_seed())
            .await
            .unwrap();

        let team = TeamEntity::new(Uuid::new_v4(), "alpha".into());
        store.upsert_team(team.clone()).await.unwrap();
        store
            .save_session(SessionEntity {
                phase: "running".into(),
                current_position: position,
            })
            .await
            .unwrap();

        let state = AppState::bootstrap(config, store, Arc::new(KeywordOverlapScorer))
            .await
            .unwrap();
        (state, team.id)
    }

    fn request(position: u8, decision: &str, rationale: &str) -> SubmitDecisionRequest {
        SubmitDecisionRequest {
            position,
            decision: decision.to_string(),
            rationale: rationale.to_string(),
        }
    }

    #[tokio::test]
    async fn submit_for_announced_position_advances_team() {
        let (state, team_id) = running_state(3).await;

        let response = submit_decision(
            &state,
            team_id,
            request(
                3,
                "Notify the customer early and negotiate a partial shipment",
                "Transparency preserves the relationship",
            ),
        )
        .await
        .unwrap();

        assert!(response.score > 0);
        assert_eq!(response.new_position, 4);
        assert!(!response.is_complete);

        let cached = state.cache().get_team(&team_id).unwrap();
        assert_eq!(cached.current_position, 4);
        assert_eq!(cached.total_score, response.new_total_score);
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let (state, team_id) = running_state(1).await;

        submit_decision(&state, team_id, request(1, "evacuate everyone", ""))
            .await
            .unwrap();

        let err = submit_decision(&state, team_id, request(1, "different answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::AlreadySubmitted { position: 1 }
        ));

        // First commit is untouched by the rejected retry.
        let cached = state.cache().get_team(&team_id).unwrap();
        assert_eq!(cached.decisions.len(), 1);
        assert_eq!(cached.current_position, 2);
    }

    #[tokio::test]
    async fn submit_for_unannounced_position_is_forbidden() {
        let (state, team_id) = running_state(3).await;

        let err = submit_decision(&state, team_id, request(2, "late answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = submit_decision(&state, team_id, request(4, "early answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn submit_outside_running_phase_is_forbidden() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = Arc::new(AppConfig {
            snapshot_path: "/nonexistent/snapshot.json".into(),
            backup_path: "/nonexistent/backup.json".into(),
            ..AppConfig::default()
        });
        store
            .replace_scenarios(config.scenario_seed())
            .await
            .unwrap();
        let team = TeamEntity::new(Uuid::new_v4(), "alpha".into());
        store.upsert_team(team.clone()).await.unwrap();

        // Fresh store stays in the waiting phase.
        let state = AppState::bootstrap(config, store, Arc::new(KeywordOverlapScorer))
            .await
            .unwrap();

        let err = submit_decision(&state, team.id, request(1, "too soon", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn empty_submission_commits_with_zero_score() {
        let (state, team_id) = running_state(5).await;

        let response = submit_decision(&state, team_id, request(5, "", ""))
            .await
            .unwrap();
        assert_eq!(response.score, 0);
        assert_eq!(response.new_position, 6);
    }

    #[tokio::test]
    async fn kicked_team_cannot_submit() {
        let (state, team_id) = running_state(2).await;
        state.cache().kick_team(team_id);

        let err = submit_decision(&state, team_id, request(2, "answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_team_is_not_found() {
        let (state, _team_id) = running_state(1).await;

        let err = submit_decision(&state, Uuid::new_v4(), request(1, "answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn out_of_range_position_is_rejected() {
        let (state, team_id) = running_state(1).await;

        let err = submit_decision(&state, team_id, request(0, "answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OutOfRange { position: 0 }));

        let err = submit_decision(&state, team_id, request(9, "answer", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OutOfRange { position: 9 }));
    }
}
