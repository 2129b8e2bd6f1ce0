//! Session lifecycle control and status reads.
//!
//! Every lifecycle mutation runs through the plan/apply machine in
//! `state::session`: the target state is persisted before the in-memory
//! machine commits, so a crash between the two leaves the store ahead of the
//! cache, never behind it.

use uuid::Uuid;

use crate::{
    dao::MAX_SCENARIO_POSITION,
    dto::{
        admin::{ActionResponse, AdminSessionResponse, TeamSummary},
        common::SessionSnapshot,
        session::TeamStatusResponse,
    },
    error::ServiceError,
    services::broker_events,
    state::{
        SharedState,
        session::{SessionEvent, SessionPhase, SessionState},
    },
};

/// Authoritative status for one team, served to its reconciler.
pub async fn team_status(
    state: &SharedState,
    team_id: Uuid,
) -> Result<TeamStatusResponse, ServiceError> {
    let session = state.session_state().await;

    let team = match state.cache().get_team(&team_id) {
        Some(team) => team,
        None => {
            let entity = state
                .store()
                .find_team(team_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))?;
            state.cache().upsert_team(entity.clone());
            entity.into()
        }
    };

    let has_current_scenario = session.phase == SessionPhase::Running
        && (1..=MAX_SCENARIO_POSITION).contains(&session.position)
        && state.store().find_scenario(session.position).await?.is_some();

    Ok(TeamStatusResponse {
        phase: session.phase.into(),
        current_position: session.position,
        has_current_scenario,
        total_score: team.total_score,
        complete_current_step_for_team: team.decisions.contains_key(&session.position),
        time_limit_seconds: state.config().time_limit_seconds,
    })
}

/// Start the session: waiting becomes running at position 1.
pub async fn start_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let next = transition(state, SessionEvent::Start).await?;
    Ok(acknowledge(state, next))
}

/// Advance the announced scenario by one position.
pub async fn advance_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let next = transition(state, SessionEvent::Advance).await?;
    Ok(acknowledge(state, next))
}

/// Jump the announced scenario forward to an explicit position.
pub async fn set_position(
    state: &SharedState,
    position: u8,
) -> Result<ActionResponse, ServiceError> {
    if !(1..=MAX_SCENARIO_POSITION).contains(&position) {
        return Err(ServiceError::OutOfRange { position });
    }
    let next = transition(state, SessionEvent::Seek(position)).await?;
    Ok(acknowledge(state, next))
}

/// End the session, freezing scores at the current position.
pub async fn end_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let next = transition(state, SessionEvent::End).await?;
    Ok(acknowledge(state, next))
}

/// Full reset: wipe decisions, rewind every team, clear the denylist, and
/// return the session to the waiting phase. Scenarios survive.
pub async fn reset_session(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let store = state.store().clone();
    let ((), next) = state
        .run_transition(SessionEvent::Reset, move |_target| async move {
            store.reset().await?;
            Ok(())
        })
        .await?;

    state.cache().reset();
    state.cache().update_game_state(next);
    broker_events::broadcast_lifecycle(state, SessionEvent::Reset, next);
    broker_events::broadcast_state_update(state, next);
    Ok(acknowledge(state, next))
}

/// Admin view of the session machine, including any in-flight transition.
pub async fn admin_session(state: &SharedState) -> AdminSessionResponse {
    let snapshot = state.session_snapshot().await;
    AdminSessionResponse {
        session: SessionSnapshot::new(snapshot.state, state.cache().connected_team_count()),
        transition_pending: snapshot.pending.is_some(),
        transition_pending_ms: snapshot
            .pending_since
            .map(|since| since.elapsed().as_millis() as u64),
        phase: snapshot.state.phase.into(),
    }
}

/// Leaderboard-ordered team summaries with presence and denylist flags.
pub fn list_teams(state: &SharedState) -> Vec<TeamSummary> {
    state
        .cache()
        .all_teams()
        .into_iter()
        .map(|progress| {
            let connected = !state.cache().connections_for_team(&progress.id).is_empty();
            let kicked = state.cache().is_kicked(&progress.id);
            TeamSummary::from_progress(progress, connected, kicked)
        })
        .collect()
}

/// Run a lifecycle event whose durable work is persisting the target state.
async fn transition(
    state: &SharedState,
    event: SessionEvent,
) -> Result<SessionState, ServiceError> {
    let store = state.store().clone();
    let ((), next) = state
        .run_transition(event, move |target| async move {
            store.save_session(target.into()).await?;
            Ok(())
        })
        .await?;

    state.cache().update_game_state(next);
    broker_events::broadcast_lifecycle(state, event, next);
    broker_events::broadcast_state_update(state, next);
    Ok(next)
}

fn acknowledge(state: &SharedState, next: SessionState) -> ActionResponse {
    ActionResponse::ok(SessionSnapshot::new(
        next,
        state.cache().connected_team_count(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            DecisionStore,
            models::TeamEntity,
            sqlite::SqliteStore,
        },
        dto::{common::PhaseDto, decision::SubmitDecisionRequest},
        scoring::KeywordOverlapScorer,
        services::decision_service,
        state::AppState,
    };

    async fn fresh_state() -> (SharedState, Uuid) {
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

        let state = AppState::bootstrap(config, store, Arc::new(KeywordOverlapScorer))
            .await
            .unwrap();
        (state, team.id)
    }

    #[tokio::test]
    async fn lifecycle_happy_path() {
        let (state, _) = fresh_state().await;

        let started = start_session(&state).await.unwrap();
        assert_eq!(started.session.phase, PhaseDto::Running);
        assert_eq!(started.session.current_position, 1);

        let advanced = advance_session(&state).await.unwrap();
        assert_eq!(advanced.session.current_position, 2);

        let ended = end_session(&state).await.unwrap();
        assert_eq!(ended.session.phase, PhaseDto::Ended);
        assert_eq!(ended.session.current_position, 2);

        // The store carries the same state the machine does.
        let persisted = state.store().session().await.unwrap();
        assert_eq!(persisted.phase, "ended");
        assert_eq!(persisted.current_position, 2);
    }

    #[tokio::test]
    async fn start_twice_is_an_invalid_state() {
        let (state, _) = fresh_state().await;
        start_session(&state).await.unwrap();

        let err = start_session(&state).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn set_position_never_moves_backwards() {
        let (state, _) = fresh_state().await;
        start_session(&state).await.unwrap();
        set_position(&state, 5).await.unwrap();

        let err = set_position(&state, 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(state.session_state().await.position, 5);
    }

    #[tokio::test]
    async fn status_reflects_submission_for_announced_position() {
        let (state, team_id) = fresh_state().await;
        start_session(&state).await.unwrap();
        set_position(&state, 3).await.unwrap();

        let before = team_status(&state, team_id).await.unwrap();
        assert_eq!(before.current_position, 3);
        assert!(before.has_current_scenario);
        assert!(!before.complete_current_step_for_team);

        decision_service::submit_decision(
            &state,
            team_id,
            SubmitDecisionRequest {
                position: 3,
                decision: "notify the customer early".into(),
                rationale: String::new(),
            },
        )
        .await
        .unwrap();

        let after = team_status(&state, team_id).await.unwrap();
        assert_eq!(after.current_position, 3);
        assert!(after.complete_current_step_for_team);
        assert!(after.total_score > 0);
    }

    #[tokio::test]
    async fn reset_clears_progress_and_returns_to_waiting() {
        let (state, team_id) = fresh_state().await;
        start_session(&state).await.unwrap();
        decision_service::submit_decision(
            &state,
            team_id,
            SubmitDecisionRequest {
                position: 1,
                decision: "evacuate all personnel".into(),
                rationale: String::new(),
            },
        )
        .await
        .unwrap();
        state.cache().kick_team(team_id);

        let response = reset_session(&state).await.unwrap();
        assert_eq!(response.session.phase, PhaseDto::Waiting);
        assert_eq!(response.session.current_position, 0);

        let cached = state.cache().get_team(&team_id).unwrap();
        assert_eq!(cached.current_position, 1);
        assert_eq!(cached.total_score, 0);
        assert!(!state.cache().is_kicked(&team_id));

        assert!(state.store().list_decisions().await.unwrap().is_empty());
        // Scenarios survive a reset.
        assert_eq!(state.store().list_scenarios().await.unwrap().len(), 7);

        // The session can be played again immediately.
        let restarted = start_session(&state).await.unwrap();
        assert_eq!(restarted.session.current_position, 1);
    }

    #[tokio::test]
    async fn admin_session_reports_no_pending_transition_at_rest() {
        let (state, _) = fresh_state().await;
        let view = admin_session(&state).await;
        assert!(!view.transition_pending);
        assert!(view.transition_pending_ms.is_none());
        assert_eq!(view.phase, PhaseDto::Waiting);
    }

    #[tokio::test]
    async fn list_teams_orders_by_score() {
        let (state, first) = fresh_state().await;
        let mut second = TeamEntity::new(Uuid::new_v4(), "bravo".into());
        second.total_score = 40;
        second.current_position = 4;
        state.store().upsert_team(second.clone()).await.unwrap();
        state.cache().upsert_team(second.clone());

        let teams = list_teams(&state);
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].id, second.id);
        assert_eq!(teams[1].id, first);
        assert!(!teams[0].connected);
    }
}
