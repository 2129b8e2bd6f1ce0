//! WebSocket connection handling for team and admin clients.
//!
//! Each socket gets a dedicated writer task fed by an unbounded channel, so
//! broadcasts never block on a slow peer. The first frame on a team socket
//! must be a `join`; everything after it is advisory (the durable store and
//! the HTTP routes remain the authority for progress).

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::TeamEntity,
    dto::{
        events::ProgressUpdateEvent,
        validation::validate_team_name,
        ws::{AdminInboundMessage, TeamInboundMessage},
    },
    services::{broker_events, session_service},
    state::{ClientConnection, SharedState, cache::ConnectedClient, now_ms},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of a team WebSocket connection.
pub async fn handle_team_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (team_id, team_name) = match TeamInboundMessage::from_json_str(&initial_message) {
        Ok(TeamInboundMessage::Join { team_id, team_name }) => (team_id, team_name),
        Ok(_) => {
            warn!("first message was not a join");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse team message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    if let Err(refusal) = evaluate_join(&state, team_id, &team_name).await {
        match &refusal {
            JoinRefusal::InvalidName => {
                warn!(team_id = %team_id, "rejected join with invalid team name");
            }
            JoinRefusal::Denylisted => {
                info!(team_id = %team_id, "denylisted team attempted to join");
            }
            JoinRefusal::Unavailable(err) => {
                warn!(team_id = %team_id, error = %err, "failed to register joining team");
            }
        }
        if let Some(message) = refusal_message(&refusal, team_id) {
            let _ = outbound_tx.send(message);
        }
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let transport_id = Uuid::new_v4().to_string();
    state.clients().insert(
        transport_id.clone(),
        ClientConnection {
            transport_id: transport_id.clone(),
            team_id,
            tx: outbound_tx.clone(),
        },
    );
    state.cache().client_connected(ConnectedClient {
        team_id,
        transport_id: transport_id.clone(),
        last_seen_ms: now_ms(),
    });

    info!(team_id = %team_id, name = %team_name, %transport_id, "team connected");
    broker_events::broadcast_team_connected(&state, team_id, &team_name);
    broker_events::broadcast_state_update(&state, state.session_state().await);

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match TeamInboundMessage::from_json_str(&text) {
                Ok(TeamInboundMessage::Join { .. }) => {
                    warn!(team_id = %team_id, "ignoring duplicate join message");
                }
                Ok(TeamInboundMessage::Logout { team_id: claimed }) => {
                    if claimed == team_id {
                        info!(team_id = %team_id, "team logged out");
                        break;
                    }
                    warn!(team_id = %team_id, claimed = %claimed, "logout for mismatched team ignored");
                }
                Ok(TeamInboundMessage::Progress {
                    team_id: claimed,
                    current_position,
                    total_score,
                    is_completed,
                }) => {
                    if claimed != team_id {
                        warn!(team_id = %team_id, claimed = %claimed, "progress for mismatched team ignored");
                        continue;
                    }
                    // Advisory only; admins see it, nothing durable changes.
                    broker_events::broadcast_progress_update(
                        &state,
                        ProgressUpdateEvent {
                            team_id,
                            current_position,
                            total_score,
                            is_completed,
                        },
                    );
                }
                Ok(TeamInboundMessage::DecisionNotify {
                    team_id: claimed,
                    position,
                    score,
                }) => {
                    if claimed != team_id {
                        warn!(team_id = %team_id, claimed = %claimed, "decision notify for mismatched team ignored");
                        continue;
                    }
                    info!(team_id = %team_id, position, score, "client acknowledged decision");
                }
                Ok(TeamInboundMessage::Unknown) => {
                    warn!(team_id = %team_id, "ignoring unknown team message");
                }
                Err(err) => {
                    warn!(team_id = %team_id, error = %err, "failed to parse team message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(team_id = %team_id, "team closed connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(team_id = %team_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.clients().remove(&transport_id);
    state.cache().client_disconnected(&transport_id);
    info!(team_id = %team_id, %transport_id, "team disconnected");

    broker_events::broadcast_team_disconnected(&state, team_id);
    broker_events::broadcast_state_update(&state, state.session_state().await);

    finalize(writer_task, outbound_tx).await;
}

/// Handle the full lifecycle of an admin WebSocket connection.
///
/// Token verification happens at the route layer before the upgrade; by the
/// time this runs the peer is trusted.
pub async fn handle_admin_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let transport_id = Uuid::new_v4().to_string();
    state.cache().admin_connected(transport_id.clone());
    info!(%transport_id, "admin connected");

    // Forward every hub event to this admin until the writer goes away.
    let mut hub_rx = state.admin_hub().subscribe();
    let forward_tx = outbound_tx.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match hub_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(text) => {
                        if forward_tx.send(Message::Text(text.into())).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to serialize admin event");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "admin subscriber lagged behind the hub");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match AdminInboundMessage::from_json_str(&text) {
                Ok(command) => {
                    if let Err(err) = dispatch_admin_command(&state, command).await {
                        warn!(%transport_id, error = %err, "admin command failed");
                        if let Some(message) = broker_events::error_message(&err.to_string()) {
                            let _ = outbound_tx.send(message);
                        }
                    }
                }
                Err(err) => {
                    warn!(%transport_id, error = %err, "failed to parse admin message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%transport_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.cache().admin_disconnected(&transport_id);
    info!(%transport_id, "admin disconnected");

    forward_task.abort();
    finalize(writer_task, outbound_tx).await;
}

/// Kick a team: denylist it, close its live connections, notify everyone.
pub fn kick_team(state: &SharedState, team_id: Uuid) {
    state.cache().kick_team(team_id);

    for transport_id in state.cache().connections_for_team(&team_id) {
        if let Some((_, client)) = state.clients().remove(&transport_id) {
            if let Some(message) = broker_events::team_kicked_message(team_id) {
                let _ = client.tx.send(message);
            }
            let _ = client.tx.send(Message::Close(None));
        }
        state.cache().client_disconnected(&transport_id);
    }

    info!(team_id = %team_id, "team kicked");
    broker_events::broadcast_team_kicked(state, team_id);
}

async fn dispatch_admin_command(
    state: &SharedState,
    command: AdminInboundMessage,
) -> Result<(), crate::error::ServiceError> {
    match command {
        AdminInboundMessage::StartAll => {
            session_service::start_session(state).await?;
        }
        AdminInboundMessage::AdvanceAll => {
            session_service::advance_session(state).await?;
        }
        AdminInboundMessage::EndAll => {
            session_service::end_session(state).await?;
        }
        AdminInboundMessage::ResetAll => {
            session_service::reset_session(state).await?;
        }
        AdminInboundMessage::Kick { team_id } => {
            kick_team(state, team_id);
            broker_events::broadcast_state_update(state, state.session_state().await);
        }
        AdminInboundMessage::Unknown => {
            warn!("ignoring unknown admin command");
        }
    }
    Ok(())
}

/// Why a join request was refused.
#[derive(Debug)]
pub enum JoinRefusal {
    /// Team name failed validation.
    InvalidName,
    /// Team is on the denylist until the next reset.
    Denylisted,
    /// Durable store could not be reached.
    Unavailable(crate::error::ServiceError),
}

/// Decide a join request. Accepted joins are registered in the store and the
/// cache; refused joins change nothing anywhere. Repeat joins from a known
/// team are idempotent and keep its recorded progress.
pub async fn evaluate_join(
    state: &SharedState,
    team_id: Uuid,
    team_name: &str,
) -> Result<(), JoinRefusal> {
    if validate_team_name(team_name).is_err() {
        return Err(JoinRefusal::InvalidName);
    }
    if state.cache().is_kicked(&team_id) {
        return Err(JoinRefusal::Denylisted);
    }
    register_team(state, team_id, team_name)
        .await
        .map_err(JoinRefusal::Unavailable)
}

/// Frame telling the refused connection why, before it is closed.
fn refusal_message(refusal: &JoinRefusal, team_id: Uuid) -> Option<Message> {
    match refusal {
        JoinRefusal::InvalidName => broker_events::error_message("invalid team name"),
        JoinRefusal::Denylisted => broker_events::team_kicked_message(team_id),
        JoinRefusal::Unavailable(_) => broker_events::error_message("session storage unavailable"),
    }
}

/// Make sure the joining team exists in the store and the cache. A known
/// team keeps its progress; a new one starts at position 1.
async fn register_team(
    state: &SharedState,
    team_id: Uuid,
    team_name: &str,
) -> Result<(), crate::error::ServiceError> {
    let entity = match state.store().find_team(team_id).await? {
        Some(mut existing) => {
            if existing.name != team_name {
                existing.name = team_name.to_string();
                state.store().upsert_team(existing.clone()).await?;
            }
            existing
        }
        None => {
            let fresh = TeamEntity::new(team_id, team_name.to_string());
            state.store().upsert_team(fresh.clone()).await?;
            fresh
        }
    };
    state.cache().upsert_team(entity);
    Ok(())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::sqlite::SqliteStore, scoring::KeywordOverlapScorer,
        state::AppState,
    };

    async fn fresh_state() -> SharedState {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = Arc::new(AppConfig {
            snapshot_path: "/nonexistent/snapshot.json".into(),
            backup_path: "/nonexistent/backup.json".into(),
            ..AppConfig::default()
        });
        AppState::bootstrap(config, store, Arc::new(KeywordOverlapScorer))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn denylisted_join_is_refused_without_state_change() {
        let state = fresh_state().await;
        let team_id = Uuid::new_v4();
        state.cache().kick_team(team_id);

        let refusal = evaluate_join(&state, team_id, "alpha").await.unwrap_err();
        assert!(matches!(refusal, JoinRefusal::Denylisted));

        // Nothing was registered in the cache or the store.
        assert!(state.cache().get_team(&team_id).is_none());
        assert!(state.store().find_team(team_id).await.unwrap().is_none());
        assert!(state.cache().is_kicked(&team_id));
    }

    #[tokio::test]
    async fn repeated_join_keeps_recorded_progress() {
        let state = fresh_state().await;
        let team_id = Uuid::new_v4();
        evaluate_join(&state, team_id, "alpha").await.unwrap();

        let mut entity = state.store().find_team(team_id).await.unwrap().unwrap();
        entity.current_position = 4;
        entity.total_score = 27;
        state.store().upsert_team(entity.clone()).await.unwrap();
        state.cache().upsert_team(entity);

        evaluate_join(&state, team_id, "alpha").await.unwrap();

        let rejoined = state.store().find_team(team_id).await.unwrap().unwrap();
        assert_eq!(rejoined.current_position, 4);
        assert_eq!(rejoined.total_score, 27);
        let cached = state.cache().get_team(&team_id).unwrap();
        assert_eq!(cached.current_position, 4);
        assert_eq!(cached.total_score, 27);
    }

    #[tokio::test]
    async fn rejoin_under_a_new_name_renames_the_team() {
        let state = fresh_state().await;
        let team_id = Uuid::new_v4();
        evaluate_join(&state, team_id, "alpha").await.unwrap();
        evaluate_join(&state, team_id, "alpha prime").await.unwrap();

        let renamed = state.store().find_team(team_id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "alpha prime");
    }

    #[tokio::test]
    async fn blank_team_name_is_refused() {
        let state = fresh_state().await;
        let refusal = evaluate_join(&state, Uuid::new_v4(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(refusal, JoinRefusal::InvalidName));
    }
}
