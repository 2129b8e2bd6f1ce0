//! Builds broker events and pushes them to the admin hub and to every live
//! team connection. Clients treat every event as a hint to re-fetch their
//! authoritative status, so delivery is best effort by design.

use axum::extract::ws::Message;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::events::{
        DecisionSubmittedEvent, ErrorEvent, ProgressUpdateEvent, ServerEvent, StateUpdateEvent,
        TeamConnectedEvent, TeamDisconnectedEvent, TeamKickedEvent,
    },
    state::{
        SharedState,
        session::{SessionEvent, SessionState},
    },
};

const EVENT_STATE_UPDATE: &str = "state-update";
const EVENT_SESSION_STARTED: &str = "started";
const EVENT_SESSION_ADVANCED: &str = "advanced";
const EVENT_SESSION_ENDED: &str = "ended";
const EVENT_SESSION_RESET: &str = "reset";
const EVENT_TEAM_CONNECTED: &str = "team-connected";
const EVENT_TEAM_DISCONNECTED: &str = "team-disconnected";
const EVENT_TEAM_KICKED: &str = "team-kicked";
const EVENT_PROGRESS_UPDATE: &str = "progress-update";
const EVENT_DECISION_SUBMITTED: &str = "decision-submitted";
const EVENT_ERROR: &str = "error";

/// Broadcast the lifecycle event for an applied transition. The payload is
/// the same session snapshot the `state-update` event carries.
pub fn broadcast_lifecycle(state: &SharedState, event: SessionEvent, session: SessionState) {
    let name = match event {
        SessionEvent::Start => EVENT_SESSION_STARTED,
        SessionEvent::Advance | SessionEvent::Seek(_) => EVENT_SESSION_ADVANCED,
        SessionEvent::End => EVENT_SESSION_ENDED,
        SessionEvent::Reset => EVENT_SESSION_RESET,
    };
    let payload = StateUpdateEvent {
        phase: session.phase.into(),
        current_position: session.position,
        connected_count: state.cache().connected_team_count(),
    };
    send_client_event(state, name, &payload);
    send_admin_event(state, name, &payload);
}

/// Broadcast the global session snapshot to every scope.
pub fn broadcast_state_update(state: &SharedState, session: SessionState) {
    let payload = StateUpdateEvent {
        phase: session.phase.into(),
        current_position: session.position,
        connected_count: state.cache().connected_team_count(),
    };
    send_client_event(state, EVENT_STATE_UPDATE, &payload);
    send_admin_event(state, EVENT_STATE_UPDATE, &payload);
}

/// Broadcast that a team joined the session.
pub fn broadcast_team_connected(state: &SharedState, team_id: Uuid, team_name: &str) {
    let payload = TeamConnectedEvent {
        team_id,
        team_name: team_name.to_string(),
    };
    send_client_event(state, EVENT_TEAM_CONNECTED, &payload);
    send_admin_event(state, EVENT_TEAM_CONNECTED, &payload);
}

/// Broadcast that a team left the session.
pub fn broadcast_team_disconnected(state: &SharedState, team_id: Uuid) {
    let payload = TeamDisconnectedEvent { team_id };
    send_client_event(state, EVENT_TEAM_DISCONNECTED, &payload);
    send_admin_event(state, EVENT_TEAM_DISCONNECTED, &payload);
}

/// Broadcast that a team was removed by an admin.
pub fn broadcast_team_kicked(state: &SharedState, team_id: Uuid) {
    let payload = TeamKickedEvent { team_id };
    send_client_event(state, EVENT_TEAM_KICKED, &payload);
    send_admin_event(state, EVENT_TEAM_KICKED, &payload);
}

/// Relay a team's progress to admin subscribers.
pub fn broadcast_progress_update(state: &SharedState, payload: ProgressUpdateEvent) {
    send_admin_event(state, EVENT_PROGRESS_UPDATE, &payload);
}

/// Broadcast a committed decision to every scope.
pub fn broadcast_decision_submitted(state: &SharedState, team_id: Uuid, position: u8, score: u32) {
    let payload = DecisionSubmittedEvent {
        team_id,
        position,
        score,
    };
    send_client_event(state, EVENT_DECISION_SUBMITTED, &payload);
    send_admin_event(state, EVENT_DECISION_SUBMITTED, &payload);
}

/// Encode a `team-kicked` frame for targeted delivery to one connection.
pub fn team_kicked_message(team_id: Uuid) -> Option<Message> {
    encode_message(EVENT_TEAM_KICKED, &TeamKickedEvent { team_id })
}

/// Encode an `error` frame for targeted delivery to one connection.
pub fn error_message(message: &str) -> Option<Message> {
    encode_message(
        EVENT_ERROR,
        &ErrorEvent {
            message: message.to_string(),
        },
    )
}

/// Serialize an event into a text frame. Serialization failures are bugs in
/// the payload types; they are logged and the frame is dropped.
fn encode_message(event: &str, payload: &impl Serialize) -> Option<Message> {
    match ServerEvent::json(event, payload).and_then(|ev| serde_json::to_string(&ev)) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize broker event");
            None
        }
    }
}

fn send_admin_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(event, payload) {
        Ok(event) => state.admin_hub().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin event payload"),
    }
}

/// Fan an event out to every live team connection, dropping connections
/// whose writer task has gone away.
fn send_client_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    let Some(message) = encode_message(event, payload) else {
        return;
    };

    let mut dead = Vec::new();
    for entry in state.clients().iter() {
        if entry.value().tx.send(message.clone()).is_err() {
            dead.push(entry.key().clone());
        }
    }
    for transport_id in dead {
        state.clients().remove(&transport_id);
        state.cache().client_disconnected(&transport_id);
        warn!(%transport_id, "dropped client connection with closed writer");
    }
}
