use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::common::PhaseDto;

/// Dispatched payload carried across the real-time channel.
#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    /// Event name, e.g. `state-update`.
    pub event: String,
    /// JSON payload for the event.
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

/// Generic snapshot broadcast on every mutation of the global session.
///
/// Clients treat this (and every other event) as a cache-invalidation hint
/// and re-fetch authoritative status rather than trusting the payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StateUpdateEvent {
    /// Current lifecycle phase.
    pub phase: PhaseDto,
    /// Globally announced scenario position.
    pub current_position: u8,
    /// Number of distinct teams currently connected.
    pub connected_count: usize,
}

/// A team connection joined the session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamConnectedEvent {
    /// Team identifier.
    pub team_id: Uuid,
    /// Team display name.
    pub team_name: String,
}

/// A team connection left the session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamDisconnectedEvent {
    /// Team identifier.
    pub team_id: Uuid,
}

/// A team was kicked by an admin, or a denylisted team attempted to join.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamKickedEvent {
    /// Team identifier.
    pub team_id: Uuid,
}

/// Advisory progress report relayed to admin subscribers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgressUpdateEvent {
    /// Team identifier.
    pub team_id: Uuid,
    /// Team's own 1-based position.
    pub current_position: u8,
    /// Team's accumulated score.
    pub total_score: u32,
    /// Whether the team has finished every scenario.
    pub is_completed: bool,
}

/// A decision was committed for a team.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecisionSubmittedEvent {
    /// Team identifier.
    pub team_id: Uuid,
    /// Scenario position the decision answered.
    pub position: u8,
    /// Score awarded.
    pub score: u32,
}

/// Error surfaced to a single connection, e.g. a rejected command.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorEvent {
    /// Human-readable message.
    pub message: String,
}
