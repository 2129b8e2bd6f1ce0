use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::common::{PhaseDto, SessionSnapshot};
use crate::state::cache::TeamProgress;

/// Request to jump the announced scenario position forward.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PositionUpdateRequest {
    /// Target position; must not move backwards (positions are monotonic
    /// except on reset).
    #[validate(range(max = 7, message = "position must be at most 7"))]
    pub position: u8,
}

/// Acknowledgement returned by admin lifecycle actions.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Status marker, always `ok`.
    pub status: String,
    /// Session state after the action.
    pub session: SessionSnapshot,
}

impl ActionResponse {
    /// Build the standard acknowledgement.
    pub fn ok(session: SessionSnapshot) -> Self {
        Self {
            status: "ok".to_string(),
            session,
        }
    }
}

/// Leaderboard-ordered team summary for admin reads.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    /// Team identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// 1-based next scenario position; 8 denotes completion.
    pub current_position: u8,
    /// Accumulated score.
    pub total_score: u32,
    /// Number of recorded decisions.
    pub decisions_recorded: usize,
    /// Whether the team has at least one live connection.
    pub connected: bool,
    /// Whether the team is on the kicked denylist.
    pub kicked: bool,
}

impl TeamSummary {
    /// Combine cached progress with presence flags.
    pub fn from_progress(progress: TeamProgress, connected: bool, kicked: bool) -> Self {
        Self {
            id: progress.id,
            name: progress.name,
            current_position: progress.current_position,
            total_score: progress.total_score,
            decisions_recorded: progress.decisions.len(),
            connected,
            kicked,
        }
    }
}

/// Admin view of the session including phase detail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminSessionResponse {
    /// Current session snapshot.
    pub session: SessionSnapshot,
    /// Whether a lifecycle transition is mid-flight.
    pub transition_pending: bool,
    /// Milliseconds the pending transition has been in flight, when there is
    /// one. A large value means a durable write is stuck.
    pub transition_pending_ms: Option<u64>,
    /// Phase echoed separately for convenience.
    pub phase: PhaseDto,
}
