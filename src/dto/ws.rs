use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Messages accepted from team WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TeamInboundMessage {
    /// Identify the connection as belonging to a team. Must be the first
    /// message; duplicate joins from the same team are idempotent.
    Join {
        /// Team identifier.
        team_id: Uuid,
        /// Team display name.
        team_name: String,
    },
    /// Explicitly leave the session.
    Logout {
        /// Team identifier.
        team_id: Uuid,
    },
    /// Advisory progress report; the server treats it as a hint only.
    Progress {
        /// Team identifier.
        team_id: Uuid,
        /// Team's own 1-based position.
        current_position: u8,
        /// Team's accumulated score.
        total_score: u32,
        /// Whether the team believes it has finished.
        is_completed: bool,
    },
    /// Client-side notification that a decision went through.
    DecisionNotify {
        /// Team identifier.
        team_id: Uuid,
        /// Scenario position submitted.
        position: u8,
        /// Score the client observed.
        score: u32,
    },
    /// Anything unrecognised; ignored with a warning.
    #[serde(other)]
    Unknown,
}

impl TeamInboundMessage {
    /// Parse a raw text frame.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Messages accepted from admin WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AdminInboundMessage {
    /// Start the session for every team.
    StartAll,
    /// Advance every team to the next scenario.
    AdvanceAll,
    /// End the session for every team.
    EndAll,
    /// Full reset: decisions wiped, teams rewound, denylist cleared.
    ResetAll,
    /// Kick a team and deny it until the next reset.
    Kick {
        /// Team to kick.
        team_id: Uuid,
    },
    /// Anything unrecognised; ignored with a warning.
    #[serde(other)]
    Unknown,
}

impl AdminInboundMessage {
    /// Parse a raw text frame.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
