use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted representation of a team row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamEntity {
    /// Primary key of the team.
    pub id: Uuid,
    /// Display name, unique across teams.
    pub name: String,
    /// Opaque credential blob (hashing lives outside this crate).
    pub credential: String,
    /// 1-based position of the next scenario; 8 denotes completion.
    pub current_position: u8,
    /// Accumulated score, monotonic except on full reset.
    pub total_score: u32,
}

impl TeamEntity {
    /// Build a fresh team starting at position 1 with a zero score.
    pub fn new(id: Uuid, name: String) -> Self {
        Self {
            id,
            name,
            credential: String::new(),
            current_position: 1,
            total_score: 0,
        }
    }

    /// Whether the team has submitted a decision for every scenario.
    pub fn is_complete(&self) -> bool {
        self.current_position > super::MAX_SCENARIO_POSITION
    }
}

/// Immutable reference data for a single scenario step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioEntity {
    /// 1-based position within the session (1..=7).
    pub position: u8,
    /// Situation text presented to the teams.
    pub prompt: String,
    /// Reference answer used by the scoring engine.
    pub reference_answer: String,
    /// Reference rationale used by the scoring engine.
    pub reference_rationale: String,
    /// Maximum score awardable for this scenario.
    pub max_score: u32,
}

/// Persisted decision row; unique per `(team_id, position)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntity {
    /// Team that submitted the decision.
    pub team_id: Uuid,
    /// Scenario position the decision answers.
    pub position: u8,
    /// Decision text; may be empty on the auto-submit path.
    pub decision: String,
    /// Rationale text; may be empty on the auto-submit path.
    pub rationale: String,
    /// Score awarded by the scoring engine at submission time.
    pub score: u32,
    /// Submission timestamp, unix milliseconds.
    pub created_at_ms: i64,
}

/// Persisted global session row (single row table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntity {
    /// Lifecycle phase stored as its lowercase name.
    pub phase: String,
    /// Globally announced scenario position (0 = none announced yet).
    pub current_position: u8,
}

impl Default for SessionEntity {
    fn default() -> Self {
        Self {
            phase: "waiting".into(),
            current_position: 0,
        }
    }
}
