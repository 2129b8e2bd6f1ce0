use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Submission payload for a team's decision on one scenario.
///
/// Decision and rationale may both be empty: the auto-submit-on-timeout path
/// sends whatever the team had typed, possibly nothing, and empty input is
/// valid (it simply scores zero).
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SubmitDecisionRequest {
    /// Scenario position this decision answers.
    #[validate(range(min = 1, max = 7, message = "position must be between 1 and 7"))]
    pub position: u8,
    /// Decision text.
    #[validate(length(max = 4000, message = "decision text is too long"))]
    #[serde(default)]
    pub decision: String,
    /// Rationale text.
    #[validate(length(max = 4000, message = "rationale text is too long"))]
    #[serde(default)]
    pub rationale: String,
}

/// Outcome of a committed decision submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitDecisionResponse {
    /// Score awarded for this decision.
    pub score: u32,
    /// Team's new 1-based position (submitted position + 1).
    pub new_position: u8,
    /// Team's new accumulated score.
    pub new_total_score: u32,
    /// Whether the team has now finished every scenario.
    pub is_complete: bool,
}
