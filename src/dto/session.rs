use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::common::PhaseDto;

/// Authoritative status returned to a team's reconciler.
///
/// This payload always governs phase and position on the client; local
/// snapshots only resolve sub-state within an active round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamStatusResponse {
    /// Current lifecycle phase.
    pub phase: PhaseDto,
    /// Globally announced scenario position.
    pub current_position: u8,
    /// Whether a scenario exists at the announced position.
    pub has_current_scenario: bool,
    /// The team's accumulated score.
    pub total_score: u32,
    /// Whether this team already submitted for the announced position.
    pub complete_current_step_for_team: bool,
    /// Countdown duration for each scenario, in seconds.
    pub time_limit_seconds: u32,
}
