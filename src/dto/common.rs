use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::session::{SessionPhase, SessionState};

/// Wire representation of the session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PhaseDto {
    /// Session has not started yet.
    Waiting,
    /// Scenarios are being played.
    Running,
    /// Session finished.
    Ended,
}

impl From<SessionPhase> for PhaseDto {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Waiting => PhaseDto::Waiting,
            SessionPhase::Running => PhaseDto::Running,
            SessionPhase::Ended => PhaseDto::Ended,
        }
    }
}

impl From<PhaseDto> for SessionPhase {
    fn from(phase: PhaseDto) -> Self {
        match phase {
            PhaseDto::Waiting => SessionPhase::Waiting,
            PhaseDto::Running => SessionPhase::Running,
            PhaseDto::Ended => SessionPhase::Ended,
        }
    }
}

/// Shared snapshot of the global session used by admin reads and events.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Current lifecycle phase.
    pub phase: PhaseDto,
    /// Globally announced scenario position.
    pub current_position: u8,
    /// Number of distinct teams currently connected.
    pub connected_count: usize,
}

impl SessionSnapshot {
    /// Build a snapshot from the machine state plus live presence.
    pub fn new(state: SessionState, connected_count: usize) -> Self {
        Self {
            phase: state.phase.into(),
            current_position: state.position,
            connected_count,
        }
    }
}
