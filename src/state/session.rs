//! Global session lifecycle state machine.
//!
//! Admin transitions are planned first, the durable write runs between plan
//! and apply, and a failed write aborts the plan, so the in-memory machine
//! and the durable store never diverge.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::MAX_SCENARIO_POSITION;
use crate::dao::models::SessionEntity;

/// Global session lifecycle phase, admin-controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Session has not started; teams can join and wait.
    Waiting,
    /// Scenarios are being played; submissions are accepted.
    Running,
    /// Session finished; leaderboard is shown.
    Ended,
}

impl SessionPhase {
    /// Lowercase name used for persistence and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Waiting => "waiting",
            SessionPhase::Running => "running",
            SessionPhase::Ended => "ended",
        }
    }

    /// Parse the persisted lowercase name; unknown values fall back to waiting.
    pub fn parse(value: &str) -> Self {
        match value {
            "running" => SessionPhase::Running,
            "ended" => SessionPhase::Ended,
            _ => SessionPhase::Waiting,
        }
    }
}

/// Combined lifecycle phase and announced scenario position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Globally announced scenario position (0 = none yet).
    pub position: u8,
}

impl SessionState {
    /// Initial state: waiting, nothing announced.
    pub fn waiting() -> Self {
        Self {
            phase: SessionPhase::Waiting,
            position: 0,
        }
    }
}

impl From<SessionEntity> for SessionState {
    fn from(entity: SessionEntity) -> Self {
        Self {
            phase: SessionPhase::parse(&entity.phase),
            position: entity.current_position,
        }
    }
}

impl From<SessionState> for SessionEntity {
    fn from(state: SessionState) -> Self {
        Self {
            phase: state.phase.as_str().to_string(),
            current_position: state.position,
        }
    }
}

/// Admin events that can be applied to the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start the session: waiting → running at position 1.
    Start,
    /// Advance to the next scenario while running.
    Advance,
    /// Jump forward to a specific position while running (monotonic).
    Seek(u8),
    /// End the session: running → ended.
    End,
    /// Full reset from any phase back to waiting at position 0.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// State the machine was in when the invalid event was received.
    pub from: SessionState,
    /// The event that cannot be applied from this state.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current state.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Machine state changed since the plan was created.
    StateMismatch {
        /// State when the plan was created.
        expected: SessionState,
        /// Current state.
        actual: SessionState,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not yet been applied.
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// State the machine is currently in.
    pub from: SessionState,
    /// State the machine will transition to.
    pub to: SessionState,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Point-in-time view of the machine including any pending transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current state.
    pub state: SessionState,
    /// Transition count (increments on each applied transition).
    pub version: usize,
    /// Target of the pending transition, if one is planned.
    pub pending: Option<SessionState>,
    /// When the pending transition was planned, if one is in flight.
    pub pending_since: Option<Instant>,
}

/// Session machine enforcing the waiting/running/ended lifecycle and
/// monotonic position advancement.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            state: SessionState::waiting(),
            version: 0,
            pending: None,
        }
    }
}

impl SessionMachine {
    /// Create a machine initialised in the waiting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a machine from the state persisted in the durable store.
    pub fn from_state(state: SessionState) -> Self {
        Self {
            state,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Create a snapshot of the machine including any pending plan target.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
            pending_since: self.pending.as_ref().map(|plan| plan.pending_since),
        }
    }

    /// Plan a transition by validating the event against the current state.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.state,
            to: next,
            event,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan);
        Ok(plan)
    }

    /// Apply a planned transition, returning the new state.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionState, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.state != plan.from {
            return Err(ApplyError::StateMismatch {
                expected: plan.from,
                actual: self.state,
            });
        }

        self.state = plan.to;
        self.version += 1;
        Ok(self.state)
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute the target state for an event if the transition is valid.
    ///
    /// Positions only ever move forward here; the single exception is
    /// [`SessionEvent::Reset`], which zeroes everything.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionState, InvalidTransition> {
        let next = match (self.state.phase, event) {
            (SessionPhase::Waiting, SessionEvent::Start) => SessionState {
                phase: SessionPhase::Running,
                position: 1,
            },
            (SessionPhase::Running, SessionEvent::Advance)
                if self.state.position < MAX_SCENARIO_POSITION =>
            {
                SessionState {
                    phase: SessionPhase::Running,
                    position: self.state.position + 1,
                }
            }
            (SessionPhase::Running, SessionEvent::Seek(target))
                if target >= self.state.position && target <= MAX_SCENARIO_POSITION =>
            {
                SessionState {
                    phase: SessionPhase::Running,
                    position: target,
                }
            }
            (SessionPhase::Running, SessionEvent::End) => SessionState {
                phase: SessionPhase::Ended,
                position: self.state.position,
            },
            (_, SessionEvent::Reset) => SessionState::waiting(),
            (_, event) => {
                return Err(InvalidTransition {
                    from: self.state,
                    event,
                });
            }
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionMachine, event: SessionEvent) -> SessionState {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_waiting() {
        let sm = SessionMachine::new();
        assert_eq!(sm.state(), SessionState::waiting());
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut sm = SessionMachine::new();

        let running = apply(&mut sm, SessionEvent::Start);
        assert_eq!(running.phase, SessionPhase::Running);
        assert_eq!(running.position, 1);

        assert_eq!(apply(&mut sm, SessionEvent::Advance).position, 2);
        assert_eq!(apply(&mut sm, SessionEvent::Seek(5)).position, 5);

        let ended = apply(&mut sm, SessionEvent::End);
        assert_eq!(ended.phase, SessionPhase::Ended);
        assert_eq!(ended.position, 5);

        assert_eq!(apply(&mut sm, SessionEvent::Reset), SessionState::waiting());
    }

    #[test]
    fn start_while_running_is_rejected() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::Start);

        let err = sm.plan(SessionEvent::Start).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from.phase, SessionPhase::Running);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn position_never_moves_backwards_except_reset() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::Start);
        apply(&mut sm, SessionEvent::Seek(4));

        assert!(matches!(
            sm.plan(SessionEvent::Seek(2)),
            Err(PlanError::InvalidTransition(_))
        ));

        assert_eq!(apply(&mut sm, SessionEvent::Reset).position, 0);
    }

    #[test]
    fn advance_stops_at_final_scenario() {
        let mut sm = SessionMachine::new();
        apply(&mut sm, SessionEvent::Start);
        apply(&mut sm, SessionEvent::Seek(MAX_SCENARIO_POSITION));

        assert!(matches!(
            sm.plan(SessionEvent::Advance),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn reset_is_valid_from_every_phase() {
        let mut sm = SessionMachine::new();
        assert_eq!(apply(&mut sm, SessionEvent::Reset), SessionState::waiting());

        apply(&mut sm, SessionEvent::Start);
        assert_eq!(apply(&mut sm, SessionEvent::Reset), SessionState::waiting());

        apply(&mut sm, SessionEvent::Start);
        apply(&mut sm, SessionEvent::End);
        assert_eq!(apply(&mut sm, SessionEvent::Reset), SessionState::waiting());
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = SessionMachine::new();
        let plan = sm.plan(SessionEvent::Start).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.snapshot().pending.is_none());
        assert_eq!(sm.state(), SessionState::waiting());
    }

    #[test]
    fn planning_twice_without_apply_is_rejected() {
        let mut sm = SessionMachine::new();
        sm.plan(SessionEvent::Start).unwrap();
        assert!(matches!(
            sm.plan(SessionEvent::Reset),
            Err(PlanError::AlreadyPending)
        ));
    }

    #[test]
    fn snapshot_exposes_the_pending_plan_age() {
        let mut sm = SessionMachine::new();
        assert!(sm.snapshot().pending_since.is_none());

        let plan = sm.plan(SessionEvent::Start).unwrap();
        let snapshot = sm.snapshot();
        assert_eq!(snapshot.pending, Some(plan.to));
        assert!(snapshot.pending_since.is_some());

        sm.apply(plan.id).unwrap();
        assert!(sm.snapshot().pending_since.is_none());
    }
}
