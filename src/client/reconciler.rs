//! Screen reconciliation for one tab.
//!
//! Inputs in priority order: the authoritative status fetch always governs
//! phase and position; the local snapshot only picks the sub-state within an
//! active round; broker events are invalidation hints that trigger a
//! re-fetch and are never trusted for position changes. Snapshots from other
//! tabs of the same team are adopted last-writer-wins on their timestamp.

use crate::client::snapshot::{
    ClientSnapshot, GameStateView, Screen, SnapshotStore, load_snapshot, save_snapshot,
};
use crate::dto::common::PhaseDto;

/// Authoritative per-team status, as returned by the status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritativeStatus {
    /// Lifecycle phase.
    pub phase: PhaseDto,
    /// Globally announced scenario position.
    pub current_position: u8,
    /// Whether a scenario exists at the announced position.
    pub has_current_scenario: bool,
    /// Whether this team already submitted for the announced position.
    pub complete_current_step_for_team: bool,
    /// Team total score.
    pub total_score: u32,
    /// Round duration in seconds.
    pub time_limit_seconds: u32,
}

/// What the embedding shell should do after feeding the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Render this screen.
    Show(Screen),
    /// Re-fetch the authoritative status, then reconcile again.
    Refetch,
}

/// Per-tab reconciliation state.
#[derive(Debug)]
pub struct Reconciler {
    tab_id: String,
    screen: Screen,
    snapshot: Option<ClientSnapshot>,
    last_applied_ms: i64,
}

impl Reconciler {
    /// Create a reconciler for a fresh tab, restoring any persisted snapshot.
    pub fn new(tab_id: impl Into<String>, store: &dyn SnapshotStore) -> Self {
        let snapshot = load_snapshot(store);
        let (screen, last_applied_ms) = snapshot
            .as_ref()
            .map(|s| (s.screen, s.timestamp_ms))
            .unwrap_or((Screen::Login, 0));
        Self {
            tab_id: tab_id.into(),
            screen,
            snapshot,
            last_applied_ms,
        }
    }

    /// Screen currently shown by this tab.
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Reconcile against a fresh authoritative status.
    ///
    /// The status always wins on phase and position. The local snapshot is
    /// consulted only to choose between the round sub-states for the
    /// announced position.
    pub fn reconcile(&mut self, status: &AuthoritativeStatus) -> Screen {
        let screen = match status.phase {
            PhaseDto::Waiting => Screen::Welcome,
            PhaseDto::Ended => Screen::Leaderboard,
            PhaseDto::Running => {
                if !status.has_current_scenario {
                    Screen::Loading
                } else if status.complete_current_step_for_team {
                    // A team that finished every scenario stays on the
                    // completion screen until the session phase changes.
                    if self.screen == Screen::Complete {
                        Screen::Complete
                    } else {
                        Screen::Results
                    }
                } else {
                    self.round_sub_state(status.current_position)
                }
            }
        };

        self.screen = screen;
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.screen = screen;
            snapshot.game_state = Some(GameStateView {
                phase: status.phase,
                current_position: status.current_position,
            });
        }
        screen
    }

    /// A broker event arrived. Events are cache-invalidation hints only.
    pub fn on_broker_event(&self) -> ReconcileAction {
        ReconcileAction::Refetch
    }

    /// The authoritative fetch failed. Fall back to the last valid local
    /// snapshot without fabricating phase or position; the shell keeps
    /// retrying in the background.
    pub fn on_fetch_failure(&self) -> ReconcileAction {
        match &self.snapshot {
            Some(snapshot) => ReconcileAction::Show(snapshot.screen),
            None => ReconcileAction::Show(Screen::Loading),
        }
    }

    /// Record a local screen transition and persist it.
    pub fn transition(&mut self, screen: Screen, store: &dyn SnapshotStore, now_ms: i64) {
        self.screen = screen;
        let snapshot = ClientSnapshot {
            screen,
            game_state: self.snapshot.as_ref().and_then(|s| s.game_state),
            current_scenario: self
                .snapshot
                .as_ref()
                .and_then(|s| s.current_scenario.clone()),
            timer: self.snapshot.as_ref().and_then(|s| s.timer),
            results: self.snapshot.as_ref().and_then(|s| s.results),
            tab_id: self.tab_id.clone(),
            timestamp_ms: now_ms,
        };
        save_snapshot(store, &snapshot);
        self.last_applied_ms = now_ms;
        self.snapshot = Some(snapshot);
    }

    /// A storage notification delivered another tab's snapshot.
    ///
    /// Adopt it only if it is strictly newer than the last applied write and
    /// came from a different tab. Last writer wins; best effort only.
    pub fn apply_remote_snapshot(&mut self, incoming: ClientSnapshot) -> bool {
        if incoming.tab_id == self.tab_id || incoming.timestamp_ms <= self.last_applied_ms {
            return false;
        }
        self.screen = incoming.screen;
        self.last_applied_ms = incoming.timestamp_ms;
        self.snapshot = Some(incoming);
        true
    }

    fn round_sub_state(&self, position: u8) -> Screen {
        let local = self.snapshot.as_ref().filter(|snapshot| {
            snapshot
                .current_scenario
                .as_ref()
                .is_some_and(|scenario| scenario.position == position)
        });
        match local.map(|snapshot| snapshot.screen) {
            Some(screen @ (Screen::Scenario | Screen::Decision | Screen::Results)) => screen,
            _ => Screen::Scenario,
        }
    }
}
