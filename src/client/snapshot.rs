//! Browser-local snapshot of the client state machine.
//!
//! Written on every screen transition and on unload, read back on load and
//! reconnect. A corrupt snapshot is discarded and treated as absent state,
//! never as an error.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::client::timer::TimerSnapshot;
use crate::dto::common::PhaseDto;

/// Storage key for the session snapshot.
pub const SNAPSHOT_KEY: &str = "decision-drill.session";

/// Screens the client state machine can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Screen {
    /// Credential entry.
    Login,
    /// Waiting for the authoritative status fetch.
    Loading,
    /// Logged in, session not started yet.
    Welcome,
    /// Reading the announced scenario prompt.
    Scenario,
    /// Entering a decision, countdown running.
    Decision,
    /// Reviewing the score for the submitted decision.
    Results,
    /// Final standings after the session ended.
    Leaderboard,
    /// Every scenario answered by this team.
    Complete,
}

/// Global session state as last seen by this tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateView {
    /// Lifecycle phase.
    pub phase: PhaseDto,
    /// Globally announced scenario position.
    pub current_position: u8,
}

/// Scenario the tab was showing, kept so a reload can re-render offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioView {
    /// 1-based scenario position.
    pub position: u8,
    /// Prompt text.
    pub prompt: String,
}

/// Result data shown on the results screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsView {
    /// Position the result belongs to.
    pub position: u8,
    /// Score awarded.
    pub score: u32,
    /// Team total after the submission.
    pub total_score: u32,
}

/// Everything one tab persists between loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    /// Screen being shown when the snapshot was written.
    pub screen: Screen,
    /// Last known global session state.
    pub game_state: Option<GameStateView>,
    /// Scenario being shown, when on a round screen.
    pub current_scenario: Option<ScenarioView>,
    /// Countdown state, when a round timer is running.
    pub timer: Option<TimerSnapshot>,
    /// Result data, when on the results screen.
    pub results: Option<ResultsView>,
    /// Identifier of the tab that wrote the snapshot.
    pub tab_id: String,
    /// Write timestamp, unix milliseconds; arbitration key across tabs.
    pub timestamp_ms: i64,
}

/// Key/value persistence as the browser exposes it (localStorage shape).
pub trait SnapshotStore {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str);
    /// Remove `key`.
    fn remove(&self, key: &str);
}

/// Load and parse the session snapshot; corrupt data reads as absent.
pub fn load_snapshot(store: &dyn SnapshotStore) -> Option<ClientSnapshot> {
    let raw = store.get(SNAPSHOT_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(_) => {
            store.remove(SNAPSHOT_KEY);
            None
        }
    }
}

/// Serialize and persist the session snapshot.
pub fn save_snapshot(store: &dyn SnapshotStore, snapshot: &ClientSnapshot) {
    if let Ok(raw) = serde_json::to_string(snapshot) {
        store.set(SNAPSHOT_KEY, &raw);
    }
}

/// Drop the persisted snapshot, used on logout.
pub fn clear_snapshot(store: &dyn SnapshotStore) {
    store.remove(SNAPSHOT_KEY);
}

/// In-memory store used by tests and the native shell.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tab: &str, at: i64) -> ClientSnapshot {
        ClientSnapshot {
            screen: Screen::Decision,
            game_state: Some(GameStateView {
                phase: PhaseDto::Running,
                current_position: 2,
            }),
            current_scenario: Some(ScenarioView {
                position: 2,
                prompt: "disk is full".into(),
            }),
            timer: None,
            results: None,
            tab_id: tab.into(),
            timestamp_ms: at,
        }
    }

    #[test]
    fn snapshot_round_trips_through_store() {
        let store = MemoryStore::new();
        let original = snapshot("tab-1", 100);
        save_snapshot(&store, &original);
        assert_eq!(load_snapshot(&store), Some(original));
    }

    #[test]
    fn corrupt_snapshot_reads_as_absent_and_is_discarded() {
        let store = MemoryStore::new();
        store.set(SNAPSHOT_KEY, "{definitely not json");
        assert_eq!(load_snapshot(&store), None);
        assert_eq!(store.get(SNAPSHOT_KEY), None);
    }

    #[test]
    fn clear_removes_the_snapshot() {
        let store = MemoryStore::new();
        save_snapshot(&store, &snapshot("tab-1", 100));
        clear_snapshot(&store);
        assert_eq!(load_snapshot(&store), None);
    }
}
