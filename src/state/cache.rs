//! In-process session cache used for real-time fan-out.
//!
//! Rebuilt from the durable store at boot, mutated synchronously on every
//! committed change, and persisted asynchronously by the debounced snapshot
//! writer in `services::cache_persistence`. Presence registries are
//! deliberately excluded from persistence: they are rebuilt purely from live
//! connections.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use dashmap::{DashMap, DashSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use crate::dao::models::{DecisionEntity, TeamEntity};
use crate::state::session::SessionState;

/// Per-team view of a single recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSummary {
    /// Scenario position the decision answered.
    pub position: u8,
    /// Score awarded at submission time.
    pub score: u32,
    /// Submission timestamp, unix milliseconds.
    pub submitted_at_ms: i64,
}

impl From<&DecisionEntity> for DecisionSummary {
    fn from(entity: &DecisionEntity) -> Self {
        Self {
            position: entity.position,
            score: entity.score,
            submitted_at_ms: entity.created_at_ms,
        }
    }
}

/// Cached, read-mostly mirror of a team plus its decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamProgress {
    /// Team identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// 1-based next scenario position; 8 denotes completion.
    pub current_position: u8,
    /// Accumulated score.
    pub total_score: u32,
    /// Recorded decisions keyed by position, in submission order.
    pub decisions: IndexMap<u8, DecisionSummary>,
}

impl From<TeamEntity> for TeamProgress {
    fn from(entity: TeamEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            current_position: entity.current_position,
            total_score: entity.total_score,
            decisions: IndexMap::new(),
        }
    }
}

/// Ephemeral record of a live client connection. Never persisted.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    /// Team the connection belongs to.
    pub team_id: Uuid,
    /// Transport-level connection identifier.
    pub transport_id: String,
    /// Last activity timestamp, unix milliseconds.
    pub last_seen_ms: i64,
}

/// Serialized form of the persisted cache state.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// When the snapshot was written, unix milliseconds.
    pub saved_at_ms: i64,
    /// Global session state at snapshot time.
    pub session: SessionState,
    /// Cached team progress records.
    pub teams: Vec<TeamProgress>,
    /// Denylisted team identifiers.
    pub kicked: Vec<Uuid>,
}

/// Which source the boot restore actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// The latest snapshot parsed cleanly.
    Snapshot,
    /// The snapshot was missing or corrupt; the periodic backup was used.
    Backup,
    /// Neither file was readable; started empty.
    Empty,
}

/// In-process cache of team progress, presence, and the global session state.
pub struct SessionCache {
    teams: DashMap<Uuid, TeamProgress>,
    connected: DashMap<String, ConnectedClient>,
    admins: DashSet<String>,
    kicked: DashSet<Uuid>,
    session: RwLock<SessionState>,
    dirty: Notify,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    /// Create an empty cache in the waiting state.
    pub fn new() -> Self {
        Self {
            teams: DashMap::new(),
            connected: DashMap::new(),
            admins: DashSet::new(),
            kicked: DashSet::new(),
            session: RwLock::new(SessionState::waiting()),
            dirty: Notify::new(),
        }
    }

    /// Restore a cache from disk: latest snapshot first, backup second,
    /// empty as the last resort. Presence sets always start empty.
    pub fn restore(snapshot_path: &Path, backup_path: &Path) -> (Self, RestoreSource) {
        if let Some(snapshot) = read_snapshot(snapshot_path) {
            return (Self::from_snapshot(snapshot), RestoreSource::Snapshot);
        }
        if let Some(snapshot) = read_snapshot(backup_path) {
            return (Self::from_snapshot(snapshot), RestoreSource::Backup);
        }
        (Self::new(), RestoreSource::Empty)
    }

    fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let cache = Self::new();
        for team in snapshot.teams {
            cache.teams.insert(team.id, team);
        }
        for team_id in snapshot.kicked {
            cache.kicked.insert(team_id);
        }
        *cache.session_mut() = snapshot.session;
        cache
    }

    /// Overwrite cached team fields with the durable store's roster.
    ///
    /// The store is the source of truth after a restart; anything the
    /// snapshot knew that the store does not is dropped.
    pub fn merge_roster(&self, roster: Vec<TeamEntity>) {
        let authoritative: Vec<Uuid> = roster.iter().map(|team| team.id).collect();
        self.teams
            .retain(|id, _| authoritative.contains(id));
        for entity in roster {
            match self.teams.get_mut(&entity.id) {
                Some(mut cached) => {
                    cached.name = entity.name;
                    cached.current_position = entity.current_position;
                    cached.total_score = entity.total_score;
                }
                None => {
                    self.teams.insert(entity.id, entity.into());
                }
            }
        }
        self.mark_dirty();
    }

    /// Rebuild every team's decision history from store rows.
    pub fn rebuild_decisions(&self, decisions: Vec<DecisionEntity>) {
        for mut cached in self.teams.iter_mut() {
            cached.decisions.clear();
        }
        for entity in decisions {
            if let Some(mut cached) = self.teams.get_mut(&entity.team_id) {
                cached
                    .decisions
                    .insert(entity.position, DecisionSummary::from(&entity));
            }
        }
        self.mark_dirty();
    }

    /// Fetch a team's cached progress.
    pub fn get_team(&self, id: &Uuid) -> Option<TeamProgress> {
        self.teams.get(id).map(|entry| entry.value().clone())
    }

    /// All cached teams, best score first, ties by name.
    pub fn all_teams(&self) -> Vec<TeamProgress> {
        let mut teams: Vec<TeamProgress> = self
            .teams
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        teams.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        teams
    }

    /// Upsert a team, merging so position and score never move backwards.
    pub fn upsert_team(&self, entity: TeamEntity) {
        match self.teams.get_mut(&entity.id) {
            Some(mut cached) => {
                cached.name = entity.name;
                cached.current_position = cached.current_position.max(entity.current_position);
                cached.total_score = cached.total_score.max(entity.total_score);
            }
            None => {
                self.teams.insert(entity.id, entity.into());
            }
        }
        self.mark_dirty();
    }

    /// Record a committed decision: append history, advance position/score.
    pub fn add_decision(
        &self,
        team_id: Uuid,
        summary: DecisionSummary,
        new_position: u8,
        new_total_score: u32,
    ) {
        if let Some(mut cached) = self.teams.get_mut(&team_id) {
            cached.decisions.insert(summary.position, summary);
            cached.current_position = cached.current_position.max(new_position);
            cached.total_score = cached.total_score.max(new_total_score);
        }
        self.mark_dirty();
    }

    /// Current cached session state.
    pub fn session_state(&self) -> SessionState {
        *self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the cached session phase/position.
    pub fn update_game_state(&self, state: SessionState) {
        *self.session_mut() = state;
        self.mark_dirty();
    }

    /// Register a live team connection; last join wins for presence.
    /// Presence is never persisted, so no snapshot write is scheduled.
    pub fn client_connected(&self, client: ConnectedClient) {
        self.connected.insert(client.transport_id.clone(), client);
    }

    /// Remove a live team connection by its transport identifier.
    pub fn client_disconnected(&self, transport_id: &str) -> Option<ConnectedClient> {
        self.connected.remove(transport_id).map(|(_, v)| v)
    }

    /// Number of distinct teams with at least one live connection.
    pub fn connected_team_count(&self) -> usize {
        let mut seen: Vec<Uuid> = self
            .connected
            .iter()
            .map(|entry| entry.value().team_id)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Transport identifiers of every live connection for a team.
    pub fn connections_for_team(&self, team_id: &Uuid) -> Vec<String> {
        self.connected
            .iter()
            .filter(|entry| entry.value().team_id == *team_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Register an admin connection for presence purposes.
    pub fn admin_connected(&self, transport_id: String) {
        self.admins.insert(transport_id);
    }

    /// Remove an admin connection.
    pub fn admin_disconnected(&self, transport_id: &str) {
        self.admins.remove(transport_id);
    }

    /// Place a team on the denylist until the next full reset.
    pub fn kick_team(&self, team_id: Uuid) {
        self.kicked.insert(team_id);
        self.mark_dirty();
    }

    /// Whether a team is currently denylisted.
    pub fn is_kicked(&self, team_id: &Uuid) -> bool {
        self.kicked.contains(team_id)
    }

    /// Full reset mirror: rewind teams, clear histories and the denylist.
    pub fn reset(&self) {
        for mut cached in self.teams.iter_mut() {
            cached.current_position = 1;
            cached.total_score = 0;
            cached.decisions.clear();
        }
        self.kicked.clear();
        *self.session_mut() = SessionState::waiting();
        self.mark_dirty();
    }

    /// Build the serializable snapshot. Presence sets are excluded.
    pub fn snapshot(&self, now_ms: i64) -> CacheSnapshot {
        CacheSnapshot {
            saved_at_ms: now_ms,
            session: self.session_state(),
            teams: self
                .teams
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            kicked: self.kicked.iter().map(|entry| *entry.key()).collect(),
        }
    }

    /// Serialize the snapshot and write it atomically (temp file + rename).
    pub fn write_snapshot(&self, path: &Path, now_ms: i64) -> io::Result<()> {
        let snapshot = self.snapshot(now_ms);
        let payload = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, path)
    }

    /// Notifier signalled whenever persisted state mutates.
    pub fn dirty_signal(&self) -> &Notify {
        &self.dirty
    }

    fn mark_dirty(&self) {
        self.dirty.notify_one();
    }

    fn session_mut(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read and parse a snapshot file, returning `None` on any failure.
fn read_snapshot(path: &Path) -> Option<CacheSnapshot> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read cache snapshot");
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cache snapshot is corrupt; skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::SessionPhase;

    fn entity(name: &str) -> TeamEntity {
        TeamEntity::new(Uuid::new_v4(), name.to_string())
    }

    #[test]
    fn upsert_merge_never_moves_progress_backwards() {
        let cache = SessionCache::new();
        let mut team = entity("alpha");
        team.current_position = 4;
        team.total_score = 30;
        cache.upsert_team(team.clone());

        let mut stale = team.clone();
        stale.current_position = 2;
        stale.total_score = 10;
        cache.upsert_team(stale);

        let cached = cache.get_team(&team.id).unwrap();
        assert_eq!(cached.current_position, 4);
        assert_eq!(cached.total_score, 30);
    }

    #[test]
    fn add_decision_updates_history_and_progress() {
        let cache = SessionCache::new();
        let team = entity("bravo");
        cache.upsert_team(team.clone());

        cache.add_decision(
            team.id,
            DecisionSummary {
                position: 3,
                score: 12,
                submitted_at_ms: 1,
            },
            4,
            12,
        );

        let cached = cache.get_team(&team.id).unwrap();
        assert_eq!(cached.current_position, 4);
        assert_eq!(cached.total_score, 12);
        assert_eq!(cached.decisions.get(&3).unwrap().score, 12);
    }

    #[test]
    fn presence_churn_does_not_schedule_snapshot_writes() {
        use futures::FutureExt;

        let cache = SessionCache::new();
        cache.client_connected(ConnectedClient {
            team_id: Uuid::new_v4(),
            transport_id: "t-1".to_string(),
            last_seen_ms: 1,
        });
        cache.client_disconnected("t-1");
        assert!(cache.dirty_signal().notified().now_or_never().is_none());

        // Persisted state still flags the cache dirty.
        cache.upsert_team(entity("alpha"));
        assert!(cache.dirty_signal().notified().now_or_never().is_some());
    }

    #[test]
    fn reset_rewinds_teams_and_clears_denylist() {
        let cache = SessionCache::new();
        let team = entity("charlie");
        cache.upsert_team(team.clone());
        cache.add_decision(
            team.id,
            DecisionSummary {
                position: 1,
                score: 15,
                submitted_at_ms: 1,
            },
            2,
            15,
        );
        cache.kick_team(team.id);
        cache.update_game_state(SessionState {
            phase: SessionPhase::Running,
            position: 3,
        });

        cache.reset();

        let cached = cache.get_team(&team.id).unwrap();
        assert_eq!(cached.current_position, 1);
        assert_eq!(cached.total_score, 0);
        assert!(cached.decisions.is_empty());
        assert!(!cache.is_kicked(&team.id));
        assert_eq!(cache.session_state(), SessionState::waiting());
    }

    #[test]
    fn snapshot_excludes_presence() {
        let cache = SessionCache::new();
        cache.client_connected(ConnectedClient {
            team_id: Uuid::new_v4(),
            transport_id: "conn-1".into(),
            last_seen_ms: 0,
        });
        cache.admin_connected("admin-1".into());

        let snapshot = cache.snapshot(0);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("conn-1"));
        assert!(!json.contains("admin-1"));
    }

    #[test]
    fn restore_prefers_snapshot_then_backup_then_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snapshot.json");
        let backup_path = dir.path().join("backup.json");

        let cache = SessionCache::new();
        let team = entity("delta");
        cache.upsert_team(team.clone());
        cache.write_snapshot(&backup_path, 10).unwrap();

        // Corrupt latest snapshot forces the backup path.
        std::fs::write(&snapshot_path, "{not json").unwrap();
        let (restored, source) = SessionCache::restore(&snapshot_path, &backup_path);
        assert_eq!(source, RestoreSource::Backup);
        assert!(restored.get_team(&team.id).is_some());

        // Both unreadable starts empty.
        std::fs::write(&backup_path, "also corrupt").unwrap();
        let (empty, source) = SessionCache::restore(&snapshot_path, &backup_path);
        assert_eq!(source, RestoreSource::Empty);
        assert!(empty.all_teams().is_empty());
    }

    #[test]
    fn connected_team_count_is_distinct_by_team() {
        let cache = SessionCache::new();
        let team = Uuid::new_v4();
        for transport in ["tab-1", "tab-2"] {
            cache.client_connected(ConnectedClient {
                team_id: team,
                transport_id: transport.into(),
                last_seen_ms: 0,
            });
        }
        cache.client_connected(ConnectedClient {
            team_id: Uuid::new_v4(),
            transport_id: "other".into(),
            last_seen_ms: 0,
        });

        assert_eq!(cache.connected_team_count(), 2);
        cache.client_disconnected("tab-1");
        assert_eq!(cache.connected_team_count(), 2);
        cache.client_disconnected("tab-2");
        assert_eq!(cache.connected_team_count(), 1);
    }

    #[test]
    fn merge_roster_defers_to_store_values() {
        let cache = SessionCache::new();
        let mut stale = entity("echo");
        stale.total_score = 99;
        cache.upsert_team(stale.clone());

        let mut authoritative = stale.clone();
        authoritative.total_score = 20;
        authoritative.current_position = 3;
        cache.merge_roster(vec![authoritative]);

        let cached = cache.get_team(&stale.id).unwrap();
        assert_eq!(cached.total_score, 20);
        assert_eq!(cached.current_position, 3);
    }
}
