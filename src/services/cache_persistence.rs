//! Asynchronous persistence for the in-process session cache.
//!
//! Mutations never wait on disk: they flag the cache dirty and a background
//! loop writes a debounced snapshot shortly after, plus a periodic full
//! backup. Restore order at boot is snapshot, then backup, then empty.

use std::path::Path;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::state::{SharedState, cache::SessionCache, now_ms};

/// Run the snapshot writer until the process shuts down.
pub async fn run(state: SharedState) {
    let debounce = state.config().snapshot_debounce;
    let mut backup = time::interval(state.config().backup_interval);
    backup.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; skip it so the
    // backup written at boot does not clobber a freshly restored file.
    backup.tick().await;

    loop {
        tokio::select! {
            _ = state.cache().dirty_signal().notified() => {
                // Coalesce bursts of mutations into one write.
                time::sleep(debounce).await;
                write(state.cache(), &state.config().snapshot_path, "snapshot");
            }
            _ = backup.tick() => {
                write(state.cache(), &state.config().backup_path, "backup");
            }
        }
    }
}

/// Write a final snapshot synchronously, used on graceful shutdown.
pub fn flush(state: &SharedState) {
    write(state.cache(), &state.config().snapshot_path, "snapshot");
}

fn write(cache: &SessionCache, path: &Path, kind: &str) {
    match cache.write_snapshot(path, now_ms()) {
        Ok(()) => debug!(path = %path.display(), kind, "cache persisted"),
        Err(err) => warn!(path = %path.display(), kind, error = %err, "failed to persist cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cache::{RestoreSource, SessionCache};
    use crate::dao::models::TeamEntity;
    use uuid::Uuid;

    #[test]
    fn flush_written_snapshot_restores() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("snapshot.json");
        let backup_path = dir.path().join("backup.json");

        let cache = SessionCache::new();
        let team = TeamEntity::new(Uuid::new_v4(), "alpha".into());
        cache.upsert_team(team.clone());
        write(&cache, &snapshot_path, "snapshot");

        let (restored, source) = SessionCache::restore(&snapshot_path, &backup_path);
        assert_eq!(source, RestoreSource::Snapshot);
        assert!(restored.get_team(&team.id).is_some());
    }
}
