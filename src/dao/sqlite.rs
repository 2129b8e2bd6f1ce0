//! SQLite backend for the [`DecisionStore`] abstraction.
//!
//! A single connection guarded by a mutex serves the whole process; queries
//! run on the blocking thread pool so the async runtime never stalls on disk
//! I/O. The `(team_id, position)` primary key on `decisions` is the
//! cross-process idempotence guard; the existence check inside
//! [`SqliteStore::record_decision`] is only a fast path.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::dao::DecisionStore;
use crate::dao::models::{DecisionEntity, ScenarioEntity, SessionEntity, TeamEntity};
use crate::dao::storage::{StorageError, StorageResult};

const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS teams (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    credential TEXT NOT NULL DEFAULT '',
    current_position INTEGER NOT NULL DEFAULT 1,
    total_score INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS scenarios (
    position INTEGER PRIMARY KEY,
    prompt TEXT NOT NULL,
    reference_answer TEXT NOT NULL,
    reference_rationale TEXT NOT NULL,
    max_score INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS decisions (
    team_id TEXT NOT NULL REFERENCES teams(id),
    position INTEGER NOT NULL,
    decision TEXT NOT NULL,
    rationale TEXT NOT NULL,
    score INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL,
    PRIMARY KEY (team_id, position)
);
CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    phase TEXT NOT NULL,
    current_position INTEGER NOT NULL
);
INSERT OR IGNORE INTO session (id, phase, current_position) VALUES (1, 'waiting', 0);
";

/// SQLite-backed [`DecisionStore`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .map_err(|err| map_err("opening database", err))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| map_err("enabling WAL", err))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database; used by tests.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| map_err("opening in-memory database", err))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| map_err("setting busy timeout", err))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|err| map_err("enabling foreign keys", err))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| map_err("creating schema", err))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    fn run<T, F>(&self, context: &'static str, work: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
                work(&mut guard)
            })
            .await
            .map_err(|err| StorageError::unavailable(format!("{context}: worker failed"), err))?
        })
    }
}

impl DecisionStore for SqliteStore {
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        self.run("listing teams", |conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, credential, current_position, total_score FROM teams ORDER BY name")
                .map_err(|err| map_err("listing teams", err))?;
            let rows = stmt
                .query_map([], team_from_row)
                .map_err(|err| map_err("listing teams", err))?;
            rows.map(|row| {
                row.map_err(|err| map_err("listing teams", err))
                    .and_then(validate_team)
            })
            .collect()
        })
    }

    fn find_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        self.run("finding team", move |conn| {
            conn.query_row(
                "SELECT id, name, credential, current_position, total_score FROM teams WHERE id = ?1",
                params![id.to_string()],
                team_from_row,
            )
            .optional()
            .map_err(|err| map_err("finding team", err))?
            .map(validate_team)
            .transpose()
        })
    }

    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        self.run("finding team by name", move |conn| {
            conn.query_row(
                "SELECT id, name, credential, current_position, total_score FROM teams WHERE name = ?1",
                params![name],
                team_from_row,
            )
            .optional()
            .map_err(|err| map_err("finding team by name", err))?
            .map(validate_team)
            .transpose()
        })
    }

    fn upsert_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run("upserting team", move |conn| {
            conn.execute(
                "INSERT INTO teams (id, name, credential, current_position, total_score)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     credential = excluded.credential,
                     current_position = MAX(teams.current_position, excluded.current_position),
                     total_score = MAX(teams.total_score, excluded.total_score)",
                params![
                    team.id.to_string(),
                    team.name,
                    team.credential,
                    team.current_position,
                    team.total_score,
                ],
            )
            .map_err(|err| map_err("upserting team", err))?;
            Ok(())
        })
    }

    fn find_scenario(
        &self,
        position: u8,
    ) -> BoxFuture<'static, StorageResult<Option<ScenarioEntity>>> {
        self.run("finding scenario", move |conn| {
            conn.query_row(
                "SELECT position, prompt, reference_answer, reference_rationale, max_score
                 FROM scenarios WHERE position = ?1",
                params![position],
                scenario_from_row,
            )
            .optional()
            .map_err(|err| map_err("finding scenario", err))
        })
    }

    fn list_scenarios(&self) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>> {
        self.run("listing scenarios", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT position, prompt, reference_answer, reference_rationale, max_score
                     FROM scenarios ORDER BY position",
                )
                .map_err(|err| map_err("listing scenarios", err))?;
            let rows = stmt
                .query_map([], scenario_from_row)
                .map_err(|err| map_err("listing scenarios", err))?;
            rows.map(|row| row.map_err(|err| map_err("listing scenarios", err)))
                .collect()
        })
    }

    fn replace_scenarios(
        &self,
        scenarios: Vec<ScenarioEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run("replacing scenarios", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| map_err("replacing scenarios", err))?;
            tx.execute("DELETE FROM scenarios", [])
                .map_err(|err| map_err("replacing scenarios", err))?;
            for scenario in scenarios {
                tx.execute(
                    "INSERT INTO scenarios
                         (position, prompt, reference_answer, reference_rationale, max_score)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        scenario.position,
                        scenario.prompt,
                        scenario.reference_answer,
                        scenario.reference_rationale,
                        scenario.max_score,
                    ],
                )
                .map_err(|err| map_err("replacing scenarios", err))?;
            }
            tx.commit().map_err(|err| map_err("replacing scenarios", err))
        })
    }

    fn find_decision(
        &self,
        team_id: Uuid,
        position: u8,
    ) -> BoxFuture<'static, StorageResult<Option<DecisionEntity>>> {
        self.run("finding decision", move |conn| {
            conn.query_row(
                "SELECT team_id, position, decision, rationale, score, created_at_ms
                 FROM decisions WHERE team_id = ?1 AND position = ?2",
                params![team_id.to_string(), position],
                decision_from_row,
            )
            .optional()
            .map_err(|err| map_err("finding decision", err))?
            .map(validate_decision)
            .transpose()
        })
    }

    fn list_decisions(&self) -> BoxFuture<'static, StorageResult<Vec<DecisionEntity>>> {
        self.run("listing decisions", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT team_id, position, decision, rationale, score, created_at_ms
                     FROM decisions ORDER BY team_id, position",
                )
                .map_err(|err| map_err("listing decisions", err))?;
            let rows = stmt
                .query_map([], decision_from_row)
                .map_err(|err| map_err("listing decisions", err))?;
            rows.map(|row| {
                row.map_err(|err| map_err("listing decisions", err))
                    .and_then(validate_decision)
            })
            .collect()
        })
    }

    fn record_decision(
        &self,
        decision: DecisionEntity,
    ) -> BoxFuture<'static, StorageResult<TeamEntity>> {
        self.run("recording decision", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| map_err("recording decision", err))?;

            let team_key = decision.team_id.to_string();

            // Fast path; the primary key below is the actual guard.
            let already: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM decisions WHERE team_id = ?1 AND position = ?2",
                    params![team_key, decision.position],
                    |row| row.get(0),
                )
                .map_err(|err| map_err("recording decision", err))?;
            if already > 0 {
                return Err(StorageError::DuplicateDecision {
                    team_id: decision.team_id,
                    position: decision.position,
                });
            }

            tx.execute(
                "INSERT INTO decisions
                     (team_id, position, decision, rationale, score, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    team_key,
                    decision.position,
                    decision.decision,
                    decision.rationale,
                    decision.score,
                    decision.created_at_ms,
                ],
            )
            .map_err(|err| map_insert_err(&decision, err))?;

            let updated = tx
                .execute(
                    "UPDATE teams
                     SET current_position = MAX(current_position, ?2),
                         total_score = total_score + ?3
                     WHERE id = ?1",
                    params![team_key, decision.position + 1, decision.score],
                )
                .map_err(|err| map_err("recording decision", err))?;
            if updated != 1 {
                return Err(StorageError::Corrupted {
                    message: format!("decision references unknown team `{}`", decision.team_id),
                });
            }

            let team = tx
                .query_row(
                    "SELECT id, name, credential, current_position, total_score
                     FROM teams WHERE id = ?1",
                    params![team_key],
                    team_from_row,
                )
                .map_err(|err| map_err("recording decision", err))
                .and_then(validate_team)?;

            tx.commit().map_err(|err| map_err("recording decision", err))?;
            Ok(team)
        })
    }

    fn session(&self) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        self.run("reading session", |conn| {
            conn.query_row(
                "SELECT phase, current_position FROM session WHERE id = 1",
                [],
                |row| {
                    Ok(SessionEntity {
                        phase: row.get(0)?,
                        current_position: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|err| map_err("reading session", err))
            .map(Option::unwrap_or_default)
        })
    }

    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run("saving session", move |conn| {
            conn.execute(
                "INSERT INTO session (id, phase, current_position) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     phase = excluded.phase,
                     current_position = excluded.current_position",
                params![session.phase, session.current_position],
            )
            .map_err(|err| map_err("saving session", err))?;
            Ok(())
        })
    }

    fn reset(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run("resetting session", |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| map_err("resetting session", err))?;
            tx.execute("DELETE FROM decisions", [])
                .map_err(|err| map_err("resetting session", err))?;
            tx.execute(
                "UPDATE teams SET current_position = 1, total_score = 0",
                [],
            )
            .map_err(|err| map_err("resetting session", err))?;
            tx.execute(
                "UPDATE session SET phase = 'waiting', current_position = 0 WHERE id = 1",
                [],
            )
            .map_err(|err| map_err("resetting session", err))?;
            tx.commit().map_err(|err| map_err("resetting session", err))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run("health check", |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|err| map_err("health check", err))
        })
    }
}

/// Raw team row with the id still as text; callers validate with [`validate_team`].
fn team_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, u8, u32)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn validate_team(raw: (String, String, String, u8, u32)) -> StorageResult<TeamEntity> {
    let (id, name, credential, current_position, total_score) = raw;
    let id = Uuid::parse_str(&id).map_err(|_| StorageError::Corrupted {
        message: format!("team row carries malformed id `{id}`"),
    })?;
    Ok(TeamEntity {
        id,
        name,
        credential,
        current_position,
        total_score,
    })
}

fn scenario_from_row(row: &Row<'_>) -> rusqlite::Result<ScenarioEntity> {
    Ok(ScenarioEntity {
        position: row.get(0)?,
        prompt: row.get(1)?,
        reference_answer: row.get(2)?,
        reference_rationale: row.get(3)?,
        max_score: row.get(4)?,
    })
}

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<(String, u8, String, String, u32, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn validate_decision(raw: (String, u8, String, String, u32, i64)) -> StorageResult<DecisionEntity> {
    let (team_id, position, decision, rationale, score, created_at_ms) = raw;
    let team_id = Uuid::parse_str(&team_id).map_err(|_| StorageError::Corrupted {
        message: format!("decision row carries malformed team id `{team_id}`"),
    })?;
    Ok(DecisionEntity {
        team_id,
        position,
        decision,
        rationale,
        score,
        created_at_ms,
    })
}

/// Translate rusqlite failures into the storage taxonomy.
fn map_err(context: &str, err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if matches!(
            failure.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ) {
            return StorageError::Busy {
                message: context.to_string(),
            };
        }
    }
    StorageError::unavailable(context.to_string(), err)
}

/// Insert-specific mapping so unique-index violations surface as duplicates.
fn map_insert_err(decision: &DecisionEntity, err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            return StorageError::DuplicateDecision {
                team_id: decision.team_id,
                position: decision.position,
            };
        }
    }
    map_err("recording decision", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn team(name: &str) -> TeamEntity {
        TeamEntity::new(Uuid::new_v4(), name.to_string())
    }

    fn decision(team_id: Uuid, position: u8, score: u32) -> DecisionEntity {
        DecisionEntity {
            team_id,
            position,
            decision: "evacuate the north wing".into(),
            rationale: "closest exit".into(),
            score,
            created_at_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn record_decision_advances_team_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let alpha = team("alpha");
        store.upsert_team(alpha.clone()).await.unwrap();

        let updated = store.record_decision(decision(alpha.id, 3, 12)).await.unwrap();
        assert_eq!(updated.current_position, 4);
        assert_eq!(updated.total_score, 12);

        let err = store
            .record_decision(decision(alpha.id, 3, 15))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::DuplicateDecision { position: 3, .. }
        ));

        // Rollback left the team untouched by the failed attempt.
        let reread = store.find_team(alpha.id).await.unwrap().unwrap();
        assert_eq!(reread.current_position, 4);
        assert_eq!(reread.total_score, 12);
    }

    #[tokio::test]
    async fn concurrent_submissions_commit_at_most_once() {
        let store = StdArc::new(SqliteStore::open_in_memory().unwrap());
        let bravo = team("bravo");
        store.upsert_team(bravo.clone()).await.unwrap();

        let first = {
            let store = StdArc::clone(&store);
            tokio::spawn(async move { store.record_decision(decision(bravo.id, 1, 10)).await })
        };
        let second = {
            let store = StdArc::clone(&store);
            tokio::spawn(async move { store.record_decision(decision(bravo.id, 1, 7)).await })
        };

        let outcomes = [first.await.unwrap(), second.await.unwrap()];
        let committed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(committed, 1);

        let reread = store.find_team(bravo.id).await.unwrap().unwrap();
        assert_eq!(reread.current_position, 2);
    }

    #[tokio::test]
    async fn empty_decision_text_is_accepted() {
        let store = SqliteStore::open_in_memory().unwrap();
        let charlie = team("charlie");
        store.upsert_team(charlie.clone()).await.unwrap();

        let mut timeout_submission = decision(charlie.id, 1, 0);
        timeout_submission.decision = String::new();
        timeout_submission.rationale = String::new();

        let updated = store.record_decision(timeout_submission).await.unwrap();
        assert_eq!(updated.total_score, 0);
        assert_eq!(updated.current_position, 2);
    }

    #[tokio::test]
    async fn restart_reproduces_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        let delta = team("delta");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_team(delta.clone()).await.unwrap();
            store.record_decision(decision(delta.id, 1, 15)).await.unwrap();
            store
                .save_session(SessionEntity {
                    phase: "running".into(),
                    current_position: 1,
                })
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let reread = reopened.find_team(delta.id).await.unwrap().unwrap();
        assert_eq!(reread.current_position, 2);
        assert_eq!(reread.total_score, 15);

        let session = reopened.session().await.unwrap();
        assert_eq!(session.phase, "running");
        assert_eq!(session.current_position, 1);

        let decisions = reopened.list_decisions().await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].position, 1);
    }

    #[tokio::test]
    async fn reset_clears_decisions_and_rewinds_teams() {
        let store = SqliteStore::open_in_memory().unwrap();
        let echo = team("echo");
        let foxtrot = team("foxtrot");
        store.upsert_team(echo.clone()).await.unwrap();
        store.upsert_team(foxtrot.clone()).await.unwrap();
        store.record_decision(decision(echo.id, 1, 10)).await.unwrap();
        store.record_decision(decision(echo.id, 2, 12)).await.unwrap();
        store.record_decision(decision(foxtrot.id, 1, 7)).await.unwrap();

        store.reset().await.unwrap();

        for id in [echo.id, foxtrot.id] {
            let reread = store.find_team(id).await.unwrap().unwrap();
            assert_eq!(reread.current_position, 1);
            assert_eq!(reread.total_score, 0);
        }
        assert!(store.list_decisions().await.unwrap().is_empty());

        let session = store.session().await.unwrap();
        assert_eq!(session.phase, "waiting");
        assert_eq!(session.current_position, 0);
    }
}
