//! Durable store layer: entity models, the `DecisionStore` abstraction, and
//! the SQLite backend. The store owns teams, scenarios, decisions, and the
//! global session row, and is the source of truth after a restart.

/// Database model definitions.
pub mod models;
/// SQLite-backed store implementation.
pub mod sqlite;
/// Storage abstraction layer for database operations.
pub mod storage;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{DecisionEntity, ScenarioEntity, SessionEntity, TeamEntity};
use crate::dao::storage::StorageResult;

/// Highest valid scenario position; a team past it has completed the session.
pub const MAX_SCENARIO_POSITION: u8 = 7;

/// Abstraction over the persistence layer for teams, scenarios, decisions,
/// and the global session row.
pub trait DecisionStore: Send + Sync {
    /// List every persisted team.
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>>;
    /// Fetch a team by id.
    fn find_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>>;
    /// Fetch a team by its unique display name.
    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>>;
    /// Insert or replace a team row.
    fn upsert_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the scenario at the given position, if any.
    fn find_scenario(
        &self,
        position: u8,
    ) -> BoxFuture<'static, StorageResult<Option<ScenarioEntity>>>;
    /// List all scenarios in position order.
    fn list_scenarios(&self) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>>;
    /// Replace the whole scenario set (reference data seeding).
    fn replace_scenarios(
        &self,
        scenarios: Vec<ScenarioEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a single decision by its `(team, position)` key.
    fn find_decision(
        &self,
        team_id: Uuid,
        position: u8,
    ) -> BoxFuture<'static, StorageResult<Option<DecisionEntity>>>;
    /// List every persisted decision, ordered by team then position.
    fn list_decisions(&self) -> BoxFuture<'static, StorageResult<Vec<DecisionEntity>>>;
    /// Atomically record a decision and advance the owning team.
    ///
    /// One transaction: duplicate check, insert (unique index backstop),
    /// team position/score update. Returns the updated team row.
    fn record_decision(
        &self,
        decision: DecisionEntity,
    ) -> BoxFuture<'static, StorageResult<TeamEntity>>;
    /// Read the global session row.
    fn session(&self) -> BoxFuture<'static, StorageResult<SessionEntity>>;
    /// Persist the global session row.
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Full reset: delete decisions, return teams to position 1 / score 0,
    /// session back to waiting at position 0. Scenarios are untouched.
    fn reset(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
