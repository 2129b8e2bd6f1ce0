//! Shared application state: the durable store handle, the session cache,
//! the real-time fan-out registries, and the session lifecycle machine.

/// In-process session cache and its snapshot types.
pub mod cache;
mod hub;
/// Session lifecycle state machine.
pub mod session;

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::DecisionStore,
    error::ServiceError,
    scoring::DecisionScorer,
    state::cache::SessionCache,
    state::session::{Plan, PlanId, SessionEvent, SessionMachine, SessionState, Snapshot},
};

pub use self::hub::EventHub;

/// Cheaply clonable handle to the application state.
pub type SharedState = Arc<AppState>;

/// Upper bound for the durable work performed inside a phase transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle used to push messages to a connected team client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Transport-level connection identifier.
    pub transport_id: String,
    /// Team this connection authenticated as.
    pub team_id: Uuid,
    /// Sender feeding the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing live connections, caches, and handles.
pub struct AppState {
    config: Arc<AppConfig>,
    store: Arc<dyn DecisionStore>,
    scorer: Arc<dyn DecisionScorer>,
    cache: SessionCache,
    admin_hub: EventHub,
    clients: DashMap<String, ClientConnection>,
    session: RwLock<SessionMachine>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct the shared state from its dependencies and rebuild the
    /// session cache from the durable store.
    ///
    /// The on-disk cache snapshot is restored first (it may carry the kicked
    /// denylist and decision history for teams the store also knows), then
    /// the store's roster, decisions, and session row overwrite anything the
    /// snapshot got wrong: the store is the source of truth after a restart.
    pub async fn bootstrap(
        config: Arc<AppConfig>,
        store: Arc<dyn DecisionStore>,
        scorer: Arc<dyn DecisionScorer>,
    ) -> Result<SharedState, ServiceError> {
        let (cache, source) =
            SessionCache::restore(&config.snapshot_path, &config.backup_path);
        info!(source = ?source, "restored session cache");

        let session_state: SessionState = store.session().await?.into();
        cache.merge_roster(store.list_teams().await?);
        cache.rebuild_decisions(store.list_decisions().await?);
        cache.update_game_state(session_state);

        Ok(Arc::new(Self {
            config,
            store,
            scorer,
            cache,
            admin_hub: EventHub::new(64),
            clients: DashMap::new(),
            session: RwLock::new(SessionMachine::from_state(session_state)),
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        }))
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Durable store handle.
    pub fn store(&self) -> &Arc<dyn DecisionStore> {
        &self.store
    }

    /// Pluggable scoring engine.
    pub fn scorer(&self) -> &dyn DecisionScorer {
        self.scorer.as_ref()
    }

    /// In-process session cache.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Broadcast hub feeding every admin subscription.
    pub fn admin_hub(&self) -> &EventHub {
        &self.admin_hub
    }

    /// Registry of live team connections keyed by transport identifier.
    pub fn clients(&self) -> &DashMap<String, ClientConnection> {
        &self.clients
    }

    /// Snapshot the current phase/position of the session machine.
    pub async fn session_state(&self) -> SessionState {
        self.session.read().await.state()
    }

    /// Full machine snapshot including any pending transition.
    pub async fn session_snapshot(&self) -> Snapshot {
        self.session.read().await.snapshot()
    }

    async fn plan_transition(&self, event: SessionEvent) -> Result<Plan, ServiceError> {
        let mut machine = self.session.write().await;
        Ok(machine.plan(event)?)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<SessionState, ServiceError> {
        let mut machine = self.session.write().await;
        Ok(machine.apply(plan_id)?)
    }

    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), ServiceError> {
        let mut machine = self.session.write().await;
        machine.abort(plan_id)?;
        Ok(())
    }

    /// Run an admin phase transition: plan it, perform the durable work,
    /// then apply. The work future typically persists the target state; if
    /// it fails or times out the plan is aborted and the machine is left
    /// unchanged.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: SessionEvent,
        work: F,
    ) -> Result<(T, SessionState), ServiceError>
    where
        F: FnOnce(SessionState) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let plan = self.plan_transition(event).await?;

        let work_future = work(plan.to);
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan.id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan.id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan.id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan.id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan.id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
