//! Application-level configuration loading, including the baked-in scenario set.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::ScenarioEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DECISION_DRILL_CONFIG_PATH";
/// Environment variable that overrides the configured admin token.
const ADMIN_TOKEN_ENV: &str = "DECISION_DRILL_ADMIN_TOKEN";

const DEFAULT_DATABASE_PATH: &str = "data/session.db";
const DEFAULT_SNAPSHOT_PATH: &str = "data/cache-snapshot.json";
const DEFAULT_BACKUP_PATH: &str = "data/cache-backup.json";
const DEFAULT_SNAPSHOT_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TIME_LIMIT_SECONDS: u32 = 900;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Debounced cache snapshot file.
    pub snapshot_path: PathBuf,
    /// Periodic cache backup file.
    pub backup_path: PathBuf,
    /// Coalescing window for cache snapshot writes.
    pub snapshot_debounce: Duration,
    /// Interval between full cache backups.
    pub backup_interval: Duration,
    /// Countdown duration handed to clients for each scenario.
    pub time_limit_seconds: u32,
    /// Shared secret required on admin routes, when set.
    pub admin_token: Option<String>,
    /// Optional scenario seed file; the baked-in set is used when absent.
    pub scenarios_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found; using built-in defaults");
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Ok(token) = env::var(ADMIN_TOKEN_ENV) {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }
        config
    }

    /// Load the scenario seed set: the configured file when present, the
    /// baked-in set otherwise. A corrupt file falls back to the baked-in set.
    pub fn scenario_seed(&self) -> Vec<ScenarioEntity> {
        let Some(path) = &self.scenarios_path else {
            return default_scenarios();
        };

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<RawScenario>>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), count = raw.len(), "loaded scenario seed file");
                    raw.into_iter().map(Into::into).collect()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse scenario seed; using built-in set"
                    );
                    default_scenarios()
                }
            },
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read scenario seed; using built-in set"
                );
                default_scenarios()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            backup_path: PathBuf::from(DEFAULT_BACKUP_PATH),
            snapshot_debounce: Duration::from_millis(DEFAULT_SNAPSHOT_DEBOUNCE_MS),
            backup_interval: Duration::from_secs(DEFAULT_BACKUP_INTERVAL_SECS),
            time_limit_seconds: DEFAULT_TIME_LIMIT_SECONDS,
            admin_token: None,
            scenarios_path: None,
        }
    }
}

/// JSON representation of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    database_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
    backup_path: Option<PathBuf>,
    snapshot_debounce_ms: Option<u64>,
    backup_interval_secs: Option<u64>,
    time_limit_seconds: Option<u32>,
    admin_token: Option<String>,
    scenarios_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            database_path: raw.database_path.unwrap_or(defaults.database_path),
            snapshot_path: raw.snapshot_path.unwrap_or(defaults.snapshot_path),
            backup_path: raw.backup_path.unwrap_or(defaults.backup_path),
            snapshot_debounce: raw
                .snapshot_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.snapshot_debounce),
            backup_interval: raw
                .backup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.backup_interval),
            time_limit_seconds: raw.time_limit_seconds.unwrap_or(defaults.time_limit_seconds),
            admin_token: raw.admin_token,
            scenarios_path: raw.scenarios_path,
        }
    }
}

/// JSON representation of a single scenario seed entry.
#[derive(Debug, Deserialize)]
struct RawScenario {
    position: u8,
    prompt: String,
    reference_answer: String,
    reference_rationale: String,
    max_score: Option<u32>,
}

impl From<RawScenario> for ScenarioEntity {
    fn from(raw: RawScenario) -> Self {
        Self {
            position: raw.position,
            prompt: raw.prompt,
            reference_answer: raw.reference_answer,
            reference_rationale: raw.reference_rationale,
            max_score: raw.max_score.unwrap_or(15),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in demo scenario set shipped with the binary.
fn default_scenarios() -> Vec<ScenarioEntity> {
    let entries: [(&str, &str, &str); 7] = [
        (
            "A fire alarm sounds on the production floor during a full shift. Smoke is visible near the loading dock.",
            "Evacuate all personnel through the assembly-point routes and call emergency services",
            "Life safety outranks production continuity; the dock route must be avoided",
        ),
        (
            "Your monitoring dashboard shows the primary database at 98% disk with writes failing intermittently.",
            "Fail over to the replica and freeze non-essential write traffic",
            "A controlled failover now prevents an uncontrolled outage later",
        ),
        (
            "A supplier reports a two-week delay on a component your flagship order depends on.",
            "Notify the customer early and negotiate a partial shipment from the alternate supplier",
            "Transparency preserves the relationship; partial delivery keeps the line moving",
        ),
        (
            "A journalist calls asking about an unannounced security incident mentioned on social media.",
            "Acknowledge the inquiry, decline details, and route them to the communications lead",
            "One consistent voice avoids speculation while investigation continues",
        ),
        (
            "Two senior engineers disagree publicly over the release plan one day before launch.",
            "Pull both into a closed review, decide on the documented risk criteria, and communicate one plan",
            "The decision criteria, not seniority, settle the dispute",
        ),
        (
            "A storm warning threatens the venue of tomorrow's customer event with eighty registered attendees.",
            "Move the event online and notify attendees tonight with the new access details",
            "Attendee safety and a working fallback beat hoping the forecast improves",
        ),
        (
            "An employee reports they accidentally emailed a customer list to an external address.",
            "Contain the exposure, inform the privacy officer, and document the timeline for disclosure",
            "Fast containment and honest reporting limit regulatory and customer harm",
        ),
    ];

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (prompt, answer, rationale))| ScenarioEntity {
            position: (index + 1) as u8,
            prompt: prompt.to_string(),
            reference_answer: answer.to_string(),
            reference_rationale: rationale.to_string(),
            max_score: 15,
        })
        .collect()
}
