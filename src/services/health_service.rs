//! Health probe backed by a cheap storage round-trip.

use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the durable store and report overall health.
pub async fn check(state: &SharedState) -> HealthResponse {
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "storage health probe failed");
            HealthResponse::degraded()
        }
    }
}
