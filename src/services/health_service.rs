use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode, pinging the installed stores so outages are logged early.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(stores) = state.stores().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    if let Err(err) = stores.stations.health_check().await {
        warn!(error = %err, "station store health check failed");
    }
    if let Err(err) = stores.subscriptions.health_check().await {
        warn!(error = %err, "subscription store health check failed");
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok(stores.backend)
    }
}
