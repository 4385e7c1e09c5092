use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::storage::{StorageError, StorageResult},
    services::plan_service,
    state::{SharedState, Stores},
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

async fn health_check(stores: &Stores) -> StorageResult<()> {
    stores.stations.health_check().await?;
    stores.subscriptions.health_check().await
}

async fn try_reconnect(stores: &Stores) -> StorageResult<()> {
    stores.stations.try_reconnect().await?;
    stores.subscriptions.try_reconnect().await
}

/// Connect the storage backends, seed the plans table and keep the shared state in
/// degraded mode whenever they are unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Stores, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let connected = match connect().await {
            Ok(stores) => plan_service::seed_plans(&stores.subscriptions, &state.config().plans)
                .await
                .map(|()| stores),
            Err(err) => Err(err),
        };

        match connected {
            Ok(stores) => {
                state.install_stores(stores.clone()).await;
                info!(backend = stores.backend, "storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match health_check(&stores).await {
                        Ok(()) => {
                            if state.is_degraded() {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false);
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "storage health check failed");
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match try_reconnect(&stores).await {
                                    Ok(()) => {
                                        info!("storage reconnection succeeded after health check failure");
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering degraded mode"
                                            );
                                            state.update_degraded(true);
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false);
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            }
                            warn!("exhausted storage reconnect attempts; dropping the connection");
                            state.clear_stores().await;
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
