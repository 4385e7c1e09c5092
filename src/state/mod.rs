mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::warn;
use uuid::Uuid;

use crate::{
    clock::{SystemClock, WallClock},
    config::AppConfig,
    dao::{station_store::StationStore, subscription_store::SubscriptionStore},
    dto::sse::{SYSTEM_STATUS_EVENT, ServerEvent, SystemStatus},
    error::ServiceError,
    services::subscription::SubscriptionResolver,
};

pub use self::sse::{SseHub, ShopHubs};

pub type SharedState = Arc<AppState>;

const HUB_CAPACITY: usize = 32;

/// Storage backends installed together by the supervisor.
#[derive(Clone)]
pub struct Stores {
    pub stations: Arc<dyn StationStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Backend label reported by the health check.
    pub backend: &'static str,
}

/// Central application state: storage handles, per-shop push hubs and the clock.
pub struct AppState {
    stores: RwLock<Option<Stores>>,
    hubs: ShopHubs,
    config: AppConfig,
    wall_clock: Arc<dyn WallClock>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] backed by the system clock.
    ///
    /// The application starts in degraded mode until storage is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: AppConfig, wall_clock: Arc<dyn WallClock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            stores: RwLock::new(None),
            hubs: ShopHubs::new(HUB_CAPACITY),
            config,
            wall_clock,
            degraded: degraded_tx,
        })
    }

    /// Currently installed stores, if any.
    pub async fn stores(&self) -> Option<Stores> {
        let guard = self.stores.read().await;
        guard.as_ref().cloned()
    }

    /// Installed stores, or [`ServiceError::Degraded`] while storage is down.
    pub async fn require_stores(&self) -> Result<Stores, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.stores().await.ok_or(ServiceError::Degraded)
    }

    pub async fn station_store(&self) -> Result<Arc<dyn StationStore>, ServiceError> {
        Ok(self.require_stores().await?.stations)
    }

    /// Resolver bound to the installed subscription store.
    pub async fn subscription_resolver(&self) -> Result<SubscriptionResolver, ServiceError> {
        let stores = self.require_stores().await?;
        Ok(SubscriptionResolver::new(
            stores.subscriptions,
            self.wall_clock.clone(),
            self.config.subscription.clone(),
        ))
    }

    /// Install storage backends and leave degraded mode.
    pub async fn install_stores(&self, stores: Stores) {
        {
            let mut guard = self.stores.write().await;
            *guard = Some(stores);
        }
        self.update_degraded(false);
    }

    /// Remove the installed backends and enter degraded mode.
    pub async fn clear_stores(&self) {
        {
            let mut guard = self.stores.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, telling every connected shop when it changes.
    pub fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if !changed {
            return;
        }

        match ServerEvent::json(
            Some(SYSTEM_STATUS_EVENT.to_string()),
            &SystemStatus { degraded: value },
        ) {
            Ok(event) => self.hubs.broadcast_all(&event),
            Err(err) => warn!(error = %err, "failed to serialise system status event"),
        }
    }

    /// Push hubs keyed by shop.
    pub fn hubs(&self) -> &ShopHubs {
        &self.hubs
    }

    pub fn shop_hub(&self, shop_id: Uuid) -> Arc<SseHub> {
        self.hubs.hub(shop_id)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn wall_clock(&self) -> &Arc<dyn WallClock> {
        &self.wall_clock
    }
}
