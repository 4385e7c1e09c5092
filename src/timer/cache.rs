use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::TimerPhase;
use crate::dao::models::StationId;

/// Local timer values that the Station Store does not carry at full precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTimer {
    pub phase: TimerPhase,
    pub elapsed_secs: u32,
    pub start_ms: Option<i64>,
    pub paused_ms: i64,
    pub pause_start_ms: Option<i64>,
}

/// Fast local storage written on every tick. Never authoritative: it only
/// refines a store row that describes the same run.
pub trait TimerCache: Send + Sync {
    fn load(&self, shop_id: Uuid, station_id: StationId) -> Option<CachedTimer>;
    fn save(&self, shop_id: Uuid, station_id: StationId, timer: CachedTimer);
    fn clear(&self, shop_id: Uuid, station_id: StationId);
}

#[derive(Clone, Default)]
pub struct MemoryTimerCache {
    entries: Arc<DashMap<(Uuid, StationId), CachedTimer>>,
}

impl MemoryTimerCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerCache for MemoryTimerCache {
    fn load(&self, shop_id: Uuid, station_id: StationId) -> Option<CachedTimer> {
        self.entries
            .get(&(shop_id, station_id))
            .map(|entry| entry.value().clone())
    }

    fn save(&self, shop_id: Uuid, station_id: StationId, timer: CachedTimer) {
        self.entries.insert((shop_id, station_id), timer);
    }

    fn clear(&self, shop_id: Uuid, station_id: StationId) {
        self.entries.remove(&(shop_id, station_id));
    }
}
