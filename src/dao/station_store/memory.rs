use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::StationStore;
use crate::dao::{
    models::{StationEntity, StationId, StationPatch},
    storage::StorageResult,
};

/// Process-local station rows, used for tests and storage-less deployments.
#[derive(Clone, Default)]
pub struct MemoryStationStore {
    rows: Arc<DashMap<(Uuid, StationId), StationEntity>>,
}

impl MemoryStationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StationStore for MemoryStationStore {
    fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> BoxFuture<'static, StorageResult<Option<StationEntity>>> {
        let found = self
            .rows
            .get(&(shop_id, station_id))
            .map(|row| row.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> BoxFuture<'static, StorageResult<StationEntity>> {
        let updated = {
            let mut row = self
                .rows
                .entry((shop_id, station_id))
                .or_insert_with(|| StationEntity::idle(shop_id, station_id));
            row.apply_patch(&patch);
            row.clone()
        };
        Box::pin(async move { Ok(updated) })
    }

    fn list_stations(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StationEntity>>> {
        let mut stations: Vec<StationEntity> = self
            .rows
            .iter()
            .filter(|entry| entry.key().0 == shop_id)
            .map(|entry| entry.value().clone())
            .collect();
        stations.sort_by_key(|station| station.id);
        Box::pin(async move { Ok(stations) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
