pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{StationEntity, StationId, StationPatch},
    storage::StorageResult,
};

pub use memory::MemoryStationStore;

/// Per-station rows keyed by `(shop_id, station_id)`. Writes are last-writer-wins
/// for the set of fields they carry; there is no row versioning.
pub trait StationStore: Send + Sync {
    fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> BoxFuture<'static, StorageResult<Option<StationEntity>>>;
    /// Apply a partial update, creating an idle row first when none exists.
    fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> BoxFuture<'static, StorageResult<StationEntity>>;
    fn list_stations(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StationEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
