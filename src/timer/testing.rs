//! Deterministic clocks for engine tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use futures::future::BoxFuture;

use uuid::Uuid;

use crate::{
    clock::{ClientClock, ClockError, ServerClock, ServerTime, from_unix_millis},
    dao::{
        models::{StationEntity, StationId, StationPatch},
        station_store::{MemoryStationStore, StationStore},
        storage::{StorageError, StorageResult},
    },
};

/// Client clock whose monotonic and wall readings are moved by hand.
#[derive(Clone)]
pub struct ManualClientClock {
    monotonic: Arc<AtomicI64>,
    wall: Arc<AtomicI64>,
}

impl ManualClientClock {
    pub fn new(wall_ms: i64) -> Self {
        Self {
            monotonic: Arc::new(AtomicI64::new(0)),
            wall: Arc::new(AtomicI64::new(wall_ms)),
        }
    }

    /// Normal passage of time.
    pub fn advance(&self, ms: i64) {
        self.monotonic.fetch_add(ms, Ordering::SeqCst);
        self.wall.fetch_add(ms, Ordering::SeqCst);
    }

    /// Host suspended: the wall clock moves, the monotonic clock stalls.
    pub fn suspend(&self, ms: i64) {
        self.wall.fetch_add(ms, Ordering::SeqCst);
    }

    /// Manual adjustment of the client's wall clock.
    pub fn jump_wall(&self, ms: i64) {
        self.wall.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClientClock for ManualClientClock {
    fn monotonic_millis(&self) -> i64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_millis(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Authoritative clock that can be advanced and taken offline.
#[derive(Clone)]
pub struct ManualServerClock {
    now: Arc<AtomicI64>,
    offline: Arc<AtomicBool>,
}

impl ManualServerClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl ServerClock for ManualServerClock {
    fn server_time(&self) -> BoxFuture<'static, Result<ServerTime, ClockError>> {
        let offline = self.offline.load(Ordering::SeqCst);
        let now = self.now_ms();
        Box::pin(async move {
            if offline {
                return Err(ClockError::new("clock offline"));
            }
            Ok(ServerTime::from_datetime(from_unix_millis(now)))
        })
    }
}

/// Station store whose writes can be made to fail.
#[derive(Clone)]
pub struct FlakyStationStore {
    inner: MemoryStationStore,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStationStore {
    pub fn new(inner: MemoryStationStore) -> Self {
        Self {
            inner,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StationStore for FlakyStationStore {
    fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> BoxFuture<'static, StorageResult<Option<StationEntity>>> {
        self.inner.read_station(shop_id, station_id)
    }

    fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> BoxFuture<'static, StorageResult<StationEntity>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::unavailable(
                    "write rejected".into(),
                    std::io::Error::other("store offline"),
                ))
            });
        }
        self.inner.write_station(shop_id, station_id, patch)
    }

    fn list_stations(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StationEntity>>> {
        self.inner.list_stations(shop_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
