use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    TimerSettings,
    cache::{CachedTimer, TimerCache},
    elapsed::{pause_duration_ms, running_elapsed_secs, synthetic_start_ms},
    error::TimerError,
    phase::{TimerAction, TimerPhase},
    sync::ClockSync,
};
use crate::{
    clock::{ClientClock, ServerClock, from_unix_millis, unix_millis},
    dao::{
        models::{StationEntity, StationId, StationPatch},
        station_store::StationStore,
    },
    dto::push::PushMessage,
};

/// Collaborators of a [`TimerEngine`].
#[derive(Clone)]
pub struct TimerDeps {
    pub store: Arc<dyn StationStore>,
    pub server_clock: Arc<dyn ServerClock>,
    pub client_clock: Arc<dyn ClientClock>,
    pub cache: Arc<dyn TimerCache>,
}

/// What observers of a station timer see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub shop_id: Uuid,
    pub station_id: StationId,
    pub phase: TimerPhase,
    pub elapsed_secs: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    pub paused_secs: u64,
    /// False while the estimate runs without a fresh server anchor.
    pub synced: bool,
}

/// Per-station state owned by one engine. Instants are authoritative epoch millis.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalTimer {
    phase: TimerPhase,
    elapsed_secs: u32,
    start_ms: Option<i64>,
    end_ms: Option<i64>,
    paused_ms: i64,
    pause_start_ms: Option<i64>,
}

impl LocalTimer {
    fn idle() -> Self {
        Self {
            phase: TimerPhase::Idle,
            elapsed_secs: 0,
            start_ms: None,
            end_ms: None,
            paused_ms: 0,
            pause_start_ms: None,
        }
    }

    fn fold_pause(&mut self, now_ms: i64) {
        if let Some(pause_start) = self.pause_start_ms.take() {
            self.paused_ms += pause_duration_ms(now_ms, pause_start);
        }
    }

    /// Full timer field-set as a store patch. Customer fields are left alone.
    fn to_patch(&self) -> StationPatch {
        StationPatch {
            elapsed_time: Some(self.elapsed_secs),
            is_running: Some(matches!(self.phase, TimerPhase::Running | TimerPhase::Paused)),
            is_paused: Some(self.phase == TimerPhase::Paused),
            is_done: Some(self.phase == TimerPhase::Done),
            start_time: Some(self.start_ms.map(from_unix_millis)),
            end_time: Some(self.end_ms.map(from_unix_millis)),
            paused_time: Some(u64::try_from(self.paused_ms / 1000).unwrap_or_default()),
            pause_start_time: Some(self.pause_start_ms.map(from_unix_millis)),
            ..StationPatch::default()
        }
    }

    fn to_cached(&self) -> CachedTimer {
        CachedTimer {
            phase: self.phase,
            elapsed_secs: self.elapsed_secs,
            start_ms: self.start_ms,
            paused_ms: self.paused_ms,
            pause_start_ms: self.pause_start_ms,
        }
    }
}

/// Elapsed-time tracker for one station on one client.
pub struct TimerEngine {
    shop_id: Uuid,
    station_id: StationId,
    deps: TimerDeps,
    settings: TimerSettings,
    sync: ClockSync,
    local: LocalTimer,
    /// Last row seen from the store, with pushed resets applied.
    record: Option<StationEntity>,
    ticks_since_flush: u32,
    /// Client monotonic instant before which ticks are suppressed.
    guard_until_ms: Option<i64>,
    snapshots: watch::Sender<TimerSnapshot>,
}

impl TimerEngine {
    pub fn new(
        shop_id: Uuid,
        station_id: StationId,
        deps: TimerDeps,
        settings: TimerSettings,
    ) -> Self {
        let local = LocalTimer::idle();
        let (snapshots, _) = watch::channel(TimerSnapshot {
            shop_id,
            station_id,
            phase: local.phase,
            elapsed_secs: 0,
            start_time: None,
            paused_secs: 0,
            synced: false,
        });

        Self {
            shop_id,
            station_id,
            deps,
            settings,
            sync: ClockSync::new(),
            local,
            record: None,
            ticks_since_flush: 0,
            guard_until_ms: None,
            snapshots,
        }
    }

    pub fn shop_id(&self) -> Uuid {
        self.shop_id
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Observe published snapshots. Only persisted transitions, ticks and pushed
    /// resets are published.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            shop_id: self.shop_id,
            station_id: self.station_id,
            phase: self.local.phase,
            elapsed_secs: self.local.elapsed_secs,
            start_time: self.local.start_ms.map(from_unix_millis),
            paused_secs: u64::try_from(self.local.paused_ms / 1000).unwrap_or_default(),
            synced: self.sync.is_anchored(),
        }
    }

    /// Last station row known to this engine.
    pub fn record(&self) -> Option<&StationEntity> {
        self.record.as_ref()
    }

    /// Resync the clock and adopt the stored row as ground truth.
    ///
    /// Used on first load and whenever the host becomes visible again.
    pub async fn load(&mut self) -> Result<TimerSnapshot, TimerError> {
        // A clock failure is already logged and the estimate degrades.
        let _ = self.resync_clock().await;
        let row = self.read_authoritative().await?;
        self.reconcile(row);
        Ok(self.publish())
    }

    /// Re-anchor on a fresh server sample and recompute a running timer.
    pub async fn resync(&mut self) -> Result<TimerSnapshot, TimerError> {
        let result = self.resync_clock().await;
        if self.local.phase.is_ticking() {
            let now = self.now_ms();
            self.refresh_elapsed(now);
        }
        let snapshot = self.publish();
        result.map(|()| snapshot)
    }

    /// Apply an operator action.
    ///
    /// The stored row is read first and an action it makes inapplicable is rejected
    /// without side effects. The new timer fields are written before observers are
    /// notified; when that write fails the local state keeps the attempted
    /// transition and the error is returned.
    pub async fn apply(&mut self, action: TimerAction) -> Result<TimerSnapshot, TimerError> {
        let _ = self.resync_clock().await;
        let row = self.read_authoritative().await?;
        self.reconcile(row);

        let next = self.local.phase.next(action).inspect_err(|err| {
            debug!(
                shop_id = %self.shop_id,
                station_id = self.station_id,
                error = %err,
                "ignoring inapplicable timer action"
            );
        })?;

        let now = self.now_ms();
        self.transition(action, next, now);

        if action == TimerAction::Reset {
            self.sync.clear();
            self.deps.cache.clear(self.shop_id, self.station_id);
        } else {
            self.save_cache();
        }

        match self
            .deps
            .store
            .write_station(self.shop_id, self.station_id, self.local.to_patch())
            .await
        {
            Ok(row) => {
                self.record = Some(row);
                self.ticks_since_flush = 0;
                info!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    ?action,
                    elapsed = self.local.elapsed_secs,
                    "timer transition persisted"
                );
                Ok(self.publish())
            }
            Err(source) => {
                warn!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    ?action,
                    error = %source,
                    "timer transition not persisted"
                );
                Err(TimerError::PersistenceWriteFailed {
                    station_id: self.station_id,
                    source,
                })
            }
        }
    }

    /// One tick of a running timer: recompute, cache, and flush every
    /// `flush_every_ticks` ticks. A failed flush is only logged.
    pub async fn tick(&mut self) -> TimerSnapshot {
        if !self.local.phase.is_ticking() {
            return self.snapshot();
        }

        let monotonic = self.deps.client_clock.monotonic_millis();
        if let Some(until) = self.guard_until_ms {
            if monotonic < until {
                debug!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    "tick suppressed after external reset"
                );
                return self.snapshot();
            }
            self.guard_until_ms = None;
        }

        let now = self.now_ms();
        self.refresh_elapsed(now);
        self.save_cache();

        self.ticks_since_flush += 1;
        if self.ticks_since_flush >= self.settings.flush_every_ticks.max(1) {
            self.ticks_since_flush = 0;
            self.flush_elapsed().await;
        }

        self.publish()
    }

    /// Write the running elapsed value, but only onto a row that still describes
    /// the run this engine tracks. A row another client paused, finished or reset
    /// is adopted instead. Failures are only logged.
    async fn flush_elapsed(&mut self) {
        let row = match self
            .deps
            .store
            .read_station(self.shop_id, self.station_id)
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    "station row missing; skipping elapsed flush"
                );
                return;
            }
            Err(err) => {
                warn!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    error = %err,
                    "opportunistic elapsed flush failed"
                );
                return;
            }
        };

        if !self.tracks_run_of(&row) {
            debug!(
                shop_id = %self.shop_id,
                station_id = self.station_id,
                "stored run changed elsewhere; adopting it"
            );
            self.reconcile(row);
            return;
        }

        let patch = StationPatch {
            elapsed_time: Some(self.local.elapsed_secs),
            ..StationPatch::default()
        };
        match self
            .deps
            .store
            .write_station(self.shop_id, self.station_id, patch)
            .await
        {
            Ok(row) => self.reconcile(row),
            Err(err) => warn!(
                shop_id = %self.shop_id,
                station_id = self.station_id,
                error = %err,
                "opportunistic elapsed flush failed"
            ),
        }
    }

    fn tracks_run_of(&self, row: &StationEntity) -> bool {
        row.is_running
            && !row.is_paused
            && !row.is_done
            && row
                .start_time
                .is_none_or(|start| Some(unix_millis(start)) == self.local.start_ms)
    }

    /// Apply a pushed paid event. Stations not named by the event are untouched.
    ///
    /// The row was already written by whoever marked the stations paid, so nothing
    /// is persisted here. Applying the same event again yields the same state.
    pub fn apply_push(&mut self, message: &PushMessage) -> Option<TimerSnapshot> {
        let PushMessage::PaidEvent {
            station_ids,
            reset_data,
        } = message;
        if !station_ids.contains(&self.station_id) {
            return None;
        }

        let patch = match reset_data {
            Some(explicit) => StationPatch::idle().overlay(explicit),
            None => StationPatch::idle(),
        };
        let mut row = self
            .record
            .clone()
            .unwrap_or_else(|| StationEntity::idle(self.shop_id, self.station_id));
        row.apply_patch(&patch);

        self.local = LocalTimer::idle();
        self.deps.cache.clear(self.shop_id, self.station_id);
        self.reconcile(row);
        self.ticks_since_flush = 0;
        self.guard_until_ms =
            Some(self.deps.client_clock.monotonic_millis() + self.settings.reset_guard_ms);

        info!(
            shop_id = %self.shop_id,
            station_id = self.station_id,
            "applied external reset"
        );
        Some(self.publish())
    }

    async fn resync_clock(&mut self) -> Result<(), TimerError> {
        match self.deps.server_clock.server_time().await {
            Ok(sample) => {
                self.sync.record(&sample, self.deps.client_clock.as_ref());
                Ok(())
            }
            Err(err) => {
                self.sync.fall_back();
                warn!(
                    shop_id = %self.shop_id,
                    station_id = self.station_id,
                    error = %err,
                    "server time unavailable; using local estimate"
                );
                Err(err.into())
            }
        }
    }

    fn now_ms(&self) -> i64 {
        self.sync.estimate(self.deps.client_clock.as_ref())
    }

    async fn read_authoritative(&self) -> Result<StationEntity, TimerError> {
        self.deps
            .store
            .read_station(self.shop_id, self.station_id)
            .await
            .map_err(TimerError::StoreUnavailable)?
            .ok_or(TimerError::StationNotFound {
                shop_id: self.shop_id,
                station_id: self.station_id,
            })
    }

    /// Adopt `row` as ground truth. A running timer is recomputed from its start
    /// instant rather than from the persisted (possibly stale) elapsed value.
    fn reconcile(&mut self, row: StationEntity) {
        let phase = TimerPhase::of(&row);
        let start_ms = row.start_time.map(unix_millis);
        let stored_paused_ms = i64::try_from(row.paused_time)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);

        // Keep millisecond precision when the row describes the run we already track.
        let describes = |start: Option<i64>, paused_ms: i64| {
            start == start_ms && paused_ms / 1000 == stored_paused_ms / 1000
        };
        let paused_ms = if describes(self.local.start_ms, self.local.paused_ms) {
            self.local.paused_ms
        } else {
            self.deps
                .cache
                .load(self.shop_id, self.station_id)
                .filter(|cached| describes(cached.start_ms, cached.paused_ms))
                .map_or(stored_paused_ms, |cached| cached.paused_ms)
        };

        self.local = LocalTimer {
            phase,
            elapsed_secs: row.elapsed_time.min(self.settings.max_elapsed_secs),
            start_ms,
            end_ms: row.end_time.map(unix_millis),
            paused_ms,
            pause_start_ms: row.pause_start_time.map(unix_millis),
        };

        if phase.is_ticking() {
            let now = self.now_ms();
            if self.local.start_ms.is_none() {
                self.local.start_ms = Some(synthetic_start_ms(now, self.local.elapsed_secs));
            }
            self.refresh_elapsed(now);
        }

        self.record = Some(row);
    }

    fn refresh_elapsed(&mut self, now_ms: i64) {
        if let Some(start) = self.local.start_ms {
            self.local.elapsed_secs = running_elapsed_secs(
                now_ms,
                start,
                self.local.paused_ms,
                self.settings.max_elapsed_secs,
            );
        }
    }

    fn transition(&mut self, action: TimerAction, next: TimerPhase, now_ms: i64) {
        match action {
            TimerAction::Start => {
                self.local = LocalTimer {
                    start_ms: Some(now_ms),
                    ..LocalTimer::idle()
                };
            }
            TimerAction::Pause => {
                self.refresh_elapsed(now_ms);
                self.local.pause_start_ms = Some(now_ms);
            }
            TimerAction::Resume => self.local.fold_pause(now_ms),
            TimerAction::Done => {
                if self.local.phase == TimerPhase::Paused {
                    self.local.fold_pause(now_ms);
                } else {
                    self.refresh_elapsed(now_ms);
                }
                self.local.end_ms = Some(now_ms);
            }
            TimerAction::Continue => {
                self.local.start_ms = Some(synthetic_start_ms(now_ms, self.local.elapsed_secs));
                self.local.end_ms = None;
                self.local.paused_ms = 0;
                self.local.pause_start_ms = None;
            }
            TimerAction::Reset => self.local = LocalTimer::idle(),
        }
        self.local.phase = next;
    }

    fn save_cache(&self) {
        self.deps
            .cache
            .save(self.shop_id, self.station_id, self.local.to_cached());
    }

    fn publish(&self) -> TimerSnapshot {
        let snapshot = self.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::station_store::MemoryStationStore,
        timer::{
            MemoryTimerCache,
            phase::InvalidTransition,
            testing::{FlakyStationStore, ManualClientClock, ManualServerClock},
        },
    };

    const T: i64 = 1_714_558_830_000;

    struct Fixture {
        shop: Uuid,
        store: FlakyStationStore,
        server: ManualServerClock,
        client: ManualClientClock,
        cache: MemoryTimerCache,
    }

    impl Fixture {
        async fn new() -> Self {
            let memory = MemoryStationStore::new();
            let shop = Uuid::new_v4();
            memory
                .write_station(shop, 1, StationPatch::default())
                .await
                .unwrap();
            Self {
                shop,
                store: FlakyStationStore::new(memory),
                server: ManualServerClock::new(T),
                // Client wall clock runs 7 s behind the server.
                client: ManualClientClock::new(T - 7_000),
                cache: MemoryTimerCache::new(),
            }
        }

        fn engine(&self) -> TimerEngine {
            self.engine_with_client(self.client.clone())
        }

        fn engine_with_client(&self, client: ManualClientClock) -> TimerEngine {
            TimerEngine::new(
                self.shop,
                1,
                TimerDeps {
                    store: Arc::new(self.store.clone()),
                    server_clock: Arc::new(self.server.clone()),
                    client_clock: Arc::new(client),
                    cache: Arc::new(self.cache.clone()),
                },
                TimerSettings::default(),
            )
        }

        fn advance(&self, ms: i64) {
            self.server.advance(ms);
            self.client.advance(ms);
        }

        async fn stored(&self) -> StationEntity {
            self.store.read_station(self.shop, 1).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn elapsed_excludes_paused_time() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();

        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(40_000);
        let paused = engine.apply(TimerAction::Pause).await.unwrap();
        assert_eq!(paused.elapsed_secs, 40);

        fx.advance(20_000);
        assert_eq!(engine.tick().await.elapsed_secs, 40);
        let resumed = engine.apply(TimerAction::Resume).await.unwrap();
        assert_eq!(resumed.elapsed_secs, 40);
        assert_eq!(resumed.paused_secs, 20);

        fx.advance(10_000);
        assert_eq!(engine.tick().await.elapsed_secs, 50);

        let row = fx.stored().await;
        assert!(row.is_running && !row.is_paused);
        assert_eq!(row.paused_time, 20);
        assert_eq!(row.pause_start_time, None);
    }

    #[tokio::test]
    async fn immediate_pause_resume_keeps_elapsed() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();

        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(12_345);
        let before = engine.tick().await.elapsed_secs;
        engine.apply(TimerAction::Pause).await.unwrap();
        let after = engine.apply(TimerAction::Resume).await.unwrap();

        assert_eq!(after.elapsed_secs, before);
        assert_eq!(engine.tick().await.elapsed_secs, before);
    }

    #[tokio::test]
    async fn continue_resumes_from_frozen_value() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();

        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(100_000);
        let done = engine.apply(TimerAction::Done).await.unwrap();
        assert_eq!(done.elapsed_secs, 100);

        fx.advance(50_000);
        assert_eq!(engine.tick().await.elapsed_secs, 100);
        engine.apply(TimerAction::Continue).await.unwrap();

        fx.advance(30_000);
        assert_eq!(engine.tick().await.elapsed_secs, 130);
    }

    #[tokio::test]
    async fn done_while_paused_counts_the_open_pause() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();

        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(30_000);
        engine.apply(TimerAction::Pause).await.unwrap();
        fx.advance(45_000);
        let done = engine.apply(TimerAction::Done).await.unwrap();

        assert_eq!(done.elapsed_secs, 30);
        assert_eq!(done.paused_secs, 45);
        let row = fx.stored().await;
        assert!(row.is_done && !row.is_running && !row.is_paused);
        assert_eq!(row.elapsed_time, 30);
        assert!(row.end_time.is_some());
    }

    #[tokio::test]
    async fn resync_after_local_ticks_does_not_double_count() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();

        for _ in 0..65 {
            fx.advance(1_000);
            engine.tick().await;
        }
        assert_eq!(engine.snapshot().elapsed_secs, 65);
        assert_eq!(engine.resync().await.unwrap().elapsed_secs, 65);
    }

    #[tokio::test]
    async fn suspended_client_recovers_on_visibility_load() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();

        // Host sleeps: the monotonic clock stalls while real time passes.
        fx.server.advance(300_000);
        fx.client.suspend(300_000);
        assert_eq!(engine.tick().await.elapsed_secs, 0);

        assert_eq!(engine.load().await.unwrap().elapsed_secs, 300);
    }

    #[tokio::test]
    async fn second_client_rejects_start_on_running_station() {
        let fx = Fixture::new().await;
        let mut first = fx.engine();
        let mut second = fx.engine();
        first.load().await.unwrap();
        second.load().await.unwrap();

        first.apply(TimerAction::Start).await.unwrap();
        fx.advance(5_000);

        let err = second.apply(TimerAction::Start).await.unwrap_err();
        assert!(matches!(
            err,
            TimerError::InvalidTransition(InvalidTransition {
                from: TimerPhase::Running,
                action: TimerAction::Start
            })
        ));
        assert_eq!(second.snapshot().phase, TimerPhase::Running);
        assert_eq!(second.snapshot().elapsed_secs, 5);
    }

    #[tokio::test]
    async fn reload_recomputes_from_start_time() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(30_000);
        drop(engine);

        assert_eq!(fx.stored().await.elapsed_time, 0);
        let mut reloaded = fx.engine();
        assert_eq!(reloaded.load().await.unwrap().elapsed_secs, 30);
    }

    #[tokio::test]
    async fn failed_write_keeps_local_state_and_skips_observers() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        let mut observer = engine.subscribe();
        observer.borrow_and_update();

        fx.store.set_fail_writes(true);
        let err = engine.apply(TimerAction::Start).await.unwrap_err();
        assert!(matches!(err, TimerError::PersistenceWriteFailed { .. }));
        assert_eq!(engine.snapshot().phase, TimerPhase::Running);
        assert!(!observer.has_changed().unwrap());

        fx.store.set_fail_writes(false);
        assert_eq!(engine.load().await.unwrap().phase, TimerPhase::Idle);
    }

    #[tokio::test]
    async fn paid_event_is_idempotent_and_blocks_flushes() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(61_000);
        engine.tick().await;

        fx.store
            .write_station(fx.shop, 1, StationPatch::idle())
            .await
            .unwrap();
        let event = PushMessage::PaidEvent {
            station_ids: vec![1, 4],
            reset_data: None,
        };
        let once = engine.apply_push(&event).unwrap();
        let twice = engine.apply_push(&event).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.phase, TimerPhase::Idle);
        assert_eq!(once.elapsed_secs, 0);

        for _ in 0..12 {
            fx.advance(1_000);
            engine.tick().await;
        }
        assert_eq!(fx.stored().await.elapsed_time, 0);
    }

    #[tokio::test]
    async fn paid_event_for_other_stations_is_ignored() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();

        let event = PushMessage::PaidEvent {
            station_ids: vec![2],
            reset_data: None,
        };
        assert!(engine.apply_push(&event).is_none());
        assert_eq!(engine.snapshot().phase, TimerPhase::Running);
    }

    #[tokio::test]
    async fn flush_never_advances_a_run_finished_elsewhere() {
        let fx = Fixture::new().await;
        let mut ticking = fx.engine();
        let mut other = fx.engine();
        ticking.load().await.unwrap();
        ticking.apply(TimerAction::Start).await.unwrap();
        for _ in 0..15 {
            fx.advance(1_000);
            ticking.tick().await;
        }

        other.load().await.unwrap();
        let done = other.apply(TimerAction::Done).await.unwrap();
        assert_eq!(done.elapsed_secs, 15);

        for _ in 0..10 {
            fx.advance(1_000);
            ticking.tick().await;
        }
        let row = fx.stored().await;
        assert!(row.is_done);
        assert_eq!(row.elapsed_time, 15);
        assert_eq!(ticking.snapshot().phase, TimerPhase::Done);
        assert_eq!(ticking.snapshot().elapsed_secs, 15);

        let mut reloaded = fx.engine();
        assert_eq!(reloaded.load().await.unwrap().elapsed_secs, 15);
    }

    #[tokio::test]
    async fn flush_skips_a_run_restarted_elsewhere() {
        let fx = Fixture::new().await;
        let mut ticking = fx.engine();
        let mut other = fx.engine();
        ticking.load().await.unwrap();
        ticking.apply(TimerAction::Start).await.unwrap();
        fx.advance(30_000);

        other.load().await.unwrap();
        other.apply(TimerAction::Reset).await.unwrap();
        other.apply(TimerAction::Start).await.unwrap();

        for _ in 0..10 {
            fx.advance(1_000);
            ticking.tick().await;
        }
        assert_eq!(fx.stored().await.elapsed_time, 0);
        assert_eq!(ticking.snapshot().elapsed_secs, 10);
    }

    #[tokio::test]
    async fn explicit_paid_payload_is_idempotent_and_guards_ticks() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(90_000);
        engine.tick().await;

        let explicit = StationPatch {
            is_running: Some(true),
            elapsed_time: Some(5),
            start_time: Some(Some(from_unix_millis(fx.server.now_ms() - 5_000))),
            customer_name: Some(Some("Walk-in".into())),
            ..StationPatch::default()
        };
        let carried = PushMessage::PaidEvent {
            station_ids: vec![1],
            reset_data: Some(explicit.clone()),
        };
        fx.store
            .write_station(fx.shop, 1, StationPatch::idle().overlay(&explicit))
            .await
            .unwrap();

        let once = engine.apply_push(&carried).unwrap();
        let row_once = engine.record().cloned();
        let twice = engine.apply_push(&carried).unwrap();
        assert_eq!(once, twice);
        assert_eq!(engine.record().cloned(), row_once);
        assert_eq!(once.phase, TimerPhase::Running);
        assert_eq!(once.elapsed_secs, 5);
        let row = row_once.unwrap();
        assert_eq!(row.customer_name.as_deref(), Some("Walk-in"));
        assert_eq!(row.paused_time, 0);
        assert!(row.snacks.is_empty());

        fx.advance(2_000);
        assert_eq!(engine.tick().await.elapsed_secs, 5);

        fx.advance(2_000);
        assert_eq!(engine.tick().await.elapsed_secs, 9);
    }

    #[tokio::test]
    async fn ticks_flush_elapsed_periodically() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();

        for _ in 0..9 {
            fx.advance(1_000);
            engine.tick().await;
        }
        assert_eq!(fx.stored().await.elapsed_time, 0);

        fx.advance(1_000);
        engine.tick().await;
        assert_eq!(fx.stored().await.elapsed_time, 10);
    }

    #[tokio::test]
    async fn offline_clock_falls_back_to_corrected_wall_time() {
        let fx = Fixture::new().await;
        let mut engine = fx.engine();
        engine.load().await.unwrap();

        fx.server.set_offline(true);
        let started = engine.apply(TimerAction::Start).await.unwrap();
        assert!(!started.synced);
        fx.advance(20_000);
        assert_eq!(engine.tick().await.elapsed_secs, 20);
        assert!(matches!(
            engine.resync().await,
            Err(TimerError::ServerTimeUnavailable(_))
        ));

        let row = fx.stored().await;
        assert_eq!(row.start_time.map(unix_millis), Some(T));
    }

    #[tokio::test]
    async fn reset_clears_timer_but_keeps_customer() {
        let fx = Fixture::new().await;
        fx.store
            .write_station(
                fx.shop,
                1,
                StationPatch {
                    customer_name: Some(Some("Meera".into())),
                    ..StationPatch::default()
                },
            )
            .await
            .unwrap();
        let mut engine = fx.engine();
        engine.load().await.unwrap();
        engine.apply(TimerAction::Start).await.unwrap();
        fx.advance(8_000);

        let reset = engine.apply(TimerAction::Reset).await.unwrap();
        assert_eq!(reset.phase, TimerPhase::Idle);
        assert_eq!(reset.elapsed_secs, 0);
        let row = fx.stored().await;
        assert_eq!(row.start_time, None);
        assert_eq!(row.customer_name.as_deref(), Some("Meera"));
        assert!(fx.cache.load(fx.shop, 1).is_none());
    }
}
