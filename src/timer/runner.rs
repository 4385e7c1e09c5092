use std::future::pending;

use futures::{StreamExt, stream::BoxStream};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tracing::{debug, warn};

use super::{
    engine::{TimerEngine, TimerSnapshot},
    error::TimerError,
    phase::TimerAction,
};
use crate::dto::push::PushMessage;

/// Host visibility. Loops only run while visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

type Reply = oneshot::Sender<Result<TimerSnapshot, TimerError>>;

enum Command {
    Apply(TimerAction, Reply),
    Reload(Reply),
}

/// Handle to an engine running on its own task.
pub struct TimerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TimerSnapshot>,
    visibility: watch::Sender<Visibility>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub async fn apply(&self, action: TimerAction) -> Result<TimerSnapshot, TimerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Apply(action, reply), response).await
    }

    pub async fn start(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Start).await
    }

    pub async fn pause(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Pause).await
    }

    pub async fn resume(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Resume).await
    }

    pub async fn done(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Done).await
    }

    pub async fn continue_session(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Continue).await
    }

    pub async fn reset(&self) -> Result<TimerSnapshot, TimerError> {
        self.apply(TimerAction::Reset).await
    }

    /// Re-read the stored row and resync the clock.
    pub async fn reload(&self) -> Result<TimerSnapshot, TimerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Reload(reply), response).await
    }

    pub fn snapshots(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.send_replace(visibility);
    }

    /// Stop the loops and wait for the task to end. Nothing is written to the store.
    pub async fn stop(self) {
        drop(self.commands);
        drop(self.visibility);
        if let Err(err) = self.task.await {
            warn!(error = %err, "timer runner ended abnormally");
        }
    }

    async fn send(
        &self,
        command: Command,
        response: oneshot::Receiver<Result<TimerSnapshot, TimerError>>,
    ) -> Result<TimerSnapshot, TimerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TimerError::Stopped)?;
        response.await.map_err(|_| TimerError::Stopped)?
    }
}

/// Run `engine` on a new task, starting visible.
///
/// The engine is loaded first; a failed load is logged and retried on the next
/// visibility change. `push` feeds paid events for the engine's shop.
pub fn spawn(engine: TimerEngine, push: Option<BoxStream<'static, PushMessage>>) -> TimerHandle {
    let (commands, command_rx) = mpsc::channel(16);
    let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
    let snapshots = engine.subscribe();
    let task = tokio::spawn(run(engine, command_rx, visibility_rx, push));

    TimerHandle {
        commands,
        snapshots,
        visibility,
        task,
    }
}

fn ticking(period: std::time::Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn next_push(push: &mut Option<BoxStream<'static, PushMessage>>) -> Option<PushMessage> {
    match push {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn run(
    mut engine: TimerEngine,
    mut commands: mpsc::Receiver<Command>,
    mut visibility: watch::Receiver<Visibility>,
    mut push: Option<BoxStream<'static, PushMessage>>,
) {
    let tick_period = engine.settings().tick_interval();
    let resync_period = engine.settings().resync_interval();
    let shop_id = engine.shop_id();
    let station_id = engine.station_id();

    if let Err(err) = engine.load().await {
        warn!(%shop_id, station_id, error = %err, "initial timer load failed");
    }
    let mut tick = Some(ticking(tick_period));
    let mut resync = Some(ticking(resync_period));

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Apply(action, reply)) => {
                    let _ = reply.send(engine.apply(action).await);
                }
                Some(Command::Reload(reply)) => {
                    let _ = reply.send(engine.load().await);
                }
                None => break,
            },
            _ = next_tick(&mut tick) => {
                engine.tick().await;
            }
            _ = next_tick(&mut resync) => {
                if let Err(err) = engine.resync().await {
                    debug!(%shop_id, station_id, error = %err, "periodic resync failed");
                }
            }
            changed = visibility.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *visibility.borrow_and_update();
                match current {
                    Visibility::Hidden => {
                        debug!(%shop_id, station_id, "host hidden; suspending timer loops");
                        tick = None;
                        resync = None;
                    }
                    Visibility::Visible => {
                        if let Err(err) = engine.load().await {
                            warn!(%shop_id, station_id, error = %err, "reload on visibility failed");
                        }
                        tick = Some(ticking(tick_period));
                        resync = Some(ticking(resync_period));
                    }
                }
            }
            message = next_push(&mut push) => match message {
                Some(message) => {
                    engine.apply_push(&message);
                }
                None => {
                    warn!(%shop_id, station_id, "push stream ended");
                    push = None;
                }
            },
        }
    }
    debug!(%shop_id, station_id, "timer runner stopped");
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::stream;
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::{
            models::StationPatch,
            station_store::{MemoryStationStore, StationStore},
        },
        timer::{
            MemoryTimerCache, TimerDeps, TimerPhase, TimerSettings,
            testing::{ManualClientClock, ManualServerClock},
        },
    };

    const T: i64 = 1_714_558_830_000;

    async fn fixture() -> (
        MemoryStationStore,
        ManualServerClock,
        ManualClientClock,
        TimerEngine,
    ) {
        let store = MemoryStationStore::new();
        let shop = Uuid::new_v4();
        store
            .write_station(shop, 3, StationPatch::default())
            .await
            .unwrap();
        let server = ManualServerClock::new(T);
        let client = ManualClientClock::new(T);
        let engine = TimerEngine::new(
            shop,
            3,
            TimerDeps {
                store: Arc::new(store.clone()),
                server_clock: Arc::new(server.clone()),
                client_clock: Arc::new(client.clone()),
                cache: Arc::new(MemoryTimerCache::new()),
            },
            TimerSettings::default(),
        );
        (store, server, client, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_drive_observers_until_hidden() {
        let (_store, server, client, engine) = fixture().await;
        let handle = spawn(engine, None);
        handle.start().await.unwrap();

        let mut snapshots = handle.snapshots();
        server.advance(3_000);
        client.advance(3_000);
        snapshots
            .wait_for(|snapshot| snapshot.elapsed_secs == 3)
            .await
            .unwrap();

        handle.set_visibility(Visibility::Hidden);
        tokio::task::yield_now().await;
        server.advance(5_000);
        client.advance(5_000);
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(handle.current().elapsed_secs, 3);

        handle.set_visibility(Visibility::Visible);
        snapshots
            .wait_for(|snapshot| snapshot.elapsed_secs == 8)
            .await
            .unwrap();

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_reset_reaches_observers() {
        let (_store, _server, _client, engine) = fixture().await;
        let event = PushMessage::PaidEvent {
            station_ids: vec![3],
            reset_data: None,
        };
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let push = stream::unfold(push_rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })
        .boxed();

        let handle = spawn(engine, Some(push));
        let started = handle.start().await.unwrap();
        assert_eq!(started.phase, TimerPhase::Running);

        push_tx.send(event).unwrap();
        let mut snapshots = handle.snapshots();
        snapshots
            .wait_for(|snapshot| snapshot.phase == TimerPhase::Idle)
            .await
            .unwrap();
        handle.stop().await;
    }

    #[tokio::test]
    async fn stopping_leaves_the_store_untouched() {
        let (store, _server, _client, engine) = fixture().await;
        let shop = engine.shop_id();
        let handle = spawn(engine, None);
        handle.start().await.unwrap();
        let before = store.read_station(shop, 3).await.unwrap();

        handle.stop().await;
        assert_eq!(store.read_station(shop, 3).await.unwrap(), before);
    }
}
