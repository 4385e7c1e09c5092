//! Per-station elapsed-time tracking for connected clients.
//!
//! A [`TimerEngine`](engine::TimerEngine) owns one station's local state, reconciles
//! it against authoritative server time and the Station Store, and reacts to paid
//! events pushed for its shop. [`runner::spawn`] drives an engine on a task.

pub mod cache;
pub mod elapsed;
pub mod engine;
pub mod error;
pub mod phase;
pub mod runner;
pub mod sync;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use futures::{future::BoxFuture, stream::BoxStream};
use serde::Deserialize;
use uuid::Uuid;

use crate::dao::models::MAX_ELAPSED_SECS;
use crate::dto::push::PushMessage;

pub use cache::{MemoryTimerCache, TimerCache};
pub use engine::{TimerDeps, TimerEngine, TimerSnapshot};
pub use error::{PushError, TimerError};
pub use phase::{TimerAction, TimerPhase};
pub use runner::{TimerHandle, Visibility};

/// Engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub tick_interval_ms: u64,
    pub resync_interval_secs: u64,
    /// Persist `elapsedTime` every this many ticks; ticks in between only hit the cache.
    pub flush_every_ticks: u32,
    /// How long ticks are suppressed after an external reset.
    pub reset_guard_ms: i64,
    pub max_elapsed_secs: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            resync_interval_secs: 30,
            flush_every_ticks: 10,
            reset_guard_ms: 3000,
            max_elapsed_secs: MAX_ELAPSED_SECS,
        }
    }
}

impl TimerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }
}

/// Shop-scoped stream of push messages. Delivery is at-most-once.
pub trait PushChannel: Send + Sync {
    fn subscribe(
        &self,
        shop_id: Uuid,
    ) -> BoxFuture<'static, Result<BoxStream<'static, PushMessage>, PushError>>;
}
