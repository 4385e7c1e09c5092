use thiserror::Error;
use uuid::Uuid;

use super::phase::InvalidTransition;
use crate::{
    clock::ClockError,
    dao::{models::StationId, storage::StorageError},
};

/// Failures surfaced by a [`TimerEngine`](super::engine::TimerEngine).
#[derive(Debug, Error)]
pub enum TimerError {
    /// Authoritative time could not be fetched; the engine keeps running on its
    /// local estimate.
    #[error(transparent)]
    ServerTimeUnavailable(#[from] ClockError),
    /// The transition was applied locally but not persisted.
    #[error("failed to persist station `{station_id}`")]
    PersistenceWriteFailed {
        station_id: StationId,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("station `{station_id}` of shop `{shop_id}` not found")]
    StationNotFound { shop_id: Uuid, station_id: StationId },
    /// The authoritative read needed to validate a transition failed.
    #[error("station store unavailable")]
    StoreUnavailable(#[source] StorageError),
    /// The runner task owning the engine is gone.
    #[error("timer runner stopped")]
    Stopped,
}

/// Raised when a push subscription cannot be opened.
#[derive(Debug, Error)]
#[error("push channel unavailable: {message}")]
pub struct PushError {
    pub message: String,
}

impl PushError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
