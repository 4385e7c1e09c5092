use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dao::models::StationEntity;

/// Lifecycle phase of a station timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Nothing billed, no start time.
    Idle,
    /// Accumulating elapsed time.
    Running,
    /// Running session with the clock frozen.
    Paused,
    /// Session closed; elapsed frozen until continued or reset.
    Done,
}

/// Operator actions applied to a station timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Done,
    Continue,
    Reset,
}

/// Error returned when an action cannot be applied from the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {action:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Phase the timer was in when the action was requested.
    pub from: TimerPhase,
    /// Rejected action.
    pub action: TimerAction,
}

impl TimerPhase {
    /// Derive the phase from persisted flags. `is_done` wins over the running flags
    /// so that an inconsistent row never counts as ticking.
    pub fn of(station: &StationEntity) -> Self {
        if station.is_done {
            TimerPhase::Done
        } else if station.is_running && station.is_paused {
            TimerPhase::Paused
        } else if station.is_running {
            TimerPhase::Running
        } else {
            TimerPhase::Idle
        }
    }

    /// Phase reached by applying `action`, or the reason it is rejected.
    pub fn next(self, action: TimerAction) -> Result<TimerPhase, InvalidTransition> {
        let next = match (self, action) {
            (TimerPhase::Idle, TimerAction::Start) => TimerPhase::Running,
            (TimerPhase::Running, TimerAction::Pause) => TimerPhase::Paused,
            (TimerPhase::Paused, TimerAction::Resume) => TimerPhase::Running,
            (TimerPhase::Running | TimerPhase::Paused, TimerAction::Done) => TimerPhase::Done,
            (TimerPhase::Done, TimerAction::Continue) => TimerPhase::Running,
            (TimerPhase::Running | TimerPhase::Paused | TimerPhase::Done, TimerAction::Reset) => {
                TimerPhase::Idle
            }
            (from, action) => return Err(InvalidTransition { from, action }),
        };
        Ok(next)
    }

    /// Whether elapsed time advances in this phase.
    pub fn is_ticking(self) -> bool {
        matches!(self, TimerPhase::Running)
    }
}
