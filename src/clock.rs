//! Time sources shared by the server (authoritative clock) and by timer engines
//! running on connected clients (drifting local clock).

use std::time::Instant;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;

/// Authoritative server timestamp as exposed by `GET /time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    /// Milliseconds since the Unix epoch.
    pub timestamp_millis: i64,
    /// Same instant rendered as RFC 3339.
    pub iso_string: String,
}

impl ServerTime {
    /// Build a sample from an absolute instant.
    pub fn from_datetime(now: OffsetDateTime) -> Self {
        Self {
            timestamp_millis: unix_millis(now),
            iso_string: now.format(&Rfc3339).unwrap_or_else(|_| "invalid-timestamp".into()),
        }
    }
}

/// Raised when the authoritative clock cannot be reached.
#[derive(Debug, Error)]
#[error("server time unavailable: {message}")]
pub struct ClockError {
    /// Human-readable reason.
    pub message: String,
}

impl ClockError {
    /// Construct a clock error from any displayable reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of authoritative time. Remote clients reach it over the network.
pub trait ServerClock: Send + Sync {
    fn server_time(&self) -> BoxFuture<'static, Result<ServerTime, ClockError>>;
}

/// Synchronous "now" used by server-side computations.
pub trait WallClock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Local clock of a connected client.
///
/// `monotonic_millis` never jumps with wall-clock adjustments but may stall while the
/// host is suspended; `wall_millis` is the (possibly skewed) local wall clock.
pub trait ClientClock: Send + Sync {
    fn monotonic_millis(&self) -> i64;
    fn wall_millis(&self) -> i64;
}

/// Process clock backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl ServerClock for SystemClock {
    fn server_time(&self) -> BoxFuture<'static, Result<ServerTime, ClockError>> {
        let now = OffsetDateTime::now_utc();
        Box::pin(async move { Ok(ServerTime::from_datetime(now)) })
    }
}

impl ClientClock for SystemClock {
    fn monotonic_millis(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn wall_millis(&self) -> i64 {
        unix_millis(OffsetDateTime::now_utc())
    }
}

/// Milliseconds since the Unix epoch for the given instant.
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Inverse of [`unix_millis`]. Out-of-range values clamp to the Unix epoch.
pub fn from_unix_millis(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
