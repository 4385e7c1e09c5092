//! reqwest-backed implementations of the timer engine's collaborators, so an
//! engine can run against a remote backend.

mod api;
mod error;
mod push;

pub use api::{HttpApi, HttpServerClock, HttpStationStore};
pub use error::{HttpClientError, HttpClientResult};
pub use push::{HttpPushChannel, SseDecoder, SseFrame};
