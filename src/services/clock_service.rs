use crate::{clock::ServerTime, state::SharedState};

/// Authoritative time sample handed to connected timer engines.
pub fn server_time(state: &SharedState) -> ServerTime {
    ServerTime::from_datetime(state.wall_clock().now())
}
