use crate::clock::{ClientClock, ServerTime};

/// Pairing of an authoritative sample with the client's monotonic reading at
/// the moment it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncAnchor {
    server_ms: i64,
    client_monotonic_ms: i64,
}

/// Estimates authoritative time between server samples.
///
/// With an anchor, the estimate advances by the client's monotonic delta so a
/// wall-clock jump on the client has no effect. Without one (never synced, reset,
/// or the last resync failed) it falls back to the client wall clock corrected by
/// the last observed offset.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    anchor: Option<SyncAnchor>,
    last_offset_ms: Option<i64>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-anchor on a fresh server sample.
    pub fn record(&mut self, sample: &ServerTime, client: &dyn ClientClock) {
        self.anchor = Some(SyncAnchor {
            server_ms: sample.timestamp_millis,
            client_monotonic_ms: client.monotonic_millis(),
        });
        self.last_offset_ms = Some(sample.timestamp_millis - client.wall_millis());
    }

    /// Current authoritative time estimate in epoch milliseconds.
    pub fn estimate(&self, client: &dyn ClientClock) -> i64 {
        match self.anchor {
            Some(anchor) => {
                let delta = (client.monotonic_millis() - anchor.client_monotonic_ms).max(0);
                anchor.server_ms + delta
            }
            None => client.wall_millis() + self.last_offset_ms.unwrap_or(0),
        }
    }

    /// Drop the anchor after a failed resync. The monotonic clock may have stalled
    /// during a suspension, so the wall clock plus last offset is the safer guess.
    pub fn fall_back(&mut self) {
        self.anchor = None;
    }

    /// Forget every derived value.
    pub fn clear(&mut self) {
        self.anchor = None;
        self.last_offset_ms = None;
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::testing::ManualClientClock;

    const T: i64 = 1_714_558_830_000;

    fn sample(ms: i64) -> ServerTime {
        ServerTime {
            timestamp_millis: ms,
            iso_string: String::new(),
        }
    }

    #[test]
    fn advances_with_monotonic_clock() {
        let client = ManualClientClock::new(T - 4_000);
        let mut sync = ClockSync::new();
        sync.record(&sample(T), &client);

        client.advance(65_000);
        assert_eq!(sync.estimate(&client), T + 65_000);
    }

    #[test]
    fn ignores_client_wall_jumps_while_anchored() {
        let client = ManualClientClock::new(T);
        let mut sync = ClockSync::new();
        sync.record(&sample(T), &client);

        client.jump_wall(-3_600_000);
        client.advance(1_000);
        assert_eq!(sync.estimate(&client), T + 1_000);
    }

    #[test]
    fn falls_back_to_offset_corrected_wall_clock() {
        let client = ManualClientClock::new(T - 7_000);
        let mut sync = ClockSync::new();
        sync.record(&sample(T), &client);

        sync.fall_back();
        client.suspend(30_000);
        assert_eq!(sync.estimate(&client), T + 30_000);
        assert!(!sync.is_anchored());
    }

    #[test]
    fn unsynced_estimate_is_client_wall_clock() {
        let client = ManualClientClock::new(T);
        assert_eq!(ClockSync::new().estimate(&client), T);
    }
}
