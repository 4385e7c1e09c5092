//! Pure elapsed-time arithmetic. All instants are Unix epoch milliseconds on the
//! authoritative (server) time line.

/// Seconds accumulated by a running session: `((now - start) - paused) / 1000`,
/// floored and clamped to `[0, max_secs]`.
pub fn running_elapsed_secs(now_ms: i64, start_ms: i64, paused_ms: i64, max_secs: u32) -> u32 {
    let active_ms = now_ms.saturating_sub(start_ms).saturating_sub(paused_ms);
    if active_ms <= 0 {
        return 0;
    }
    u32::try_from(active_ms / 1000).map_or(max_secs, |secs| secs.min(max_secs))
}

/// Length of an in-flight pause; a pause that appears to start in the future counts as zero.
pub fn pause_duration_ms(now_ms: i64, pause_start_ms: i64) -> i64 {
    now_ms.saturating_sub(pause_start_ms).max(0)
}

/// Start instant that reproduces `elapsed_secs` when measured at `now_ms`.
pub fn synthetic_start_ms(now_ms: i64, elapsed_secs: u32) -> i64 {
    now_ms - i64::from(elapsed_secs) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_714_558_830_000;

    #[test]
    fn subtracts_paused_time() {
        assert_eq!(running_elapsed_secs(T + 90_000, T, 30_000, 86_400), 60);
    }

    #[test]
    fn clamps_to_bounds() {
        assert_eq!(running_elapsed_secs(T - 5_000, T, 0, 86_400), 0);
        assert_eq!(running_elapsed_secs(T + 10_000, T, 20_000, 86_400), 0);
        assert_eq!(running_elapsed_secs(T + 90_000_000, T, 0, 86_400), 86_400);
    }

    #[test]
    fn floors_partial_seconds() {
        assert_eq!(running_elapsed_secs(T + 1_999, T, 0, 86_400), 1);
    }

    #[test]
    fn synthetic_start_round_trips() {
        let start = synthetic_start_ms(T, 725);
        assert_eq!(running_elapsed_secs(T, start, 0, 86_400), 725);
        assert_eq!(running_elapsed_secs(T + 5_000, start, 0, 86_400), 730);
    }

    #[test]
    fn future_pause_start_counts_as_zero() {
        assert_eq!(pause_duration_ms(T, T + 400), 0);
        assert_eq!(pause_duration_ms(T + 2_500, T), 2_500);
    }
}
