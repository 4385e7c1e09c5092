//! Pure subscription status computation.

use time::{Duration, OffsetDateTime};

use crate::dao::models::SubscriptionStatus;

const DAY_MILLIS: i128 = 86_400_000;

/// Result of [`compute_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedStatus {
    pub status: SubscriptionStatus,
    /// Stored grace end, or the one derived from `expires_at` for a lapsed paid plan.
    pub grace_ends_at: Option<OffsetDateTime>,
}

/// Status as a function of the stored dates and plan. Trials get no grace period.
pub fn compute_status(
    now: OffsetDateTime,
    expires_at: OffsetDateTime,
    grace_ends_at: Option<OffsetDateTime>,
    plan_code: &str,
    trial_plan_code: &str,
    grace_period_days: u32,
) -> ComputedStatus {
    let is_trial = plan_code == trial_plan_code;

    if expires_at > now {
        let status = if is_trial {
            SubscriptionStatus::Trial
        } else {
            SubscriptionStatus::Active
        };
        return ComputedStatus {
            status,
            grace_ends_at,
        };
    }

    if is_trial {
        return ComputedStatus {
            status: SubscriptionStatus::Expired,
            grace_ends_at,
        };
    }

    let grace_end =
        grace_ends_at.unwrap_or(expires_at + Duration::days(i64::from(grace_period_days)));
    let status = if now < grace_end {
        SubscriptionStatus::Grace
    } else {
        SubscriptionStatus::Expired
    };
    ComputedStatus {
        status,
        grace_ends_at: Some(grace_end),
    }
}

/// Whole days until `expires_at`, rounded away from zero: 1 ms left counts as one
/// day, 1 ms past counts as minus one day. Exactly at expiry it is 0.
pub fn days_remaining(now: OffsetDateTime, expires_at: OffsetDateTime) -> i64 {
    let millis = (expires_at - now).whole_milliseconds();
    let days = (millis.abs() + DAY_MILLIS - 1) / DAY_MILLIS;
    let days = i64::try_from(days).unwrap_or(i64::MAX);
    if millis < 0 { -days } else { days }
}
