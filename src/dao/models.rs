use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::dao::serde_helpers::nullable_rfc3339;

/// Station number, unique within a shop.
pub type StationId = u32;

/// Hard ceiling on the elapsed time a station may accumulate (24 hours).
pub const MAX_ELAPSED_SECS: u32 = 86_400;

/// Timer and billing state of a single station, keyed by `(shop_id, id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationEntity {
    pub id: StationId,
    pub shop_id: Uuid,
    /// Accumulated running seconds, excluding paused time.
    pub elapsed_time: u32,
    pub is_running: bool,
    /// Sub-state of running: a paused station is still `is_running`.
    pub is_paused: bool,
    pub is_done: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// Cumulative seconds spent paused during the current run.
    pub paused_time: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub pause_start_time: Option<OffsetDateTime>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub extra_controllers: u32,
    #[serde(default)]
    pub snacks: IndexMap<String, u32>,
}

impl StationEntity {
    /// A fresh idle station row.
    pub fn idle(shop_id: Uuid, id: StationId) -> Self {
        Self {
            id,
            shop_id,
            elapsed_time: 0,
            is_running: false,
            is_paused: false,
            is_done: false,
            start_time: None,
            end_time: None,
            paused_time: 0,
            pause_start_time: None,
            customer_name: None,
            customer_phone: None,
            extra_controllers: 0,
            snacks: IndexMap::new(),
        }
    }

    /// Overwrite every field present in `patch`, leaving the others untouched.
    pub fn apply_patch(&mut self, patch: &StationPatch) {
        if let Some(value) = patch.elapsed_time {
            self.elapsed_time = value.min(MAX_ELAPSED_SECS);
        }
        if let Some(value) = patch.is_running {
            self.is_running = value;
        }
        if let Some(value) = patch.is_paused {
            self.is_paused = value;
        }
        if let Some(value) = patch.is_done {
            self.is_done = value;
        }
        if let Some(value) = patch.start_time {
            self.start_time = value;
        }
        if let Some(value) = patch.end_time {
            self.end_time = value;
        }
        if let Some(value) = patch.paused_time {
            self.paused_time = value;
        }
        if let Some(value) = patch.pause_start_time {
            self.pause_start_time = value;
        }
        if let Some(value) = &patch.customer_name {
            self.customer_name = value.clone();
        }
        if let Some(value) = &patch.customer_phone {
            self.customer_phone = value.clone();
        }
        if let Some(value) = patch.extra_controllers {
            self.extra_controllers = value;
        }
        if let Some(value) = &patch.snacks {
            self.snacks = value.clone();
        }
    }
}

/// Partial station record. Absent fields are left alone; for nullable fields an
/// explicit `null` clears the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable_rfc3339")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub start_time: Option<Option<OffsetDateTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable_rfc3339")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<Option<OffsetDateTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable_rfc3339")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub pause_start_time: Option<Option<OffsetDateTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub customer_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub customer_phone: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_controllers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snacks: Option<IndexMap<String, u32>>,
}

impl StationPatch {
    /// Patch that returns a station to idle and clears the billed customer session.
    pub fn idle() -> Self {
        Self {
            elapsed_time: Some(0),
            is_running: Some(false),
            is_paused: Some(false),
            is_done: Some(false),
            start_time: Some(None),
            end_time: Some(None),
            paused_time: Some(0),
            pause_start_time: Some(None),
            customer_name: Some(None),
            customer_phone: Some(None),
            extra_controllers: Some(0),
            snacks: Some(IndexMap::new()),
        }
    }

    /// Layer the fields present in `other` over `self`.
    pub fn overlay(mut self, other: &StationPatch) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            elapsed_time,
            is_running,
            is_paused,
            is_done,
            start_time,
            end_time,
            paused_time,
            pause_start_time,
            customer_name,
            customer_phone,
            extra_controllers,
            snacks
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Validate for StationPatch {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();

        if self.elapsed_time.is_some_and(|elapsed| elapsed > MAX_ELAPSED_SECS) {
            let mut err = ValidationError::new("elapsed_time_range");
            err.message = Some(format!("elapsedTime must not exceed {MAX_ELAPSED_SECS}").into());
            errors.add("elapsedTime", err);
        }

        if self.is_done == Some(true) && self.is_running == Some(true) {
            let mut err = ValidationError::new("timer_flags");
            err.message = Some("a done station cannot be running".into());
            errors.add("isDone", err);
        }

        if self.is_paused == Some(true) && self.is_running == Some(false) {
            let mut err = ValidationError::new("timer_flags");
            err.message = Some("a paused station must be running".into());
            errors.add("isPaused", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Lifecycle status derived from a subscription's dates and plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Grace,
    Expired,
}

impl SubscriptionStatus {
    /// Whether requests from the shop are allowed through.
    pub fn is_valid(self) -> bool {
        !matches!(self, SubscriptionStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Grace => "grace",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

/// One subscription row per shop. `computed_status` caches a pure function of
/// the dates and plan; it is never authoritative on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionEntity {
    pub shop_id: Uuid,
    pub current_plan_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub grace_ends_at: Option<OffsetDateTime>,
    pub computed_status: SubscriptionStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_status_check_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Kind of audit entry written to the subscription event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventType {
    Created,
    StatusChanged,
    Renewed,
    Upgraded,
    Downgraded,
}

/// What caused an audit entry to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventTrigger {
    Provisioning,
    LazyCheck,
    Renewal,
}

/// Append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEventEntity {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub event_type: SubscriptionEventType,
    pub trigger: EventTrigger,
    pub old_plan_code: Option<String>,
    pub new_plan_code: String,
    pub old_status: Option<SubscriptionStatus>,
    pub new_status: SubscriptionStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub old_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub new_expires_at: OffsetDateTime,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Static plan attributes from the plans lookup table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntity {
    pub code: String,
    pub name: String,
    /// Price in minor currency units.
    pub price_cents: i64,
    pub duration_days: u32,
    #[serde(default)]
    pub features: IndexMap<String, bool>,
    pub is_active: bool,
}

/// How a renewal was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Other,
}

/// Payment recorded alongside a renewal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub plan_code: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
}
