use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dao::models::{
    EventTrigger, PaymentMethod, PlanEntity, SubscriptionEventEntity, SubscriptionEventType,
    SubscriptionStatus,
};

/// Static plan attributes exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: u32,
    pub features: IndexMap<String, bool>,
    pub is_active: bool,
}

impl From<PlanEntity> for PlanView {
    fn from(value: PlanEntity) -> Self {
        Self {
            code: value.code,
            name: value.name,
            price_cents: value.price_cents,
            duration_days: value.duration_days,
            features: value.features,
            is_active: value.is_active,
        }
    }
}

/// Resolved subscription state of a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub shop_id: Uuid,
    pub plan_code: String,
    pub computed_status: SubscriptionStatus,
    /// True while the status is trial, active or grace.
    pub is_valid: bool,
    /// Whole days until expiry; negative once expired.
    pub days_remaining: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub grace_ends_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_status_check_at: Option<OffsetDateTime>,
    /// Absent when the plan row has been removed from the lookup table.
    pub plan: Option<PlanView>,
}

/// Audit entry as returned by the events listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventView {
    pub id: Uuid,
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
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<SubscriptionEventEntity> for SubscriptionEventView {
    fn from(value: SubscriptionEventEntity) -> Self {
        Self {
            id: value.id,
            event_type: value.event_type,
            trigger: value.trigger,
            old_plan_code: value.old_plan_code,
            new_plan_code: value.new_plan_code,
            old_status: value.old_status,
            new_status: value.new_status,
            old_expires_at: value.old_expires_at,
            new_expires_at: value.new_expires_at,
            metadata: value.metadata,
            created_at: value.created_at,
        }
    }
}

/// Payload used to create a shop's subscription.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    /// Defaults to the trial plan.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub plan_code: Option<String>,
}

/// Payment recorded alongside a renewal.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    #[validate(range(min = 0))]
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub reference: Option<String>,
}

/// Payload of `POST /shops/{shop_id}/subscription/renew`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub plan_code: String,
    #[serde(default)]
    pub payment: Option<PaymentInput>,
}

impl Validate for RenewRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.plan_code.trim().is_empty() {
            let mut err = ValidationError::new("plan_code");
            err.message = Some("planCode must not be empty".into());
            errors.add("planCode", err);
        }

        if let Some(payment) = &self.payment {
            if let Err(payment_errors) = payment.validate() {
                errors.merge_self("payment", Err(payment_errors));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Query string of the events listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Number of events to return (1 to 100, default 20).
    pub limit: Option<u32>,
}
