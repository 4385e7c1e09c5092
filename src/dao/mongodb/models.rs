use indexmap::IndexMap;
use mongodb::bson::{Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    clock::{from_unix_millis, unix_millis},
    dao::models::{
        EventTrigger, PaymentEntity, PaymentMethod, PlanEntity, StationEntity, StationId,
        StationPatch, SubscriptionEntity, SubscriptionEventEntity, SubscriptionEventType,
        SubscriptionStatus,
    },
};

pub const STATION_COLLECTION: &str = "stations";
pub const SUBSCRIPTION_COLLECTION: &str = "subscriptions";
pub const SUBSCRIPTION_LOCK_COLLECTION: &str = "subscription_locks";
pub const EVENT_COLLECTION: &str = "subscription_events";
pub const PAYMENT_COLLECTION: &str = "payments";
pub const PLAN_COLLECTION: &str = "plans";

fn to_bson_time(value: OffsetDateTime) -> DateTime {
    DateTime::from_millis(unix_millis(value))
}

fn from_bson_time(value: DateTime) -> OffsetDateTime {
    from_unix_millis(value.timestamp_millis())
}

fn optional_time(value: Option<OffsetDateTime>) -> Bson {
    value.map_or(Bson::Null, |t| Bson::DateTime(to_bson_time(t)))
}

fn parse_uuid(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::CorruptDocument {
        collection,
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn narrow(collection: &'static str, id: &str, value: i64) -> MongoResult<u32> {
    u32::try_from(value).map_err(|err| MongoDaoError::CorruptDocument {
        collection,
        id: id.to_owned(),
        reason: err.to_string(),
    })
}

pub fn station_key(shop_id: Uuid, station_id: StationId) -> String {
    format!("{shop_id}:{station_id}")
}

pub fn station_filter(shop_id: Uuid, station_id: StationId) -> Document {
    doc! { "_id": station_key(shop_id, station_id) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStationDocument {
    #[serde(rename = "_id")]
    id: String,
    shop_id: String,
    station_id: i64,
    elapsed_time: i64,
    is_running: bool,
    is_paused: bool,
    is_done: bool,
    start_time: Option<DateTime>,
    end_time: Option<DateTime>,
    paused_time: i64,
    pause_start_time: Option<DateTime>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    #[serde(default)]
    extra_controllers: i64,
    #[serde(default)]
    snacks: IndexMap<String, i64>,
}

impl TryFrom<MongoStationDocument> for StationEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoStationDocument) -> MongoResult<Self> {
        let id = value.id.as_str();
        let snacks = value
            .snacks
            .into_iter()
            .map(|(name, count)| narrow(STATION_COLLECTION, id, count).map(|count| (name, count)))
            .collect::<MongoResult<IndexMap<_, _>>>()?;

        Ok(Self {
            id: narrow(STATION_COLLECTION, id, value.station_id)?,
            shop_id: parse_uuid(STATION_COLLECTION, &value.shop_id)?,
            elapsed_time: narrow(STATION_COLLECTION, id, value.elapsed_time)?,
            is_running: value.is_running,
            is_paused: value.is_paused,
            is_done: value.is_done,
            start_time: value.start_time.map(from_bson_time),
            end_time: value.end_time.map(from_bson_time),
            paused_time: u64::try_from(value.paused_time).unwrap_or_default(),
            pause_start_time: value.pause_start_time.map(from_bson_time),
            customer_name: value.customer_name,
            customer_phone: value.customer_phone,
            extra_controllers: narrow(STATION_COLLECTION, id, value.extra_controllers)?,
            snacks,
        })
    }
}

fn snacks_document(snacks: &IndexMap<String, u32>) -> Document {
    snacks
        .iter()
        .map(|(name, count)| (name.clone(), Bson::Int64(i64::from(*count))))
        .collect()
}

/// `$set` body carrying exactly the fields present in the patch.
pub fn patch_set_document(patch: &StationPatch) -> Document {
    let mut set = Document::new();
    if let Some(value) = patch.elapsed_time {
        set.insert(
            "elapsed_time",
            i64::from(value.min(crate::dao::models::MAX_ELAPSED_SECS)),
        );
    }
    if let Some(value) = patch.is_running {
        set.insert("is_running", value);
    }
    if let Some(value) = patch.is_paused {
        set.insert("is_paused", value);
    }
    if let Some(value) = patch.is_done {
        set.insert("is_done", value);
    }
    if let Some(value) = patch.start_time {
        set.insert("start_time", optional_time(value));
    }
    if let Some(value) = patch.end_time {
        set.insert("end_time", optional_time(value));
    }
    if let Some(value) = patch.paused_time {
        set.insert("paused_time", i64::try_from(value).unwrap_or(i64::MAX));
    }
    if let Some(value) = patch.pause_start_time {
        set.insert("pause_start_time", optional_time(value));
    }
    if let Some(value) = &patch.customer_name {
        set.insert("customer_name", value.clone());
    }
    if let Some(value) = &patch.customer_phone {
        set.insert("customer_phone", value.clone());
    }
    if let Some(value) = patch.extra_controllers {
        set.insert("extra_controllers", i64::from(value));
    }
    if let Some(value) = &patch.snacks {
        set.insert("snacks", snacks_document(value));
    }
    set
}

/// `$setOnInsert` body creating an idle row, minus the keys the `$set` already writes.
pub fn idle_insert_document(shop_id: Uuid, station_id: StationId, set: &Document) -> Document {
    let mut insert = doc! {
        "shop_id": shop_id.to_string(),
        "station_id": i64::from(station_id),
        "elapsed_time": 0_i64,
        "is_running": false,
        "is_paused": false,
        "is_done": false,
        "start_time": Bson::Null,
        "end_time": Bson::Null,
        "paused_time": 0_i64,
        "pause_start_time": Bson::Null,
        "customer_name": Bson::Null,
        "customer_phone": Bson::Null,
        "extra_controllers": 0_i64,
        "snacks": Document::new(),
    };
    for key in set.keys() {
        insert.remove(key);
    }
    insert
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSubscriptionDocument {
    #[serde(rename = "_id")]
    id: String,
    current_plan_code: String,
    started_at: DateTime,
    expires_at: DateTime,
    grace_ends_at: Option<DateTime>,
    computed_status: SubscriptionStatus,
    last_status_check_at: Option<DateTime>,
    updated_at: DateTime,
}

impl From<&SubscriptionEntity> for MongoSubscriptionDocument {
    fn from(value: &SubscriptionEntity) -> Self {
        Self {
            id: value.shop_id.to_string(),
            current_plan_code: value.current_plan_code.clone(),
            started_at: to_bson_time(value.started_at),
            expires_at: to_bson_time(value.expires_at),
            grace_ends_at: value.grace_ends_at.map(to_bson_time),
            computed_status: value.computed_status,
            last_status_check_at: value.last_status_check_at.map(to_bson_time),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSubscriptionDocument> for SubscriptionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSubscriptionDocument) -> MongoResult<Self> {
        Ok(Self {
            shop_id: parse_uuid(SUBSCRIPTION_COLLECTION, &value.id)?,
            current_plan_code: value.current_plan_code,
            started_at: from_bson_time(value.started_at),
            expires_at: from_bson_time(value.expires_at),
            grace_ends_at: value.grace_ends_at.map(from_bson_time),
            computed_status: value.computed_status,
            last_status_check_at: value.last_status_check_at.map(from_bson_time),
            updated_at: from_bson_time(value.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: String,
    shop_id: String,
    event_type: SubscriptionEventType,
    trigger: EventTrigger,
    old_plan_code: Option<String>,
    new_plan_code: String,
    old_status: Option<SubscriptionStatus>,
    new_status: SubscriptionStatus,
    old_expires_at: Option<DateTime>,
    new_expires_at: DateTime,
    /// JSON-encoded metadata object.
    metadata: String,
    created_at: DateTime,
}

impl From<&SubscriptionEventEntity> for MongoEventDocument {
    fn from(value: &SubscriptionEventEntity) -> Self {
        Self {
            id: value.id.to_string(),
            shop_id: value.shop_id.to_string(),
            event_type: value.event_type,
            trigger: value.trigger,
            old_plan_code: value.old_plan_code.clone(),
            new_plan_code: value.new_plan_code.clone(),
            old_status: value.old_status,
            new_status: value.new_status,
            old_expires_at: value.old_expires_at.map(to_bson_time),
            new_expires_at: to_bson_time(value.new_expires_at),
            metadata: value.metadata.to_string(),
            created_at: to_bson_time(value.created_at),
        }
    }
}

impl TryFrom<MongoEventDocument> for SubscriptionEventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEventDocument) -> MongoResult<Self> {
        let metadata = serde_json::from_str(&value.metadata).map_err(|err| {
            MongoDaoError::CorruptDocument {
                collection: EVENT_COLLECTION,
                id: value.id.clone(),
                reason: err.to_string(),
            }
        })?;

        Ok(Self {
            id: parse_uuid(EVENT_COLLECTION, &value.id)?,
            shop_id: parse_uuid(EVENT_COLLECTION, &value.shop_id)?,
            event_type: value.event_type,
            trigger: value.trigger,
            old_plan_code: value.old_plan_code,
            new_plan_code: value.new_plan_code,
            old_status: value.old_status,
            new_status: value.new_status,
            old_expires_at: value.old_expires_at.map(from_bson_time),
            new_expires_at: from_bson_time(value.new_expires_at),
            metadata,
            created_at: from_bson_time(value.created_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPaymentDocument {
    #[serde(rename = "_id")]
    id: String,
    shop_id: String,
    plan_code: String,
    amount_cents: i64,
    method: PaymentMethod,
    reference: Option<String>,
    paid_at: DateTime,
}

impl From<&PaymentEntity> for MongoPaymentDocument {
    fn from(value: &PaymentEntity) -> Self {
        Self {
            id: value.id.to_string(),
            shop_id: value.shop_id.to_string(),
            plan_code: value.plan_code.clone(),
            amount_cents: value.amount_cents,
            method: value.method,
            reference: value.reference.clone(),
            paid_at: to_bson_time(value.paid_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlanDocument {
    #[serde(rename = "_id")]
    code: String,
    name: String,
    price_cents: i64,
    duration_days: i64,
    #[serde(default)]
    features: IndexMap<String, bool>,
    is_active: bool,
}

impl From<&PlanEntity> for MongoPlanDocument {
    fn from(value: &PlanEntity) -> Self {
        Self {
            code: value.code.clone(),
            name: value.name.clone(),
            price_cents: value.price_cents,
            duration_days: i64::from(value.duration_days),
            features: value.features.clone(),
            is_active: value.is_active,
        }
    }
}

impl TryFrom<MongoPlanDocument> for PlanEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlanDocument) -> MongoResult<Self> {
        Ok(Self {
            duration_days: narrow(PLAN_COLLECTION, &value.code, value.duration_days)?,
            code: value.code,
            name: value.name,
            price_cents: value.price_cents,
            features: value.features,
            is_active: value.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn set_document_writes_nulls_for_cleared_fields() {
        let patch = StationPatch {
            start_time: Some(None),
            customer_name: Some(None),
            is_running: Some(false),
            ..StationPatch::default()
        };
        let set = patch_set_document(&patch);
        assert_eq!(set.get("start_time"), Some(&Bson::Null));
        assert_eq!(set.get("customer_name"), Some(&Bson::Null));
        assert_eq!(set.get_bool("is_running").ok(), Some(false));
        assert!(!set.contains_key("end_time"));
    }

    #[test]
    fn insert_defaults_skip_keys_already_set() {
        let shop = Uuid::new_v4();
        let set = doc! { "is_running": true };
        let insert = idle_insert_document(shop, 3, &set);
        assert!(!insert.contains_key("is_running"));
        assert_eq!(insert.get_i64("station_id").ok(), Some(3));
    }

    #[test]
    fn subscription_document_round_trips_dates() {
        let entity = SubscriptionEntity {
            shop_id: Uuid::new_v4(),
            current_plan_code: "monthly".into(),
            started_at: datetime!(2024-05-01 10:00 UTC),
            expires_at: datetime!(2024-05-31 10:00 UTC),
            grace_ends_at: Some(datetime!(2024-06-03 10:00 UTC)),
            computed_status: SubscriptionStatus::Grace,
            last_status_check_at: None,
            updated_at: datetime!(2024-05-31 11:00 UTC),
        };
        let restored = SubscriptionEntity::try_from(MongoSubscriptionDocument::from(&entity)).unwrap();
        assert_eq!(restored, entity);
    }
}
