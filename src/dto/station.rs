use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dao::models::{StationEntity, StationId, StationPatch};

/// Upper bound on the stations a single paid request may reset.
const MAX_PAID_STATIONS: usize = 64;

/// Station row as exchanged over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: StationId,
    pub shop_id: Uuid,
    pub elapsed_time: u32,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_done: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<OffsetDateTime>,
    pub paused_time: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub pause_start_time: Option<OffsetDateTime>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub extra_controllers: u32,
    #[serde(default)]
    pub snacks: IndexMap<String, u32>,
}

impl From<StationEntity> for StationRecord {
    fn from(value: StationEntity) -> Self {
        Self {
            id: value.id,
            shop_id: value.shop_id,
            elapsed_time: value.elapsed_time,
            is_running: value.is_running,
            is_paused: value.is_paused,
            is_done: value.is_done,
            start_time: value.start_time,
            end_time: value.end_time,
            paused_time: value.paused_time,
            pause_start_time: value.pause_start_time,
            customer_name: value.customer_name,
            customer_phone: value.customer_phone,
            extra_controllers: value.extra_controllers,
            snacks: value.snacks,
        }
    }
}

impl From<StationRecord> for StationEntity {
    fn from(value: StationRecord) -> Self {
        Self {
            id: value.id,
            shop_id: value.shop_id,
            elapsed_time: value.elapsed_time,
            is_running: value.is_running,
            is_paused: value.is_paused,
            is_done: value.is_done,
            start_time: value.start_time,
            end_time: value.end_time,
            paused_time: value.paused_time,
            pause_start_time: value.pause_start_time,
            customer_name: value.customer_name,
            customer_phone: value.customer_phone,
            extra_controllers: value.extra_controllers,
            snacks: value.snacks,
        }
    }
}

/// Payload of `POST /shops/{shop_id}/stations/paid`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidRequest {
    pub station_ids: Vec<StationId>,
    /// Fields written on top of the idle defaults.
    #[serde(default)]
    pub reset_data: Option<StationPatch>,
}

impl Validate for MarkPaidRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.station_ids.is_empty() || self.station_ids.len() > MAX_PAID_STATIONS {
            let mut err = ValidationError::new("station_ids_length");
            err.message =
                Some(format!("stationIds must name 1 to {MAX_PAID_STATIONS} stations").into());
            errors.add("stationIds", err);
        }

        if let Some(reset) = &self.reset_data {
            if let Err(reset_errors) = reset.validate() {
                errors.merge_self("resetData", Err(reset_errors));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Rows written by a paid request, in request order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidResponse {
    pub stations: Vec<StationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_camel_case_and_rfc3339() {
        let mut entity = StationEntity::idle(Uuid::nil(), 2);
        entity.start_time = Some(time::macros::datetime!(2024-05-01 10:00 UTC));
        let json = serde_json::to_value(StationRecord::from(entity.clone())).unwrap();
        assert_eq!(json["elapsedTime"], 0);
        assert_eq!(json["startTime"], "2024-05-01T10:00:00Z");

        let back: StationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(StationEntity::from(back), entity);
    }

    #[test]
    fn paid_request_requires_stations() {
        let empty = MarkPaidRequest {
            station_ids: vec![],
            reset_data: None,
        };
        assert!(empty.validate().is_err());

        let bad_reset = MarkPaidRequest {
            station_ids: vec![1],
            reset_data: Some(StationPatch {
                elapsed_time: Some(u32::MAX),
                ..StationPatch::default()
            }),
        };
        assert!(bad_reset.validate().is_err());

        let ok = MarkPaidRequest {
            station_ids: vec![1, 2],
            reset_data: None,
        };
        assert!(ok.validate().is_ok());
    }
}
