use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::{StationId, StationPatch};

/// SSE event name carried by [`PushMessage::PaidEvent`].
pub const PAID_EVENT: &str = "paid_event";

/// Shop-scoped message fanned out to every connected client of the shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// The listed stations were billed and reset to idle.
    #[serde(rename_all = "camelCase")]
    PaidEvent {
        station_ids: Vec<StationId>,
        /// Overlay on top of the idle defaults; absent means plain idle.
        #[serde(default)]
        reset_data: Option<StationPatch>,
    },
}

impl PushMessage {
    /// Name used for the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            PushMessage::PaidEvent { .. } => PAID_EVENT,
        }
    }
}
