use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// SSE event name of the greeting sent on connect.
pub const HANDSHAKE_EVENT: &str = "handshake";
/// SSE event name announcing storage outages and recoveries.
pub const SYSTEM_STATUS_EVENT: &str = "system_status";

#[derive(Clone, Debug)]
/// Pre-serialised payload fanned out through a shop hub.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Serialise `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// First event of every shop stream.
pub struct Handshake {
    pub shop_id: Uuid,
    pub message: String,
    /// Whether the backend currently runs without storage.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Storage availability change.
pub struct SystemStatus {
    pub degraded: bool,
}
