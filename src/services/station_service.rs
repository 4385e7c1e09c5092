use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{StationId, StationPatch},
    dto::{
        push::PushMessage,
        sse::ServerEvent,
        station::{MarkPaidRequest, MarkPaidResponse, StationRecord},
    },
    error::ServiceError,
    state::SharedState,
};

/// All stations of the shop ordered by id.
pub async fn list_stations(
    state: &SharedState,
    shop_id: Uuid,
) -> Result<Vec<StationRecord>, ServiceError> {
    let store = state.station_store().await?;
    let stations = store.list_stations(shop_id).await?;
    Ok(stations.into_iter().map(Into::into).collect())
}

pub async fn read_station(
    state: &SharedState,
    shop_id: Uuid,
    station_id: StationId,
) -> Result<StationRecord, ServiceError> {
    let store = state.station_store().await?;
    store
        .read_station(shop_id, station_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("station `{station_id}` of shop `{shop_id}`"))
        })
}

/// Apply a partial record. Only the provided fields are written.
pub async fn write_station(
    state: &SharedState,
    shop_id: Uuid,
    station_id: StationId,
    patch: StationPatch,
) -> Result<StationRecord, ServiceError> {
    if patch.is_empty() {
        return Err(ServiceError::InvalidInput("patch carries no fields".into()));
    }
    let store = state.station_store().await?;
    let written = store.write_station(shop_id, station_id, patch).await?;
    Ok(written.into())
}

/// Reset the listed stations to idle, then tell every client of the shop.
///
/// Every write lands before the push goes out, so a client reacting to the event
/// and re-reading the row sees the reset.
pub async fn mark_paid(
    state: &SharedState,
    shop_id: Uuid,
    request: MarkPaidRequest,
) -> Result<MarkPaidResponse, ServiceError> {
    let store = state.station_store().await?;
    let reset = match &request.reset_data {
        Some(explicit) => StationPatch::idle().overlay(explicit),
        None => StationPatch::idle(),
    };

    let mut stations = Vec::with_capacity(request.station_ids.len());
    for &station_id in &request.station_ids {
        let written = store.write_station(shop_id, station_id, reset.clone()).await?;
        stations.push(StationRecord::from(written));
    }

    let message = PushMessage::PaidEvent {
        station_ids: request.station_ids,
        reset_data: request.reset_data,
    };
    publish(state, shop_id, &message);
    info!(%shop_id, stations = stations.len(), "stations marked paid");

    Ok(MarkPaidResponse { stations })
}

/// Fan a push message out to the shop's SSE listeners.
pub fn publish(state: &SharedState, shop_id: Uuid, message: &PushMessage) {
    match ServerEvent::json(Some(message.event_name().to_string()), message) {
        Ok(event) => state.hubs().broadcast(shop_id, event),
        Err(err) => warn!(%shop_id, error = %err, "failed to serialise push message"),
    }
}
