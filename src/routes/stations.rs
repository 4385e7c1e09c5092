use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{StationId, StationPatch},
    dto::station::{MarkPaidRequest, MarkPaidResponse, StationRecord},
    error::{AppError, ErrorBody},
    services::{gate, station_service},
    state::SharedState,
};

/// Station routes, all behind the subscription gate.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/shops/{shop_id}/stations", get(list_stations))
        .route("/shops/{shop_id}/stations/paid", post(mark_paid))
        .route(
            "/shops/{shop_id}/stations/{station_id}",
            get(read_station).patch(write_station),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            gate::require_valid_subscription,
        ))
}

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/stations",
    tag = "stations",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    responses(
        (status = 200, description = "Stations ordered by id", body = [StationRecord]),
        (status = 402, description = "Subscription inactive", body = ErrorBody)
    )
)]
/// List every station of the shop.
pub async fn list_stations(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
) -> Result<Json<Vec<StationRecord>>, AppError> {
    let stations = station_service::list_stations(&state, shop_id).await?;
    Ok(Json(stations))
}

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/stations/{station_id}",
    tag = "stations",
    params(
        ("shop_id" = Uuid, Path, description = "Shop identifier"),
        ("station_id" = u32, Path, description = "Station number")
    ),
    responses(
        (status = 200, description = "Station row", body = StationRecord),
        (status = 404, description = "Unknown station", body = ErrorBody),
        (status = 402, description = "Subscription inactive", body = ErrorBody)
    )
)]
pub async fn read_station(
    State(state): State<SharedState>,
    Path((shop_id, station_id)): Path<(Uuid, StationId)>,
) -> Result<Json<StationRecord>, AppError> {
    let station = station_service::read_station(&state, shop_id, station_id).await?;
    Ok(Json(station))
}

#[utoipa::path(
    patch,
    path = "/shops/{shop_id}/stations/{station_id}",
    tag = "stations",
    params(
        ("shop_id" = Uuid, Path, description = "Shop identifier"),
        ("station_id" = u32, Path, description = "Station number")
    ),
    request_body = StationPatch,
    responses(
        (status = 200, description = "Row after the write", body = StationRecord),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 402, description = "Subscription inactive", body = ErrorBody)
    )
)]
/// Write the provided fields; the last writer wins per field.
pub async fn write_station(
    State(state): State<SharedState>,
    Path((shop_id, station_id)): Path<(Uuid, StationId)>,
    Json(patch): Json<StationPatch>,
) -> Result<Json<StationRecord>, AppError> {
    patch.validate()?;
    let station = station_service::write_station(&state, shop_id, station_id, patch).await?;
    Ok(Json(station))
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/stations/paid",
    tag = "stations",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Stations reset and clients notified", body = MarkPaidResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 402, description = "Subscription inactive", body = ErrorBody)
    )
)]
/// Reset billed stations to idle and push a `paid_event` to the shop.
pub async fn mark_paid(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Json<MarkPaidResponse>, AppError> {
    request.validate()?;
    let response = station_service::mark_paid(&state, shop_id, request).await?;
    Ok(Json(response))
}
