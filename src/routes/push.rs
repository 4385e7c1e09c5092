use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{services::push_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/events",
    tag = "push",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    responses((status = 200, description = "Shop push stream", content_type = "text/event-stream", body = String))
)]
/// Stream the shop's push messages (`paid_event`, `system_status`).
pub async fn shop_stream(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = push_service::subscribe(&state, shop_id);
    info!(%shop_id, "new push stream connection");
    push_service::to_sse_stream(state, shop_id, receiver)
}

pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/shops/{shop_id}/events", get(shop_stream))
}
