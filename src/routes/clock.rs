use axum::{Json, Router, extract::State, routing::get};

use crate::{clock::ServerTime, services::clock_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/time",
    tag = "clock",
    responses((status = 200, description = "Authoritative server time", body = ServerTime))
)]
/// Sample the server clock. Timer engines anchor their elapsed math on it.
pub async fn server_time(State(state): State<SharedState>) -> Json<ServerTime> {
    Json(clock_service::server_time(&state))
}

pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/time", get(server_time))
}
