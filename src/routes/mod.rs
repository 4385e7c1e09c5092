use axum::Router;

use crate::state::SharedState;

pub mod clock;
pub mod docs;
pub mod health;
pub mod push;
pub mod stations;
pub mod subscription;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(clock::router())
        .merge(push::router())
        .merge(subscription::router())
        .merge(stations::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
