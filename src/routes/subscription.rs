use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::subscription::{
        EventsQuery, PlanView, ProvisionRequest, RenewRequest, SubscriptionEventView,
        SubscriptionView,
    },
    error::{AppError, ErrorBody},
    services::plan_service,
    state::SharedState,
};

/// Subscription and plan routes. These stay reachable for lapsed shops so they can renew.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/shops/{shop_id}/subscription",
            get(resolve_subscription).post(provision_subscription),
        )
        .route("/shops/{shop_id}/subscription/renew", post(renew_subscription))
        .route("/shops/{shop_id}/subscription/events", get(list_events))
        .route("/plans", get(list_plans))
}

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/subscription",
    tag = "subscription",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    responses(
        (status = 200, description = "Resolved subscription", body = SubscriptionView),
        (status = 404, description = "Shop has no subscription", body = ErrorBody)
    )
)]
/// Resolve the shop's subscription, refreshing its stored status when stale.
pub async fn resolve_subscription(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
) -> Result<Json<SubscriptionView>, AppError> {
    let view = state.subscription_resolver().await?.resolve(shop_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/subscription",
    tag = "subscription",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    request_body = ProvisionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionView),
        (status = 409, description = "Shop already subscribed", body = ErrorBody)
    )
)]
/// Create the shop's subscription, on the trial plan unless another is named.
pub async fn provision_subscription(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<SubscriptionView>), AppError> {
    request.validate()?;
    let view = state
        .subscription_resolver()
        .await?
        .provision(shop_id, request.plan_code)
        .await?;
    info!(%shop_id, plan = %view.plan_code, "subscription provisioned");
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/subscription/renew",
    tag = "subscription",
    params(("shop_id" = Uuid, Path, description = "Shop identifier")),
    request_body = RenewRequest,
    responses(
        (status = 200, description = "Renewed subscription", body = SubscriptionView),
        (status = 400, description = "Invalid renewal", body = ErrorBody),
        (status = 404, description = "Unknown shop or plan", body = ErrorBody)
    )
)]
/// Extend or change the shop's plan, optionally recording a payment.
pub async fn renew_subscription(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
    Json(request): Json<RenewRequest>,
) -> Result<Json<SubscriptionView>, AppError> {
    request.validate()?;
    let view = state
        .subscription_resolver()
        .await?
        .renew(shop_id, &request.plan_code, request.payment)
        .await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/subscription/events",
    tag = "subscription",
    params(("shop_id" = Uuid, Path, description = "Shop identifier"), EventsQuery),
    responses((status = 200, description = "Audit log, newest first", body = [SubscriptionEventView]))
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Path(shop_id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<SubscriptionEventView>>, AppError> {
    let events = state
        .subscription_resolver()
        .await?
        .list_events(shop_id, query.limit)
        .await?;
    Ok(Json(events))
}

#[utoipa::path(
    get,
    path = "/plans",
    tag = "subscription",
    responses((status = 200, description = "Active plans", body = [PlanView]))
)]
/// Plans a shop can subscribe or renew to.
pub async fn list_plans(State(state): State<SharedState>) -> Result<Json<Vec<PlanView>>, AppError> {
    let plans = plan_service::list_active_plans(&state).await?;
    Ok(Json(plans))
}
