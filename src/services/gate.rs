//! Request gate run ahead of shop-scoped handlers.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::subscription::SubscriptionView,
    error::{AppError, ServiceError},
    state::SharedState,
};

/// Checks evaluated in order; the first failure rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The path names a well-formed shop id.
    ShopIdentified,
    /// The shop's subscription resolves to a valid status.
    SubscriptionValid,
}

/// Preconditions of every gated route.
pub const SHOP_PRECONDITIONS: [Precondition; 2] =
    [Precondition::ShopIdentified, Precondition::SubscriptionValid];

#[derive(Default)]
struct GateContext {
    shop_id: Option<Uuid>,
    subscription: Option<SubscriptionView>,
}

async fn check(
    state: &SharedState,
    precondition: Precondition,
    params: &HashMap<String, String>,
    context: &mut GateContext,
) -> Result<(), AppError> {
    match precondition {
        Precondition::ShopIdentified => {
            let raw = params
                .get("shop_id")
                .ok_or_else(|| AppError::BadRequest("missing shop id".into()))?;
            let shop_id = raw
                .parse::<Uuid>()
                .map_err(|_| AppError::BadRequest(format!("`{raw}` is not a shop id")))?;
            context.shop_id = Some(shop_id);
            Ok(())
        }
        Precondition::SubscriptionValid => {
            let shop_id = context
                .shop_id
                .ok_or_else(|| AppError::Internal("shop must be identified first".into()))?;
            let view = state
                .subscription_resolver()
                .await?
                .resolve(shop_id)
                .await?;
            if !view.is_valid {
                info!(%shop_id, status = view.computed_status.as_str(), "request blocked by subscription");
                return Err(ServiceError::SubscriptionInactive(view.computed_status).into());
            }
            context.subscription = Some(view);
            Ok(())
        }
    }
}

/// axum middleware enforcing [`SHOP_PRECONDITIONS`].
///
/// The resolved [`SubscriptionView`] is attached to the request extensions for
/// downstream handlers.
pub async fn require_valid_subscription(
    State(state): State<SharedState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut context = GateContext::default();
    for precondition in SHOP_PRECONDITIONS {
        check(&state, precondition, &params, &mut context).await?;
    }
    if let Some(view) = context.subscription {
        debug!(shop_id = %view.shop_id, status = view.computed_status.as_str(), "subscription gate passed");
        request.extensions_mut().insert(view);
    }
    Ok(next.run(request).await)
}
