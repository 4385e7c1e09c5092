use std::sync::Arc;

use tracing::info;

use crate::{
    dao::{models::PlanEntity, storage::StorageResult, subscription_store::SubscriptionStore},
    dto::subscription::PlanView,
    error::ServiceError,
    state::SharedState,
};

/// Plans currently offered to shops.
pub async fn list_active_plans(state: &SharedState) -> Result<Vec<PlanView>, ServiceError> {
    let stores = state.require_stores().await?;
    let plans = stores.subscriptions.list_plans().await?;
    Ok(plans
        .into_iter()
        .filter(|plan| plan.is_active)
        .map(Into::into)
        .collect())
}

/// Upsert the configured plans into the lookup table.
pub async fn seed_plans(
    store: &Arc<dyn SubscriptionStore>,
    plans: &[PlanEntity],
) -> StorageResult<()> {
    for plan in plans {
        store.save_plan(plan.clone()).await?;
    }
    info!(count = plans.len(), "plans table seeded");
    Ok(())
}
