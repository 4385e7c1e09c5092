use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{SubscriptionStore, SubscriptionTx};
use crate::dao::{
    models::{PaymentEntity, PlanEntity, SubscriptionEntity, SubscriptionEventEntity},
    storage::StorageResult,
};

/// Process-local subscription tables with per-shop row locks.
#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    rows: DashMap<Uuid, SubscriptionEntity>,
    events: DashMap<Uuid, Vec<SubscriptionEventEntity>>,
    payments: DashMap<Uuid, Vec<PaymentEntity>>,
    plans: DashMap<String, PlanEntity>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payments recorded for a shop, oldest first.
    pub fn payments(&self, shop_id: Uuid) -> Vec<PaymentEntity> {
        self.inner
            .payments
            .get(&shop_id)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    fn row_lock(&self, shop_id: Uuid) -> Arc<Mutex<()>> {
        self.inner.locks.entry(shop_id).or_default().clone()
    }
}

/// Held row lock. The map entry is dropped once nobody holds or awaits it.
struct RowGuard {
    inner: Arc<MemoryInner>,
    shop_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.inner
            .locks
            .remove_if(&self.shop_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

struct MemoryTx {
    inner: Arc<MemoryInner>,
    guard: RowGuard,
    shop_id: Uuid,
    current: Option<SubscriptionEntity>,
    staged: Option<SubscriptionEntity>,
    events: Vec<SubscriptionEventEntity>,
    payments: Vec<PaymentEntity>,
}

impl SubscriptionTx for MemoryTx {
    fn subscription(&self) -> Option<&SubscriptionEntity> {
        self.staged.as_ref().or(self.current.as_ref())
    }

    fn stage_subscription(&mut self, subscription: SubscriptionEntity) {
        self.staged = Some(subscription);
    }

    fn stage_event(&mut self, event: SubscriptionEventEntity) {
        self.events.push(event);
    }

    fn stage_payment(&mut self, payment: PaymentEntity) {
        self.payments.push(payment);
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let MemoryTx {
            inner,
            guard,
            shop_id,
            staged,
            events,
            payments,
            ..
        } = *self;

        if let Some(row) = staged {
            inner.rows.insert(shop_id, row);
        }
        if !events.is_empty() {
            inner.events.entry(shop_id).or_default().extend(events);
        }
        if !payments.is_empty() {
            inner.payments.entry(shop_id).or_default().extend(payments);
        }
        drop(guard);

        Box::pin(async { Ok(()) })
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn begin(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Box<dyn SubscriptionTx>>> {
        let lock = self.row_lock(shop_id);
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = RowGuard {
                inner: inner.clone(),
                shop_id,
                guard: Some(lock.lock_owned().await),
            };
            let current = inner.rows.get(&shop_id).map(|row| row.clone());
            let tx: Box<dyn SubscriptionTx> = Box::new(MemoryTx {
                inner,
                guard,
                shop_id,
                current,
                staged: None,
                events: Vec::new(),
                payments: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn find_plan(&self, code: String) -> BoxFuture<'static, StorageResult<Option<PlanEntity>>> {
        let plan = self.inner.plans.get(&code).map(|plan| plan.clone());
        Box::pin(async move { Ok(plan) })
    }

    fn list_plans(&self) -> BoxFuture<'static, StorageResult<Vec<PlanEntity>>> {
        let mut plans: Vec<PlanEntity> = self
            .inner
            .plans
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        plans.sort_by(|a, b| a.duration_days.cmp(&b.duration_days).then(a.code.cmp(&b.code)));
        Box::pin(async move { Ok(plans) })
    }

    fn save_plan(&self, plan: PlanEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.plans.insert(plan.code.clone(), plan);
        Box::pin(async { Ok(()) })
    }

    fn list_events(
        &self,
        shop_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SubscriptionEventEntity>>> {
        let events = self
            .inner
            .events
            .get(&shop_id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Box::pin(async move { Ok(events) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
