use std::sync::Arc;

use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    SubscriptionError,
    status::{compute_status, days_remaining},
};
use crate::{
    clock::WallClock,
    config::SubscriptionPolicy,
    dao::{
        models::{
            EventTrigger, PaymentEntity, PlanEntity, SubscriptionEntity, SubscriptionEventEntity,
            SubscriptionEventType,
        },
        subscription_store::{SubscriptionStore, SubscriptionTx},
    },
    dto::subscription::{PaymentInput, SubscriptionEventView, SubscriptionView},
};

/// Default and upper bound of [`SubscriptionResolver::list_events`].
pub const DEFAULT_EVENT_LIMIT: u32 = 20;
pub const MAX_EVENT_LIMIT: u32 = 100;

/// Lazily maintained subscription status. Every read or write runs under the
/// shop's row lock; there is no background scheduler.
#[derive(Clone)]
pub struct SubscriptionResolver {
    store: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn WallClock>,
    policy: SubscriptionPolicy,
}

impl SubscriptionResolver {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn WallClock>,
        policy: SubscriptionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Current status of the shop's subscription, recomputed and written back when
    /// the stored row is stale or no longer matches its dates.
    pub async fn resolve(&self, shop_id: Uuid) -> Result<SubscriptionView, SubscriptionError> {
        let mut tx = self.store.begin(shop_id).await?;
        // Sampled under the row lock: never earlier than the last commit.
        let now = self.clock.now();
        let current = tx
            .subscription()
            .cloned()
            .ok_or(SubscriptionError::ShopNotFound(shop_id))?;

        let row = self.recompute(tx.as_mut(), current, now);
        tx.commit().await?;

        let plan = self.store.find_plan(row.current_plan_code.clone()).await?;
        Ok(self.view(row, plan, now))
    }

    /// Create the subscription row of a newly provisioned shop.
    pub async fn provision(
        &self,
        shop_id: Uuid,
        plan_code: Option<String>,
    ) -> Result<SubscriptionView, SubscriptionError> {
        let code = plan_code.unwrap_or_else(|| self.policy.trial_plan_code.clone());
        let plan = self.active_plan(&code).await?;
        let now = self.clock.now();

        let mut tx = self.store.begin(shop_id).await?;
        if tx.subscription().is_some() {
            return Err(SubscriptionError::AlreadyProvisioned(shop_id));
        }

        let expires_at = now + Duration::days(i64::from(plan.duration_days));
        let computed = compute_status(
            now,
            expires_at,
            None,
            &plan.code,
            &self.policy.trial_plan_code,
            self.policy.grace_period_days,
        );
        let row = SubscriptionEntity {
            shop_id,
            current_plan_code: plan.code.clone(),
            started_at: now,
            expires_at,
            grace_ends_at: computed.grace_ends_at,
            computed_status: computed.status,
            last_status_check_at: Some(now),
            updated_at: now,
        };
        tx.stage_event(SubscriptionEventEntity {
            id: Uuid::new_v4(),
            shop_id,
            event_type: SubscriptionEventType::Created,
            trigger: EventTrigger::Provisioning,
            old_plan_code: None,
            new_plan_code: plan.code.clone(),
            old_status: None,
            new_status: computed.status,
            old_expires_at: None,
            new_expires_at: expires_at,
            metadata: json!({ "durationDays": plan.duration_days }),
            created_at: now,
        });
        tx.stage_subscription(row.clone());
        tx.commit().await?;

        info!(%shop_id, plan = %plan.code, status = computed.status.as_str(), "subscription provisioned");
        Ok(self.view(row, Some(plan), now))
    }

    /// Switch to or extend `plan_code`. The new period extends from the later of now
    /// and the current expiry, so time left on the current plan is kept.
    pub async fn renew(
        &self,
        shop_id: Uuid,
        plan_code: &str,
        payment: Option<PaymentInput>,
    ) -> Result<SubscriptionView, SubscriptionError> {
        if plan_code == self.policy.trial_plan_code {
            return Err(SubscriptionError::InvalidInput(
                "the trial plan cannot be renewed".into(),
            ));
        }
        let plan = self.active_plan(plan_code).await?;

        let mut tx = self.store.begin(shop_id).await?;
        let now = self.clock.now();
        let current = tx
            .subscription()
            .cloned()
            .ok_or(SubscriptionError::ShopNotFound(shop_id))?;

        let event_type = if current.current_plan_code == plan.code {
            SubscriptionEventType::Renewed
        } else {
            let old_price = self
                .store
                .find_plan(current.current_plan_code.clone())
                .await?
                .map_or(0, |old| old.price_cents);
            match plan.price_cents.cmp(&old_price) {
                std::cmp::Ordering::Greater => SubscriptionEventType::Upgraded,
                std::cmp::Ordering::Less => SubscriptionEventType::Downgraded,
                std::cmp::Ordering::Equal => SubscriptionEventType::Renewed,
            }
        };

        let old_status = self.status_of(&current, now).status;
        let lapsed = current.expires_at <= now;
        let base = current.expires_at.max(now);
        let expires_at = base + Duration::days(i64::from(plan.duration_days));
        let computed = compute_status(
            now,
            expires_at,
            None,
            &plan.code,
            &self.policy.trial_plan_code,
            self.policy.grace_period_days,
        );

        let row = SubscriptionEntity {
            shop_id,
            current_plan_code: plan.code.clone(),
            started_at: if lapsed || current.current_plan_code != plan.code {
                now
            } else {
                current.started_at
            },
            expires_at,
            grace_ends_at: None,
            computed_status: computed.status,
            last_status_check_at: Some(now),
            updated_at: now,
        };

        let mut metadata = json!({
            "durationDays": plan.duration_days,
            "extendedFromRemaining": !lapsed,
        });
        if let Some(payment) = payment {
            let payment = PaymentEntity {
                id: Uuid::new_v4(),
                shop_id,
                plan_code: plan.code.clone(),
                amount_cents: payment.amount_cents,
                method: payment.method,
                reference: payment.reference,
                paid_at: now,
            };
            metadata["paymentId"] = json!(payment.id);
            metadata["amountCents"] = json!(payment.amount_cents);
            tx.stage_payment(payment);
        }

        tx.stage_event(SubscriptionEventEntity {
            id: Uuid::new_v4(),
            shop_id,
            event_type,
            trigger: EventTrigger::Renewal,
            old_plan_code: Some(current.current_plan_code.clone()),
            new_plan_code: plan.code.clone(),
            old_status: Some(old_status),
            new_status: computed.status,
            old_expires_at: Some(current.expires_at),
            new_expires_at: expires_at,
            metadata,
            created_at: now,
        });
        tx.stage_subscription(row.clone());
        tx.commit().await?;

        info!(
            %shop_id,
            plan = %plan.code,
            event = ?event_type,
            expires_at = %expires_at,
            "subscription renewed"
        );
        Ok(self.view(row, Some(plan), now))
    }

    /// Audit log of the shop, newest first.
    pub async fn list_events(
        &self,
        shop_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<SubscriptionEventView>, SubscriptionError> {
        let limit = limit
            .unwrap_or(DEFAULT_EVENT_LIMIT)
            .clamp(1, MAX_EVENT_LIMIT) as usize;
        let events = self.store.list_events(shop_id, limit).await?;
        Ok(events.into_iter().map(Into::into).collect())
    }

    async fn active_plan(&self, code: &str) -> Result<PlanEntity, SubscriptionError> {
        self.store
            .find_plan(code.to_owned())
            .await?
            .filter(|plan| plan.is_active)
            .ok_or_else(|| SubscriptionError::PlanNotFound(code.to_owned()))
    }

    fn status_of(
        &self,
        row: &SubscriptionEntity,
        now: OffsetDateTime,
    ) -> super::status::ComputedStatus {
        compute_status(
            now,
            row.expires_at,
            row.grace_ends_at,
            &row.current_plan_code,
            &self.policy.trial_plan_code,
            self.policy.grace_period_days,
        )
    }

    /// Stage a refreshed row when the stored one is stale, its status changed, or a
    /// grace end had to be derived. Status changes are audited.
    fn recompute(
        &self,
        tx: &mut dyn SubscriptionTx,
        current: SubscriptionEntity,
        now: OffsetDateTime,
    ) -> SubscriptionEntity {
        if current.last_status_check_at.is_some_and(|checked| checked > now) {
            debug!(shop_id = %current.shop_id, "status checked ahead of this clock; keeping it");
            return current;
        }

        let computed = self.status_of(&current, now);
        let status_changed = computed.status != current.computed_status;
        let grace_derived = computed.grace_ends_at != current.grace_ends_at;
        let recheck = Duration::seconds(
            i64::try_from(self.policy.recheck_interval_secs).unwrap_or(i64::MAX),
        );
        let stale = current
            .last_status_check_at
            .is_none_or(|checked| now - checked >= recheck);

        if !(status_changed || grace_derived || stale) {
            debug!(shop_id = %current.shop_id, "subscription status fresh; skipping recompute");
            return current;
        }

        let row = SubscriptionEntity {
            computed_status: computed.status,
            grace_ends_at: computed.grace_ends_at,
            last_status_check_at: Some(now),
            updated_at: now,
            ..current.clone()
        };

        if status_changed {
            info!(
                shop_id = %current.shop_id,
                from = current.computed_status.as_str(),
                to = computed.status.as_str(),
                "subscription status changed"
            );
            tx.stage_event(SubscriptionEventEntity {
                id: Uuid::new_v4(),
                shop_id: current.shop_id,
                event_type: SubscriptionEventType::StatusChanged,
                trigger: EventTrigger::LazyCheck,
                old_plan_code: Some(current.current_plan_code.clone()),
                new_plan_code: current.current_plan_code.clone(),
                old_status: Some(current.computed_status),
                new_status: computed.status,
                old_expires_at: Some(current.expires_at),
                new_expires_at: current.expires_at,
                metadata: json!({ "graceEndsAt": computed.grace_ends_at.map(|at| at.unix_timestamp()) }),
                created_at: now,
            });
        }
        tx.stage_subscription(row.clone());
        row
    }

    fn view(
        &self,
        row: SubscriptionEntity,
        plan: Option<PlanEntity>,
        now: OffsetDateTime,
    ) -> SubscriptionView {
        SubscriptionView {
            shop_id: row.shop_id,
            plan_code: row.current_plan_code,
            computed_status: row.computed_status,
            is_valid: row.computed_status.is_valid(),
            days_remaining: days_remaining(now, row.expires_at),
            started_at: row.started_at,
            expires_at: row.expires_at,
            grace_ends_at: row.grace_ends_at,
            last_status_check_at: row.last_status_check_at,
            plan: plan.map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::{PaymentMethod, SubscriptionStatus}, subscription_store::MemorySubscriptionStore},
    };

    struct ManualWallClock(Mutex<OffsetDateTime>);

    impl ManualWallClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl WallClock for ManualWallClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }

    const START: OffsetDateTime = datetime!(2024-06-01 09:00 UTC);

    async fn fixture() -> (MemorySubscriptionStore, Arc<ManualWallClock>, SubscriptionResolver) {
        let store = MemorySubscriptionStore::new();
        for plan in AppConfig::default().plans {
            store.save_plan(plan).await.unwrap();
        }
        let clock = Arc::new(ManualWallClock(Mutex::new(START)));
        let resolver =
            SubscriptionResolver::new(Arc::new(store.clone()), clock.clone(), SubscriptionPolicy::default());
        (store, clock, resolver)
    }

    async fn seed(store: &MemorySubscriptionStore, row: SubscriptionEntity) {
        let mut tx = store.begin(row.shop_id).await.unwrap();
        tx.stage_subscription(row);
        tx.commit().await.unwrap();
    }

    fn paid_row(shop_id: Uuid, expires_at: OffsetDateTime) -> SubscriptionEntity {
        SubscriptionEntity {
            shop_id,
            current_plan_code: "monthly".into(),
            started_at: expires_at - Duration::days(30),
            expires_at,
            grace_ends_at: None,
            computed_status: SubscriptionStatus::Active,
            last_status_check_at: Some(START - Duration::minutes(5)),
            updated_at: START - Duration::days(30),
        }
    }

    #[tokio::test]
    async fn provisioning_starts_a_trial() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();

        let view = resolver.provision(shop, None).await.unwrap();
        assert_eq!(view.computed_status, SubscriptionStatus::Trial);
        assert!(view.is_valid);
        assert_eq!(view.days_remaining, 14);

        let events = store.list_events(shop, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SubscriptionEventType::Created);

        assert!(matches!(
            resolver.provision(shop, None).await,
            Err(SubscriptionError::AlreadyProvisioned(_))
        ));
    }

    #[tokio::test]
    async fn missing_row_is_shop_not_found() {
        let (_store, _clock, resolver) = fixture().await;
        assert!(matches!(
            resolver.resolve(Uuid::new_v4()).await,
            Err(SubscriptionError::ShopNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lapsed_paid_plan_enters_grace_and_persists_it() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        let yesterday = START - Duration::days(1);
        seed(&store, paid_row(shop, yesterday)).await;

        let view = resolver.resolve(shop).await.unwrap();
        assert_eq!(view.computed_status, SubscriptionStatus::Grace);
        assert!(view.is_valid);
        assert_eq!(view.days_remaining, -1);
        assert_eq!(view.grace_ends_at, Some(yesterday + Duration::days(3)));

        let tx = store.begin(shop).await.unwrap();
        let stored = tx.subscription().unwrap();
        assert_eq!(stored.computed_status, SubscriptionStatus::Grace);
        assert_eq!(stored.grace_ends_at, Some(yesterday + Duration::days(3)));
        assert_eq!(stored.last_status_check_at, Some(START));
        drop(tx);

        let events = store.list_events(shop, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SubscriptionEventType::StatusChanged);
        assert_eq!(events[0].trigger, EventTrigger::LazyCheck);
        assert_eq!(events[0].old_status, Some(SubscriptionStatus::Active));
        assert_eq!(events[0].new_status, SubscriptionStatus::Grace);
    }

    #[tokio::test]
    async fn fresh_row_is_left_alone() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        let row = paid_row(shop, START + Duration::days(10));
        seed(&store, row.clone()).await;

        resolver.resolve(shop).await.unwrap();
        let tx = store.begin(shop).await.unwrap();
        assert_eq!(tx.subscription(), Some(&row));
    }

    #[tokio::test]
    async fn stale_row_is_touched_without_an_event() {
        let (store, clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START + Duration::days(10))).await;

        clock.advance(Duration::hours(2));
        resolver.resolve(shop).await.unwrap();

        let tx = store.begin(shop).await.unwrap();
        assert_eq!(
            tx.subscription().unwrap().last_status_check_at,
            Some(START + Duration::hours(2))
        );
        drop(tx);
        assert!(store.list_events(shop, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolves_write_one_event() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START - Duration::days(1))).await;

        let (first, second) = tokio::join!(resolver.resolve(shop), resolver.resolve(shop));
        assert_eq!(first.unwrap().computed_status, SubscriptionStatus::Grace);
        assert_eq!(second.unwrap().computed_status, SubscriptionStatus::Grace);
        assert_eq!(store.list_events(shop, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queued_resolve_never_rewinds_status() {
        let (store, clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START + Duration::days(1))).await;

        let mut held = store.begin(shop).await.unwrap();
        let queued = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve(shop).await }
        });
        tokio::task::yield_now().await;

        clock.advance(Duration::days(5));
        let mut expired = paid_row(shop, START + Duration::days(1));
        expired.grace_ends_at = Some(START + Duration::days(4));
        expired.computed_status = SubscriptionStatus::Expired;
        expired.last_status_check_at = Some(START + Duration::days(5));
        held.stage_subscription(expired);
        held.commit().await.unwrap();

        let view = queued.await.unwrap().unwrap();
        assert_eq!(view.computed_status, SubscriptionStatus::Expired);
        assert!(store.list_events(shop, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_stamped_after_now_counts_as_fresh() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        let lapse = START + Duration::seconds(30);
        let mut row = paid_row(shop, lapse);
        row.computed_status = SubscriptionStatus::Grace;
        row.grace_ends_at = Some(lapse + Duration::days(3));
        row.last_status_check_at = Some(START + Duration::minutes(1));
        seed(&store, row.clone()).await;

        let view = resolver.resolve(shop).await.unwrap();
        assert_eq!(view.computed_status, SubscriptionStatus::Grace);
        let tx = store.begin(shop).await.unwrap();
        assert_eq!(tx.subscription(), Some(&row));
        drop(tx);
        assert!(store.list_events(shop, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn renewal_extends_from_remaining_time() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START + Duration::days(10))).await;

        let view = resolver
            .renew(
                shop,
                "monthly",
                Some(PaymentInput {
                    amount_cents: 99_900,
                    method: PaymentMethod::Card,
                    reference: Some("TXN-42".into()),
                }),
            )
            .await
            .unwrap();
        assert_eq!(view.expires_at, START + Duration::days(40));
        assert_eq!(view.days_remaining, 40);
        assert_eq!(view.computed_status, SubscriptionStatus::Active);

        let events = store.list_events(shop, 10).await.unwrap();
        assert_eq!(events[0].event_type, SubscriptionEventType::Renewed);
        let payments = store.payments(shop);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].reference.as_deref(), Some("TXN-42"));
    }

    #[tokio::test]
    async fn renewal_after_lapse_starts_now_and_clears_grace() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START - Duration::days(2))).await;
        resolver.resolve(shop).await.unwrap();

        let view = resolver.renew(shop, "yearly", None).await.unwrap();
        assert_eq!(view.expires_at, START + Duration::days(365));
        assert_eq!(view.grace_ends_at, None);
        assert_eq!(view.started_at, START);

        let events = store.list_events(shop, 1).await.unwrap();
        assert_eq!(events[0].event_type, SubscriptionEventType::Upgraded);
        assert_eq!(events[0].old_status, Some(SubscriptionStatus::Grace));
    }

    #[tokio::test]
    async fn cheaper_plan_is_a_downgrade() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        let mut row = paid_row(shop, START + Duration::days(3));
        row.current_plan_code = "quarterly".into();
        seed(&store, row).await;

        resolver.renew(shop, "monthly", None).await.unwrap();
        let events = store.list_events(shop, 1).await.unwrap();
        assert_eq!(events[0].event_type, SubscriptionEventType::Downgraded);
    }

    #[tokio::test]
    async fn renewal_rejects_unknown_inactive_and_trial_plans() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        seed(&store, paid_row(shop, START + Duration::days(3))).await;
        let mut retired = AppConfig::default().plans[1].clone();
        retired.code = "legacy".into();
        retired.is_active = false;
        store.save_plan(retired).await.unwrap();

        assert!(matches!(
            resolver.renew(shop, "platinum", None).await,
            Err(SubscriptionError::PlanNotFound(_))
        ));
        assert!(matches!(
            resolver.renew(shop, "legacy", None).await,
            Err(SubscriptionError::PlanNotFound(_))
        ));
        assert!(matches!(
            resolver.renew(shop, "free_trial", None).await,
            Err(SubscriptionError::InvalidInput(_))
        ));
        assert!(store.list_events(shop, 10).await.unwrap().is_empty());
        assert!(store.payments(shop).is_empty());
    }

    #[tokio::test]
    async fn renewal_of_unknown_shop_writes_nothing() {
        let (store, _clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        assert!(matches!(
            resolver.renew(shop, "monthly", None).await,
            Err(SubscriptionError::ShopNotFound(_))
        ));
        assert!(store.payments(shop).is_empty());
    }

    #[tokio::test]
    async fn events_are_listed_newest_first_with_clamped_limit() {
        let (_store, clock, resolver) = fixture().await;
        let shop = Uuid::new_v4();
        resolver.provision(shop, Some("monthly".into())).await.unwrap();
        clock.advance(Duration::minutes(1));
        resolver.renew(shop, "yearly", None).await.unwrap();

        let events = resolver.list_events(shop, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, SubscriptionEventType::Upgraded);
        assert_eq!(events[1].event_type, SubscriptionEventType::Created);

        assert_eq!(resolver.list_events(shop, Some(0)).await.unwrap().len(), 1);
    }
}
