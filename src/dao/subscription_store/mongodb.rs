use std::time::Duration;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Collection,
    bson::doc,
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::ReturnDocument,
};
use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{SubscriptionStore, SubscriptionTx};
use crate::dao::{
    models::{PaymentEntity, PlanEntity, SubscriptionEntity, SubscriptionEventEntity},
    mongodb::{
        MongoBackend, MongoDaoError, MongoResult,
        models::{
            MongoEventDocument, MongoPaymentDocument, MongoPlanDocument,
            MongoSubscriptionDocument,
        },
    },
    storage::StorageResult,
};

const LOCK_ATTEMPTS: u32 = 20;
const COMMIT_ATTEMPTS: u32 = 3;

/// Jittered wait between lock attempts, growing with the attempt number.
fn lock_backoff(attempt: u32) -> Duration {
    let jitter = rand::rng().random_range(5..25);
    Duration::from_millis(u64::from(attempt.min(8)) * 10 + jitter)
}

/// Transaction holding the shop's lock document. Concurrent writers on the same
/// lock document hit a write conflict and retry until this one commits or aborts.
struct MongoTx {
    session: ClientSession,
    shop_id: Uuid,
    subscriptions: Collection<MongoSubscriptionDocument>,
    events: Collection<MongoEventDocument>,
    payments: Collection<MongoPaymentDocument>,
    current: Option<SubscriptionEntity>,
    staged: Option<SubscriptionEntity>,
    staged_events: Vec<SubscriptionEventEntity>,
    staged_payments: Vec<PaymentEntity>,
}

impl MongoTx {
    async fn write_and_commit(mut self) -> MongoResult<()> {
        let shop_id = self.shop_id;
        let commit_err = |source: mongodb::error::Error| MongoDaoError::CommitSubscription { shop_id, source };

        if let Some(row) = &self.staged {
            let document = MongoSubscriptionDocument::from(row);
            self.subscriptions
                .replace_one(doc! { "_id": shop_id.to_string() }, &document)
                .upsert(true)
                .session(&mut self.session)
                .await
                .map_err(commit_err)?;
        }
        if !self.staged_events.is_empty() {
            let documents: Vec<_> = self.staged_events.iter().map(MongoEventDocument::from).collect();
            self.events
                .insert_many(documents)
                .session(&mut self.session)
                .await
                .map_err(commit_err)?;
        }
        if !self.staged_payments.is_empty() {
            let documents: Vec<_> = self
                .staged_payments
                .iter()
                .map(MongoPaymentDocument::from)
                .collect();
            self.payments
                .insert_many(documents)
                .session(&mut self.session)
                .await
                .map_err(commit_err)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < COMMIT_ATTEMPTS =>
                {
                    warn!(%shop_id, attempt, error = %err, "commit result unknown; retrying");
                }
                Err(source) => return Err(commit_err(source)),
            }
        }
    }
}

impl SubscriptionTx for MongoTx {
    fn subscription(&self) -> Option<&SubscriptionEntity> {
        self.staged.as_ref().or(self.current.as_ref())
    }

    fn stage_subscription(&mut self, subscription: SubscriptionEntity) {
        self.staged = Some(subscription);
    }

    fn stage_event(&mut self, event: SubscriptionEventEntity) {
        self.staged_events.push(event);
    }

    fn stage_payment(&mut self, payment: PaymentEntity) {
        self.staged_payments.push(payment);
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { self.write_and_commit().await.map_err(Into::into) })
    }
}

impl MongoBackend {
    async fn begin_locked(&self, shop_id: Uuid) -> MongoResult<MongoTx> {
        let locks = self.subscription_locks().await;
        let subscriptions = self.subscriptions().await;

        for attempt in 1..=LOCK_ATTEMPTS {
            let mut session = self
                .start_session()
                .await
                .map_err(|source| MongoDaoError::StartTransaction { shop_id, source })?;
            session
                .start_transaction()
                .await
                .map_err(|source| MongoDaoError::StartTransaction { shop_id, source })?;

            let locked = locks
                .find_one_and_update(
                    doc! { "_id": shop_id.to_string() },
                    doc! { "$inc": { "lock_seq": 1_i64 } },
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
                .session(&mut session)
                .await;

            match locked {
                Ok(_) => {
                    let current = subscriptions
                        .find_one(doc! { "_id": shop_id.to_string() })
                        .session(&mut session)
                        .await
                        .map_err(|source| MongoDaoError::LoadSubscription { shop_id, source })?
                        .map(SubscriptionEntity::try_from)
                        .transpose()?;

                    return Ok(MongoTx {
                        session,
                        shop_id,
                        subscriptions,
                        events: self.events().await,
                        payments: self.payments().await,
                        current,
                        staged: None,
                        staged_events: Vec::new(),
                        staged_payments: Vec::new(),
                    });
                }
                Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    let _ = session.abort_transaction().await;
                    let wait = lock_backoff(attempt);
                    debug!(%shop_id, attempt, wait_ms = wait.as_millis(), "subscription row busy");
                    tokio::time::sleep(wait).await;
                }
                Err(source) => return Err(MongoDaoError::LockSubscription { shop_id, source }),
            }
        }

        Err(MongoDaoError::LockContention {
            shop_id,
            attempts: LOCK_ATTEMPTS,
        })
    }

    async fn load_plan(&self, code: String) -> MongoResult<Option<PlanEntity>> {
        let found = self
            .plans()
            .await
            .find_one(doc! { "_id": code.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadPlan {
                code: code.clone(),
                source,
            })?;
        found.map(PlanEntity::try_from).transpose()
    }

    async fn load_plans(&self) -> MongoResult<Vec<PlanEntity>> {
        let cursor = self
            .plans()
            .await
            .find(doc! {})
            .sort(doc! { "duration_days": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::ListPlans { source })?;
        let documents: Vec<_> = cursor
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPlans { source })?;
        documents.into_iter().map(PlanEntity::try_from).collect()
    }

    async fn store_plan(&self, plan: PlanEntity) -> MongoResult<()> {
        let document = MongoPlanDocument::from(&plan);
        self.plans()
            .await
            .replace_one(doc! { "_id": plan.code.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlan {
                code: plan.code.clone(),
                source,
            })?;
        Ok(())
    }

    async fn load_events(
        &self,
        shop_id: Uuid,
        limit: usize,
    ) -> MongoResult<Vec<SubscriptionEventEntity>> {
        let cursor = self
            .events()
            .await
            .find(doc! { "shop_id": shop_id.to_string() })
            .sort(doc! { "created_at": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::ListEvents { shop_id, source })?;
        let documents: Vec<_> = cursor
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListEvents { shop_id, source })?;
        documents
            .into_iter()
            .map(SubscriptionEventEntity::try_from)
            .collect()
    }
}

impl SubscriptionStore for MongoBackend {
    fn begin(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Box<dyn SubscriptionTx>>> {
        let backend = self.clone();
        Box::pin(async move {
            let tx = backend.begin_locked(shop_id).await?;
            Ok(Box::new(tx) as Box<dyn SubscriptionTx>)
        })
    }

    fn find_plan(&self, code: String) -> BoxFuture<'static, StorageResult<Option<PlanEntity>>> {
        let backend = self.clone();
        Box::pin(async move { backend.load_plan(code).await.map_err(Into::into) })
    }

    fn list_plans(&self) -> BoxFuture<'static, StorageResult<Vec<PlanEntity>>> {
        let backend = self.clone();
        Box::pin(async move { backend.load_plans().await.map_err(Into::into) })
    }

    fn save_plan(&self, plan: PlanEntity) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move { backend.store_plan(plan).await.map_err(Into::into) })
    }

    fn list_events(
        &self,
        shop_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SubscriptionEventEntity>>> {
        let backend = self.clone();
        Box::pin(async move { backend.load_events(shop_id, limit).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move { backend.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let backend = self.clone();
        Box::pin(async move { backend.reconnect().await.map_err(Into::into) })
    }
}
