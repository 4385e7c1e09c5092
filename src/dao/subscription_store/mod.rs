pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{PaymentEntity, PlanEntity, SubscriptionEntity, SubscriptionEventEntity},
    storage::StorageResult,
};

pub use memory::MemorySubscriptionStore;

/// Persistence for subscription rows, their audit log, payments and the plans table.
pub trait SubscriptionStore: Send + Sync {
    /// Open a transaction holding the exclusive row lock for `shop_id`.
    ///
    /// The lock is held until the returned transaction is committed or dropped;
    /// dropping it without committing discards every staged write.
    fn begin(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Box<dyn SubscriptionTx>>>;
    fn find_plan(&self, code: String) -> BoxFuture<'static, StorageResult<Option<PlanEntity>>>;
    fn list_plans(&self) -> BoxFuture<'static, StorageResult<Vec<PlanEntity>>>;
    fn save_plan(&self, plan: PlanEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Most recent audit rows first.
    fn list_events(
        &self,
        shop_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SubscriptionEventEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Unit of work against a single locked subscription row.
pub trait SubscriptionTx: Send {
    /// Row as seen inside the transaction, including staged changes.
    fn subscription(&self) -> Option<&SubscriptionEntity>;
    fn stage_subscription(&mut self, subscription: SubscriptionEntity);
    fn stage_event(&mut self, event: SubscriptionEventEntity);
    fn stage_payment(&mut self, payment: PaymentEntity);
    /// Apply every staged write atomically and release the row lock.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
