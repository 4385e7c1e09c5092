//! Lazily computed subscription status and the row-locked operations around it.

pub mod resolver;
pub mod status;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

pub use resolver::SubscriptionResolver;

/// Failures of subscription operations. Every variant leaves the stored row untouched.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("no subscription for shop `{0}`")]
    ShopNotFound(Uuid),
    #[error("plan `{0}` does not exist or is inactive")]
    PlanNotFound(String),
    #[error("shop `{0}` already has a subscription")]
    AlreadyProvisioned(Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Persistence(#[from] StorageError),
}
