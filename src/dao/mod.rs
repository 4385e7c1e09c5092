/// Database model definitions.
pub mod models;
/// MongoDB connection handling shared by the stores.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
pub(crate) mod serde_helpers;
/// Station persistence.
pub mod station_store;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Subscription, audit log, payment and plan persistence.
pub mod subscription_store;
