//! MongoDB backend shared by the station and subscription stores.

mod backend;
mod config;
mod connection;
mod error;
pub(crate) mod models;

pub use backend::MongoBackend;
pub use config::MongoConfig;
pub use error::{MongoDaoError, MongoResult};

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::LockContention { shop_id, .. } => StorageError::Contention { shop_id },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
