use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::StationId;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` in `{collection}` is malformed: {reason}")]
    CorruptDocument {
        collection: &'static str,
        id: String,
        reason: String,
    },
    #[error("failed to load station `{station_id}` of shop `{shop_id}`")]
    LoadStation {
        shop_id: Uuid,
        station_id: StationId,
        #[source]
        source: MongoError,
    },
    #[error("failed to save station `{station_id}` of shop `{shop_id}`")]
    SaveStation {
        shop_id: Uuid,
        station_id: StationId,
        #[source]
        source: MongoError,
    },
    #[error("failed to list stations of shop `{shop_id}`")]
    ListStations {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to open a transaction for shop `{shop_id}`")]
    StartTransaction {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to lock the subscription row of shop `{shop_id}`")]
    LockSubscription {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("subscription row of shop `{shop_id}` stayed locked after {attempts} attempt(s)")]
    LockContention { shop_id: Uuid, attempts: u32 },
    #[error("failed to load the subscription of shop `{shop_id}`")]
    LoadSubscription {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to commit the subscription transaction of shop `{shop_id}`")]
    CommitSubscription {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list subscription events of shop `{shop_id}`")]
    ListEvents {
        shop_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load plan `{code}`")]
    LoadPlan {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save plan `{code}`")]
    SavePlan {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list plans")]
    ListPlans {
        #[source]
        source: MongoError,
    },
}
