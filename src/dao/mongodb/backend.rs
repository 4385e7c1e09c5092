use std::sync::Arc;

use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        EVENT_COLLECTION, MongoEventDocument, MongoPaymentDocument, MongoPlanDocument,
        MongoStationDocument, MongoSubscriptionDocument, PAYMENT_COLLECTION, PLAN_COLLECTION,
        STATION_COLLECTION, SUBSCRIPTION_COLLECTION, SUBSCRIPTION_LOCK_COLLECTION,
    },
};

/// Connection handle shared by the MongoDB station and subscription stores.
#[derive(Clone)]
pub struct MongoBackend {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoBackend {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let backend = Self { inner };
        backend.ensure_indexes().await?;
        Ok(backend)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let stations = database.collection::<Document>(STATION_COLLECTION);
        let index = IndexModel::builder()
            .keys(doc! { "shop_id": 1, "station_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("station_shop_idx".to_owned()))
                    .build(),
            )
            .build();
        stations
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: STATION_COLLECTION,
                index: "shop_id,station_id",
                source,
            })?;

        let events = database.collection::<Document>(EVENT_COLLECTION);
        let index = IndexModel::builder()
            .keys(doc! { "shop_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name(Some("event_shop_created_idx".to_owned()))
                    .build(),
            )
            .build();
        events
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION,
                index: "shop_id,created_at",
                source,
            })?;

        Ok(())
    }

    pub(crate) async fn ping(&self) -> MongoResult<()> {
        self.inner.ping().await
    }

    pub(crate) async fn reconnect(&self) -> MongoResult<()> {
        self.inner.reconnect().await
    }

    pub(crate) async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    pub(crate) async fn start_session(&self) -> mongodb::error::Result<ClientSession> {
        let client = {
            let guard = self.inner.state.read().await;
            guard.client.clone()
        };
        client.start_session().await
    }

    pub(crate) async fn stations(&self) -> Collection<MongoStationDocument> {
        self.database().await.collection(STATION_COLLECTION)
    }

    pub(crate) async fn subscriptions(&self) -> Collection<MongoSubscriptionDocument> {
        self.database().await.collection(SUBSCRIPTION_COLLECTION)
    }

    pub(crate) async fn subscription_locks(&self) -> Collection<Document> {
        self.database().await.collection(SUBSCRIPTION_LOCK_COLLECTION)
    }

    pub(crate) async fn events(&self) -> Collection<MongoEventDocument> {
        self.database().await.collection(EVENT_COLLECTION)
    }

    pub(crate) async fn payments(&self) -> Collection<MongoPaymentDocument> {
        self.database().await.collection(PAYMENT_COLLECTION)
    }

    pub(crate) async fn plans(&self) -> Collection<MongoPlanDocument> {
        self.database().await.collection(PLAN_COLLECTION)
    }
}
