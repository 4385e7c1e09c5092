use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{bson::doc, options::ReturnDocument};
use uuid::Uuid;

use super::StationStore;
use crate::dao::{
    models::{StationEntity, StationId, StationPatch},
    mongodb::{
        MongoBackend, MongoDaoError, MongoResult,
        models::{idle_insert_document, patch_set_document, station_filter},
    },
    storage::StorageResult,
};

impl MongoBackend {
    async fn read_station_document(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> MongoResult<Option<StationEntity>> {
        let found = self
            .stations()
            .await
            .find_one(station_filter(shop_id, station_id))
            .await
            .map_err(|source| MongoDaoError::LoadStation {
                shop_id,
                station_id,
                source,
            })?;
        found.map(StationEntity::try_from).transpose()
    }

    async fn upsert_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> MongoResult<StationEntity> {
        let set = patch_set_document(&patch);
        let insert = idle_insert_document(shop_id, station_id, &set);
        let mut update = doc! {};
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !insert.is_empty() {
            update.insert("$setOnInsert", insert);
        }

        let saved = self
            .stations()
            .await
            .find_one_and_update(station_filter(shop_id, station_id), update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveStation {
                shop_id,
                station_id,
                source,
            })?;

        match saved {
            Some(document) => StationEntity::try_from(document),
            None => Err(MongoDaoError::CorruptDocument {
                collection: "stations",
                id: format!("{shop_id}:{station_id}"),
                reason: "upsert returned no document".into(),
            }),
        }
    }

    async fn list_station_documents(&self, shop_id: Uuid) -> MongoResult<Vec<StationEntity>> {
        let cursor = self
            .stations()
            .await
            .find(doc! { "shop_id": shop_id.to_string() })
            .sort(doc! { "station_id": 1 })
            .await
            .map_err(|source| MongoDaoError::ListStations { shop_id, source })?;
        let documents: Vec<_> = cursor
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListStations { shop_id, source })?;
        documents.into_iter().map(StationEntity::try_from).collect()
    }
}

impl StationStore for MongoBackend {
    fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> BoxFuture<'static, StorageResult<Option<StationEntity>>> {
        let backend = self.clone();
        Box::pin(async move {
            backend
                .read_station_document(shop_id, station_id)
                .await
                .map_err(Into::into)
        })
    }

    fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> BoxFuture<'static, StorageResult<StationEntity>> {
        let backend = self.clone();
        Box::pin(async move {
            backend
                .upsert_station(shop_id, station_id, patch)
                .await
                .map_err(Into::into)
        })
    }

    fn list_stations(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StationEntity>>> {
        let backend = self.clone();
        Box::pin(async move {
            backend
                .list_station_documents(shop_id)
                .await
                .map_err(Into::into)
        })
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
