use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::error::{HttpClientError, HttpClientResult};
use crate::{
    clock::{ClockError, ServerClock, ServerTime},
    dao::{
        models::{StationEntity, StationId, StationPatch},
        station_store::StationStore,
        storage::StorageResult,
    },
    dto::{health::HealthResponse, station::StationRecord},
    error::ErrorBody,
};

/// Shared reqwest client rooted at the backend's base URL.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Arc<str>,
}

impl HttpApi {
    pub fn new(base_url: &str) -> HttpClientResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| HttpClientError::ClientBuilder { source })?;
        Ok(Self {
            client,
            base_url: Arc::<str>::from(base_url.trim_end_matches('/')),
        })
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send and return the response when its status is a success.
    pub(crate) async fn send(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> HttpClientResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| HttpClientError::RequestSend {
                path: path.to_owned(),
                source,
            })?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.json::<ErrorBody>().await.ok();
        let (code, message) = body
            .map(|body| (body.code, body.message))
            .unwrap_or_else(|| ("unknown".to_owned(), String::new()));
        Err(HttpClientError::RequestStatus {
            path: path.to_owned(),
            status,
            code,
            message,
        })
    }

    async fn json<T>(&self, builder: RequestBuilder, path: &str) -> HttpClientResult<T>
    where
        T: DeserializeOwned,
    {
        self.send(builder, path)
            .await?
            .json::<T>()
            .await
            .map_err(|source| HttpClientError::DecodeResponse {
                path: path.to_owned(),
                source,
            })
    }

    pub async fn server_time(&self) -> HttpClientResult<ServerTime> {
        self.json(self.request(Method::GET, "/time"), "/time").await
    }

    pub async fn health(&self) -> HttpClientResult<HealthResponse> {
        self.json(self.request(Method::GET, "/healthcheck"), "/healthcheck")
            .await
    }

    /// `None` when the backend answers 404.
    pub async fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> HttpClientResult<Option<StationRecord>> {
        let path = format!("/shops/{shop_id}/stations/{station_id}");
        match self.json(self.request(Method::GET, &path), &path).await {
            Ok(record) => Ok(Some(record)),
            Err(HttpClientError::RequestStatus {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: &StationPatch,
    ) -> HttpClientResult<StationRecord> {
        let path = format!("/shops/{shop_id}/stations/{station_id}");
        self.json(self.request(Method::PATCH, &path).json(patch), &path)
            .await
    }

    pub async fn list_stations(&self, shop_id: Uuid) -> HttpClientResult<Vec<StationRecord>> {
        let path = format!("/shops/{shop_id}/stations");
        self.json(self.request(Method::GET, &path), &path).await
    }
}

/// Server clock reached through `GET /time`.
#[derive(Clone)]
pub struct HttpServerClock {
    api: HttpApi,
}

impl HttpServerClock {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

impl ServerClock for HttpServerClock {
    fn server_time(&self) -> BoxFuture<'static, Result<ServerTime, ClockError>> {
        let api = self.api.clone();
        Box::pin(async move { Ok(api.server_time().await?) })
    }
}

/// Station store backed by the gated station routes.
#[derive(Clone)]
pub struct HttpStationStore {
    api: HttpApi,
}

impl HttpStationStore {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

impl StationStore for HttpStationStore {
    fn read_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
    ) -> BoxFuture<'static, StorageResult<Option<StationEntity>>> {
        let api = self.api.clone();
        Box::pin(async move {
            let record = api.read_station(shop_id, station_id).await?;
            Ok(record.map(Into::into))
        })
    }

    fn write_station(
        &self,
        shop_id: Uuid,
        station_id: StationId,
        patch: StationPatch,
    ) -> BoxFuture<'static, StorageResult<StationEntity>> {
        let api = self.api.clone();
        Box::pin(async move {
            let record = api.write_station(shop_id, station_id, &patch).await?;
            Ok(record.into())
        })
    }

    fn list_stations(&self, shop_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StationEntity>>> {
        let api = self.api.clone();
        Box::pin(async move {
            let records = api.list_stations(shop_id).await?;
            Ok(records.into_iter().map(Into::into).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let api = self.api.clone();
        Box::pin(async move {
            api.health().await?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
