#![cfg(feature = "http-client")]

use std::{sync::Arc, time::Duration};

use playdesk_back::{
    client::{HttpApi, HttpPushChannel, HttpServerClock, HttpStationStore},
    clock::SystemClock,
    config::AppConfig,
    dao::{
        models::{StationPatch, SubscriptionEntity, SubscriptionStatus},
        station_store::MemoryStationStore,
        subscription_store::{MemorySubscriptionStore, SubscriptionStore},
    },
    dto::{station::MarkPaidRequest, subscription::SubscriptionView},
    error::ErrorBody,
    routes,
    services::plan_service,
    state::{AppState, SharedState, Stores},
    timer::{
        MemoryTimerCache, PushChannel, TimerAction, TimerDeps, TimerEngine, TimerPhase,
        TimerSettings, runner,
    },
};
use reqwest::StatusCode;
use time::OffsetDateTime;
use tokio::{net::TcpListener, time::timeout};
use uuid::Uuid;

struct Backend {
    base_url: String,
    subscriptions: MemorySubscriptionStore,
    http: reqwest::Client,
}

async fn serve() -> Backend {
    let state: SharedState = AppState::new(AppConfig::default());
    let subscriptions = MemorySubscriptionStore::new();
    let stores = Stores {
        stations: Arc::new(MemoryStationStore::new()),
        subscriptions: Arc::new(subscriptions.clone()),
        backend: "memory",
    };
    plan_service::seed_plans(&stores.subscriptions, &state.config().plans)
        .await
        .unwrap();
    state.install_stores(stores).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    Backend {
        base_url: format!("http://{addr}"),
        subscriptions,
        http: reqwest::Client::new(),
    }
}

impl Backend {
    async fn provision(&self, shop: Uuid) -> SubscriptionView {
        let response = self
            .http
            .post(format!("{}/shops/{shop}/subscription", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    fn engine(&self, shop: Uuid, station: u32) -> TimerEngine {
        let api = HttpApi::new(&self.base_url).unwrap();
        TimerEngine::new(
            shop,
            station,
            TimerDeps {
                store: Arc::new(HttpStationStore::new(api.clone())),
                server_clock: Arc::new(HttpServerClock::new(api)),
                client_clock: Arc::new(SystemClock::new()),
                cache: Arc::new(MemoryTimerCache::new()),
            },
            TimerSettings::default(),
        )
    }
}

#[tokio::test]
async fn remote_engine_runs_against_the_gated_routes() {
    let backend = serve().await;
    let shop = Uuid::new_v4();
    let view = backend.provision(shop).await;
    assert_eq!(view.computed_status, SubscriptionStatus::Trial);

    let api = HttpApi::new(&backend.base_url).unwrap();
    api.write_station(
        shop,
        1,
        &StationPatch {
            customer_name: Some(Some("Ravi".into())),
            ..StationPatch::default()
        },
    )
    .await
    .unwrap();

    let mut engine = backend.engine(shop, 1);
    let loaded = engine.load().await.unwrap();
    assert_eq!(loaded.phase, TimerPhase::Idle);
    assert!(loaded.synced);

    let started = engine.apply(TimerAction::Start).await.unwrap();
    assert_eq!(started.phase, TimerPhase::Running);

    let stored = api.read_station(shop, 1).await.unwrap().unwrap();
    assert!(stored.is_running);
    assert!(stored.start_time.is_some());
    assert_eq!(stored.customer_name.as_deref(), Some("Ravi"));

    let paused = engine.apply(TimerAction::Pause).await.unwrap();
    assert_eq!(paused.phase, TimerPhase::Paused);
    assert!(engine.apply(TimerAction::Pause).await.is_err());
}

#[tokio::test]
async fn paid_event_reaches_a_remote_runner() {
    let backend = serve().await;
    let shop = Uuid::new_v4();
    backend.provision(shop).await;

    let api = HttpApi::new(&backend.base_url).unwrap();
    api.write_station(
        shop,
        2,
        &StationPatch {
            extra_controllers: Some(1),
            ..StationPatch::default()
        },
    )
    .await
    .unwrap();

    let push = HttpPushChannel::new(api.clone())
        .subscribe(shop)
        .await
        .unwrap();
    let handle = runner::spawn(backend.engine(shop, 2), Some(push));
    handle.start().await.unwrap();

    let response = backend
        .http
        .post(format!("{}/shops/{shop}/stations/paid", backend.base_url))
        .json(&MarkPaidRequest {
            station_ids: vec![2],
            reset_data: None,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut snapshots = handle.snapshots();
    timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.phase == TimerPhase::Idle),
    )
    .await
    .expect("paid event delivered")
    .unwrap();

    let stored = api.read_station(shop, 2).await.unwrap().unwrap();
    assert!(!stored.is_running);
    assert_eq!(stored.extra_controllers, 0);
    handle.stop().await;
}

#[tokio::test]
async fn lapsed_shop_gets_a_distinct_402() {
    let backend = serve().await;
    let shop = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    let mut tx = backend.subscriptions.begin(shop).await.unwrap();
    tx.stage_subscription(SubscriptionEntity {
        shop_id: shop,
        current_plan_code: "free_trial".into(),
        started_at: now - time::Duration::days(20),
        expires_at: now - time::Duration::days(6),
        grace_ends_at: None,
        computed_status: SubscriptionStatus::Trial,
        last_status_check_at: None,
        updated_at: now - time::Duration::days(20),
    });
    tx.commit().await.unwrap();

    let response = backend
        .http
        .get(format!("{}/shops/{shop}/stations", backend.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.code, "subscription_inactive");
    assert_eq!(body.status, Some(SubscriptionStatus::Expired));

    let unknown = backend
        .http
        .get(format!("{}/shops/{}/stations", backend.base_url, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let renewed = backend
        .http
        .post(format!("{}/shops/{shop}/subscription/renew", backend.base_url))
        .json(&serde_json::json!({
            "planCode": "monthly",
            "payment": {"amountCents": 99900, "method": "cash"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(renewed.status(), StatusCode::OK);
    let view: SubscriptionView = renewed.json().await.unwrap();
    assert_eq!(view.computed_status, SubscriptionStatus::Active);

    let allowed = backend
        .http
        .get(format!("{}/shops/{shop}/stations", backend.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}
