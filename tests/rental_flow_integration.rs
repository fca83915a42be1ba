//! End-to-end rental flow
//!
//! Runs the DVD service on a real TCP listener and drives the customer API
//! against it through the HTTP proxy, as the two processes would in
//! production.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use dvd_rental::adapters::inbound::{customer_router, dvd_router, ApiState};
use dvd_rental::adapters::outbound::{
    CacheAsideRepository, DashMapHashCache, HttpDvdTransport, JsonEntityCache,
    PrometheusMetricsStore, SqliteDatabase, SqliteEntityStore, SqliteRecord,
};
use dvd_rental::application::{
    default_proxy_policy, BasicCustomerService, BasicDvdService, CustomerService, DvdProxy,
    DvdService, ResilientCustomerService, ResilientDvdService,
};
use dvd_rental::domain::ports::{HashCache, Repository};
use dvd_rental::infrastructure::{
    OperationPolicy, RateLimitConfig, Resilience, ShutdownController,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

fn generous() -> OperationPolicy {
    OperationPolicy {
        rate_limit: RateLimitConfig {
            rate_per_sec: 1000.0,
            burst_size: 1000,
        },
        ..Default::default()
    }
}

async fn repository<E: SqliteRecord>(
    db: &SqliteDatabase,
    hashes: &Arc<dyn HashCache>,
) -> Arc<dyn Repository<E>> {
    let store = Arc::new(SqliteEntityStore::<E>::new(db.clone()).await.unwrap());
    let cache = Arc::new(JsonEntityCache::<E>::new(hashes.clone()));
    Arc::new(CacheAsideRepository::new(store, cache))
}

/// Start the DVD service and return its router (for direct calls) and base URL.
async fn start_dvd_service() -> (Router, String) {
    let db = SqliteDatabase::open_in_memory().unwrap();
    let hashes: Arc<dyn HashCache> = Arc::new(DashMapHashCache::new());
    let metrics = Arc::new(PrometheusMetricsStore::new("test", "dvd"));
    let resilience = Resilience::new(metrics.clone());

    let service: Arc<dyn DvdService> = Arc::new(ResilientDvdService::new(
        Arc::new(BasicDvdService::new(repository(&db, &hashes).await)),
        &resilience,
        &generous(),
    ));
    let router = dvd_router(ApiState::new(
        service,
        metrics,
        resilience.breaker().clone(),
        ShutdownController::new(),
        Duration::from_secs(5),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = router.clone();
    tokio::spawn(async move {
        axum::serve(listener, serving).await.unwrap();
    });

    (router, format!("http://{}", addr))
}

async fn customer_app(dvd_url: String, db: SqliteDatabase) -> Router {
    let hashes: Arc<dyn HashCache> = Arc::new(DashMapHashCache::new());
    let metrics = Arc::new(PrometheusMetricsStore::new("test", "customer"));
    let resilience = Resilience::new(metrics.clone());

    let transport = Arc::new(HttpDvdTransport::new(dvd_url));
    let proxy = Arc::new(DvdProxy::new(transport, &resilience, &default_proxy_policy()));

    let service: Arc<dyn CustomerService> = Arc::new(ResilientCustomerService::new(
        Arc::new(BasicCustomerService::new(
            repository(&db, &hashes).await,
            repository(&db, &hashes).await,
            proxy,
        )),
        &resilience,
        &generous(),
    ));
    customer_router(ApiState::new(
        service,
        metrics,
        resilience.breaker().clone(),
        ShutdownController::new(),
        Duration::from_secs(5),
    ))
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_rent_and_return_across_services() {
    let (dvd_app, dvd_url) = start_dvd_service().await;
    let customers = customer_app(dvd_url, SqliteDatabase::open_in_memory().unwrap()).await;

    // A DVD in the catalogue
    let response = dvd_app
        .clone()
        .oneshot(post("/dvd/v1/create", serde_json::json!({"name": "Alien"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let dvd_id = json(response).await["id"].as_str().unwrap().to_string();

    // A customer
    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/register",
            serde_json::json!({"name": "Ann", "address": "1 Main St"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let customer_id = json(response).await["id"].as_str().unwrap().to_string();

    // Rent it
    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/rent",
            serde_json::json!({"customer_id": customer_id, "dvd_id": dvd_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let rental = json(response).await;
    assert_eq!(rental["dvd_id"], dvd_id.as_str());
    let rental_id = rental["id"].as_str().unwrap().to_string();

    let response = dvd_app
        .clone()
        .oneshot(get(&format!("/dvd/v1/dvds/{}", dvd_id)))
        .await
        .unwrap();
    assert_eq!(json(response).await["status"], "NotAvailable");

    // Renting again is rejected by the DVD service, in-band
    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/rent",
            serde_json::json!({"customer_id": customer_id, "dvd_id": dvd_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json(response).await;
    assert_eq!(body["kind"], "remote");
    assert_eq!(body["error"], format!("dvd {} not available", dvd_id));

    // Return it
    let response = customers
        .clone()
        .oneshot(post(
            &format!("/customer/v1/rentals/{}/return", rental_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = dvd_app
        .oneshot(get(&format!("/dvd/v1/dvds/{}", dvd_id)))
        .await
        .unwrap();
    assert_eq!(json(response).await["status"], "Available");

    // The rental is closed
    let response = customers
        .oneshot(post(
            &format!("/customer/v1/rentals/{}/return", rental_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rent_unknown_dvd_is_remote_not_found() {
    let (_, dvd_url) = start_dvd_service().await;
    let customers = customer_app(dvd_url, SqliteDatabase::open_in_memory().unwrap()).await;

    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/register",
            serde_json::json!({"name": "Ann", "address": "1 Main St"}),
        ))
        .await
        .unwrap();
    let customer_id = json(response).await["id"].as_str().unwrap().to_string();
    let dvd_id = uuid::Uuid::new_v4().to_string();

    let response = customers
        .oneshot(post(
            "/customer/v1/rent",
            serde_json::json!({"customer_id": customer_id, "dvd_id": dvd_id}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json(response).await["error"], format!("dvds {} not found", dvd_id));
}

#[tokio::test]
async fn test_dvd_service_down_is_server_error() {
    let customers = customer_app(
        "http://127.0.0.1:1".to_string(),
        SqliteDatabase::open_in_memory().unwrap(),
    )
    .await;

    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/register",
            serde_json::json!({"name": "Ann", "address": "1 Main St"}),
        ))
        .await
        .unwrap();
    let customer_id = json(response).await["id"].as_str().unwrap().to_string();

    let response = customers
        .clone()
        .oneshot(post(
            "/customer/v1/rent",
            serde_json::json!({"customer_id": customer_id, "dvd_id": uuid::Uuid::new_v4().to_string()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(response).await["kind"], "infra");

    let response = customers.oneshot(get("/health")).await.unwrap();
    let health = json(response).await;
    assert_eq!(health["circuits"]["rent_dvd_remote"], "closed");
}
