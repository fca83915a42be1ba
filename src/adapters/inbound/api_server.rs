//! HTTP API Server
//!
//! axum routers for the customer API and the DVD service. Every request
//! gets its own `CallContext`, derived from the shutdown controller and
//! bounded by the configured request timeout.
//!
//! The DVD service's `/dvd/v1/rent` and `/dvd/v1/return` routes speak the
//! cross-service wire contract: they always answer 200 and carry failures
//! in-band as `{"err": "<message>"}`.

use crate::adapters::outbound::PrometheusMetricsStore;
use crate::application::{CustomerService, DvdService};
use crate::domain::entities::{Customer, Dvd, Rental};
use crate::domain::errors::{ErrorKind, ServiceError};
use crate::domain::ports::{WireRequest, WireResponse};
use crate::infrastructure::{CallContext, CircuitBreaker, RequestGuard, ShutdownController};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

// ===== Requests / Responses =====

/// Body of `POST /customer/v1/register` and `PUT /customer/v1/customers/:id`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomerRequest {
    pub name: String,
    pub address: String,
}

/// Body of `POST /customer/v1/rent`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RentRequest {
    pub customer_id: String,
    pub dvd_id: String,
}

/// Body of `POST /dvd/v1/create`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateDvdRequest {
    pub name: String,
}

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub in_flight: usize,
    /// Circuit state per operation name
    pub circuits: BTreeMap<String, String>,
}

/// Error body: `{"error": message, "kind": kind}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

// ===== Errors =====

/// A [`ServiceError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists | ErrorKind::DvdNotAvailable | ErrorKind::DvdNotRented => {
                StatusCode::CONFLICT
            }
            ErrorKind::Throttled => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Remote => StatusCode::BAD_GATEWAY,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            // Client closed request
            ErrorKind::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ErrorKind::Infra => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = %self.0.kind(), "request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.message().to_string(),
            kind: self.0.kind().as_str().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ===== State =====

/// Shared router state.
pub struct ApiState<S: ?Sized> {
    pub service: Arc<S>,
    pub metrics: Arc<PrometheusMetricsStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub shutdown: ShutdownController,
    pub request_timeout: Duration,
}

impl<S: ?Sized> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
            breaker: self.breaker.clone(),
            shutdown: self.shutdown.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: ?Sized> ApiState<S> {
    pub fn new(
        service: Arc<S>,
        metrics: Arc<PrometheusMetricsStore>,
        breaker: Arc<CircuitBreaker>,
        shutdown: ShutdownController,
        request_timeout: Duration,
    ) -> Self {
        Self {
            service,
            metrics,
            breaker,
            shutdown,
            request_timeout,
        }
    }

    /// Context for one request; keep the guard alive until the response.
    fn begin(&self) -> (CallContext, RequestGuard) {
        self.shutdown.request_context(self.request_timeout)
    }
}

pub type CustomerApiState = ApiState<dyn CustomerService>;
pub type DvdApiState = ApiState<dyn DvdService>;

// ===== Routers =====

/// Router for the customer API.
pub fn customer_router(state: CustomerApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler::<dyn CustomerService>))
        .route("/metrics", get(metrics_handler::<dyn CustomerService>))
        .route("/customer/v1/register", post(register_handler))
        .route(
            "/customer/v1/customers/:id",
            get(get_customer_handler)
                .put(update_customer_handler)
                .delete(delete_customer_handler),
        )
        .route("/customer/v1/rent", post(rent_handler))
        .route("/customer/v1/rentals/:id/return", post(return_rental_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the DVD service.
pub fn dvd_router(state: DvdApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler::<dyn DvdService>))
        .route("/metrics", get(metrics_handler::<dyn DvdService>))
        .route("/dvd/v1/create", post(create_dvd_handler))
        .route(
            "/dvd/v1/dvds/:id",
            get(get_dvd_handler).delete(delete_dvd_handler),
        )
        .route("/dvd/v1/rent", post(wire_rent_handler))
        .route("/dvd/v1/return", post(wire_return_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for one of the routers.
pub struct ApiServer {
    name: &'static str,
    listen_addr: String,
    router: Router,
}

impl ApiServer {
    pub fn new(name: &'static str, listen_addr: String, router: Router) -> Self {
        Self {
            name,
            listen_addr,
            router,
        }
    }

    /// Serve until `shutdown` is initiated, then stop accepting and let
    /// open connections finish.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("{} API listening on {}", self.name, self.listen_addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("{} API stopped", self.name);
        Ok(())
    }
}

// ===== Common handlers =====

async fn health_handler<S: ?Sized + Send + Sync + 'static>(
    State(state): State<ApiState<S>>,
) -> impl IntoResponse {
    let circuits = state
        .breaker
        .all_states()
        .into_iter()
        .map(|(name, s)| (name, s.to_string()))
        .collect();

    let status = if state.shutdown.is_shutdown() {
        "draining"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        in_flight: state.shutdown.in_flight(),
        circuits,
    })
}

async fn metrics_handler<S: ?Sized + Send + Sync + 'static>(
    State(state): State<ApiState<S>>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

// ===== Customer handlers =====

async fn register_handler(
    State(state): State<CustomerApiState>,
    Json(req): Json<CustomerRequest>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let (ctx, _guard) = state.begin();
    let customer = state.service.register(&ctx, req.name, req.address).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_customer_handler(
    State(state): State<CustomerApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Customer>> {
    let (ctx, _guard) = state.begin();
    Ok(Json(state.service.get_customer(&ctx, id).await?))
}

async fn update_customer_handler(
    State(state): State<CustomerApiState>,
    Path(id): Path<String>,
    Json(req): Json<CustomerRequest>,
) -> ApiResult<Json<Customer>> {
    let (ctx, _guard) = state.begin();
    let customer = state
        .service
        .update_customer(&ctx, id, req.name, req.address)
        .await?;
    Ok(Json(customer))
}

async fn delete_customer_handler(
    State(state): State<CustomerApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let (ctx, _guard) = state.begin();
    state.service.delete_customer(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rent_handler(
    State(state): State<CustomerApiState>,
    Json(req): Json<RentRequest>,
) -> ApiResult<(StatusCode, Json<Rental>)> {
    let (ctx, _guard) = state.begin();
    let rental = state.service.rent(&ctx, req.customer_id, req.dvd_id).await?;
    Ok((StatusCode::CREATED, Json(rental)))
}

async fn return_rental_handler(
    State(state): State<CustomerApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let (ctx, _guard) = state.begin();
    state.service.return_rental(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== DVD handlers =====

async fn create_dvd_handler(
    State(state): State<DvdApiState>,
    Json(req): Json<CreateDvdRequest>,
) -> ApiResult<(StatusCode, Json<Dvd>)> {
    let (ctx, _guard) = state.begin();
    let dvd = state.service.create_dvd(&ctx, req.name).await?;
    Ok((StatusCode::CREATED, Json(dvd)))
}

async fn get_dvd_handler(
    State(state): State<DvdApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Dvd>> {
    let (ctx, _guard) = state.begin();
    Ok(Json(state.service.get_dvd(&ctx, id).await?))
}

async fn delete_dvd_handler(
    State(state): State<DvdApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let (ctx, _guard) = state.begin();
    state.service.delete_dvd(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn wire_rent_handler(
    State(state): State<DvdApiState>,
    Json(req): Json<WireRequest>,
) -> Json<WireResponse> {
    let (ctx, _guard) = state.begin();
    let result = state.service.rent_dvd(&ctx, req.id).await.map(|_| ());
    Json(WireResponse::from_result(&result))
}

async fn wire_return_handler(
    State(state): State<DvdApiState>,
    Json(req): Json<WireRequest>,
) -> Json<WireResponse> {
    let (ctx, _guard) = state.begin();
    let result = state.service.return_dvd(&ctx, req.id).await.map(|_| ());
    Json(WireResponse::from_result(&result))
}
