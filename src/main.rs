//! DVD rental - customer API and DVD service with hexagonal architecture
//!
//! This is the composition root that wires together all the components.
//! `RENTAL_SERVICE` selects which of the two services the process runs.

use dvd_rental::adapters::inbound::{customer_router, dvd_router, ApiServer, ApiState};
use dvd_rental::adapters::outbound::{
    CacheAsideRepository, DashMapHashCache, HttpDvdTransport, JsonEntityCache,
    PrometheusMetricsStore, RedisHashCache, SqliteDatabase, SqliteEntityStore, SqliteRecord,
};
use dvd_rental::application::{
    BasicCustomerService, BasicDvdService, CustomerService, DvdProxy, DvdService,
    ResilientCustomerService, ResilientDvdService,
};
use dvd_rental::config::{load_config, Config, ServiceKind};
use dvd_rental::domain::ports::{HashCache, Repository};
use dvd_rental::infrastructure::{shutdown_signal, Resilience, ShutdownController};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting dvd-rental service={} listen={} db={}",
        cfg.service,
        cfg.listen_addr,
        cfg.db_path
    );

    // ===== COMPOSITION ROOT =====

    // 1. Shared outbound adapters
    let db = SqliteDatabase::open(&cfg.db_path)?;
    let hashes: Arc<dyn HashCache> = match &cfg.redis_url {
        Some(url) => Arc::new(RedisHashCache::connect(url).await?),
        None => {
            tracing::info!("using in-process cache");
            Arc::new(DashMapHashCache::new())
        }
    };
    let metrics = Arc::new(PrometheusMetricsStore::new(
        cfg.metrics_namespace.clone(),
        cfg.service.to_string(),
    ));
    let resilience = Resilience::new(metrics.clone());
    let shutdown = ShutdownController::new();

    // 2. Service for the selected role, wrapped in its pipelines
    let router = match cfg.service {
        ServiceKind::Customer => {
            let customers = repository(&db, &hashes, &cfg.customer_cache_key).await?;
            let rentals = repository(&db, &hashes, &cfg.rental_cache_key).await?;

            let transport = Arc::new(HttpDvdTransport::new(cfg.dvd_service_url.clone()));
            let proxy = Arc::new(DvdProxy::new(transport, &resilience, &cfg.proxy_policy));
            tracing::info!("dvd service at {}", cfg.dvd_service_url);

            let service: Arc<dyn CustomerService> = Arc::new(ResilientCustomerService::new(
                Arc::new(BasicCustomerService::new(customers, rentals, proxy)),
                &resilience,
                &cfg.endpoint_policy,
            ));
            customer_router(state(&cfg, service, &metrics, &resilience, &shutdown))
        }
        ServiceKind::Dvd => {
            let dvds = repository(&db, &hashes, &cfg.dvd_cache_key).await?;

            let service: Arc<dyn DvdService> = Arc::new(ResilientDvdService::new(
                Arc::new(BasicDvdService::new(dvds)),
                &resilience,
                &cfg.endpoint_policy,
            ));
            dvd_router(state(&cfg, service, &metrics, &resilience, &shutdown))
        }
    };

    // 3. Inbound adapter, until a shutdown signal arrives
    let server = ApiServer::new(service_name(cfg.service), cfg.listen_addr.clone(), router);
    let serving = tokio::spawn(server.run(shutdown.clone()));

    shutdown_signal(shutdown.clone()).await;

    if !shutdown.wait_for_drain(cfg.drain_timeout).await {
        shutdown.abort_in_flight();
    }

    serving.await??;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Cache-aside repository for `E` over the shared database and cache.
async fn repository<E: SqliteRecord>(
    db: &SqliteDatabase,
    hashes: &Arc<dyn HashCache>,
    cache_key: &str,
) -> anyhow::Result<Arc<dyn Repository<E>>> {
    let store = Arc::new(SqliteEntityStore::<E>::new(db.clone()).await?);
    let cache = Arc::new(JsonEntityCache::<E>::new(hashes.clone()));
    Ok(Arc::new(
        CacheAsideRepository::new(store, cache).with_collection_key(cache_key),
    ))
}

fn state<S: ?Sized>(
    cfg: &Config,
    service: Arc<S>,
    metrics: &Arc<PrometheusMetricsStore>,
    resilience: &Resilience,
    shutdown: &ShutdownController,
) -> ApiState<S> {
    ApiState::new(
        service,
        metrics.clone(),
        resilience.breaker().clone(),
        shutdown.clone(),
        cfg.request_timeout,
    )
}

fn service_name(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Customer => "customer",
        ServiceKind::Dvd => "dvd",
    }
}
