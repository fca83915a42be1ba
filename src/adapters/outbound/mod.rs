mod cache_aside_repository;
mod dashmap_hash_cache;
mod http_dvd_transport;
mod json_entity_cache;
mod prometheus_metrics_store;
mod redis_hash_cache;
mod sqlite_entity_store;

pub use cache_aside_repository::CacheAsideRepository;
pub use dashmap_hash_cache::DashMapHashCache;
pub use http_dvd_transport::HttpDvdTransport;
pub use json_entity_cache::JsonEntityCache;
pub use prometheus_metrics_store::{LatencyMetrics, PrometheusMetricsStore};
pub use redis_hash_cache::RedisHashCache;
pub use sqlite_entity_store::{SqliteDatabase, SqliteEntityStore, SqliteRecord, SqliteTx};
