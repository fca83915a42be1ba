use crate::application::{default_endpoint_policy, default_proxy_policy};
use crate::infrastructure::OperationPolicy;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which of the two services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Customer,
    Dvd,
}

impl FromStr for ServiceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(ServiceKind::Customer),
            "dvd" => Ok(ServiceKind::Dvd),
            other => anyhow::bail!("unknown service {:?}, expected customer or dvd", other),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Customer => write!(f, "customer"),
            ServiceKind::Dvd => write!(f, "dvd"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Service selection
    pub service: ServiceKind,
    pub listen_addr: String,
    pub debug: bool,

    // Storage
    pub db_path: String,
    pub customer_cache_key: String,
    pub dvd_cache_key: String,
    pub rental_cache_key: String,
    /// Shared Redis cache; the in-process cache is used when unset
    pub redis_url: Option<String>,

    // Remote DVD service (customer side only)
    pub dvd_service_url: String,

    // Requests and shutdown
    pub request_timeout: Duration,
    pub drain_timeout: Duration,

    // Metrics
    pub metrics_namespace: String,

    // Resilience
    pub endpoint_policy: OperationPolicy,
    pub proxy_policy: OperationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceKind::Customer,
            listen_addr: "0.0.0.0:8080".to_string(),
            debug: false,
            db_path: "rental.db".to_string(),
            customer_cache_key: "customers".to_string(),
            dvd_cache_key: "dvds".to_string(),
            rental_cache_key: "rentals".to_string(),
            redis_url: None,
            dvd_service_url: "http://127.0.0.1:8081".to_string(),
            request_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            metrics_namespace: "rental".to_string(),
            endpoint_policy: default_endpoint_policy(),
            proxy_policy: default_proxy_policy(),
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build the configuration from a variable lookup. Unparseable numbers fall
/// back to their defaults; an unknown service name is an error.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
    let number = |key: &str, default: u64| {
        lookup(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };

    let service = match lookup("RENTAL_SERVICE") {
        Some(v) => v.parse()?,
        None => defaults.service,
    };

    let listen_addr = string("RENTAL_LISTEN_ADDR", &defaults.listen_addr);
    let debug = lookup("DEBUG").is_some();

    let db_path = string("RENTAL_DB_PATH", &defaults.db_path);
    let customer_cache_key = string("RENTAL_CUSTOMER_CACHE_KEY", &defaults.customer_cache_key);
    let dvd_cache_key = string("RENTAL_DVD_CACHE_KEY", &defaults.dvd_cache_key);
    let rental_cache_key = string("RENTAL_RENTAL_CACHE_KEY", &defaults.rental_cache_key);
    let redis_url = lookup("RENTAL_REDIS_URL").filter(|v| !v.trim().is_empty());

    let dvd_service_url = string("RENTAL_DVD_SERVICE_URL", &defaults.dvd_service_url);

    let request_timeout = Duration::from_millis(number("RENTAL_REQUEST_TIMEOUT_MS", 5000));
    let drain_timeout = Duration::from_secs(number("RENTAL_DRAIN_TIMEOUT_SECS", 30));

    let metrics_namespace = string("RENTAL_METRICS_NAMESPACE", &defaults.metrics_namespace);

    let endpoint_policy = policy(&lookup, "RENTAL_ENDPOINT", defaults.endpoint_policy);
    let proxy_policy = policy(&lookup, "RENTAL_PROXY", defaults.proxy_policy);

    Ok(Config {
        service,
        listen_addr,
        debug,
        db_path,
        customer_cache_key,
        dvd_cache_key,
        rental_cache_key,
        redis_url,
        dvd_service_url,
        request_timeout,
        drain_timeout,
        metrics_namespace,
        endpoint_policy,
        proxy_policy,
    })
}

/// Overlay `<PREFIX>_RATE`, `_BURST`, `_FAILURE_THRESHOLD`,
/// `_OPEN_TIMEOUT_SECS` and `_CALL_TIMEOUT_MS` onto `base`.
fn policy<F>(lookup: &F, prefix: &str, mut base: OperationPolicy) -> OperationPolicy
where
    F: Fn(&str) -> Option<String>,
{
    let get = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix));

    if let Some(rate) = get("RATE").and_then(|v| v.trim().parse::<f64>().ok()) {
        if rate > 0.0 {
            base.rate_limit.rate_per_sec = rate;
        }
    }
    if let Some(burst) = get("BURST").and_then(|v| v.trim().parse::<u64>().ok()) {
        base.rate_limit.burst_size = burst.max(1);
    }
    if let Some(n) = get("FAILURE_THRESHOLD").and_then(|v| v.trim().parse::<u32>().ok()) {
        base.breaker.failure_threshold = n.max(1);
    }
    if let Some(secs) = get("OPEN_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
        base.breaker.open_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = get("CALL_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        base.breaker.call_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    base
}
