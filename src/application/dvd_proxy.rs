//! DVD Proxy - the customer side of the cross-service boundary
//!
//! Each remote DVD method runs behind its own resilience pipeline. The
//! string error channel of the wire is decoded into a typed outcome here,
//! so callers only ever see `ServiceError`.

use crate::domain::errors::ServiceError;
use crate::domain::ports::{DvdTransport, RemoteMethod, RemoteOutcome, WireRequest};
use crate::infrastructure::{
    operation_fn, CallContext, CircuitBreakerConfig, Operation, OperationPolicy, RateLimitConfig,
    Resilience,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Remote DVD operations as seen by the customer service.
#[async_trait]
pub trait DvdRentalProxy: Send + Sync {
    /// Mark the DVD rented on the DVD service.
    async fn rent_dvd(&self, ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError>;

    /// Mark the DVD returned on the DVD service.
    async fn return_dvd(&self, ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError>;
}

/// Default policy for remote calls: 1/s with a burst of 10, breaker open
/// for 10s.
pub fn default_proxy_policy() -> OperationPolicy {
    OperationPolicy {
        rate_limit: RateLimitConfig {
            rate_per_sec: 1.0,
            burst_size: 10,
        },
        breaker: CircuitBreakerConfig {
            open_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    }
}

/// Pipeline-wrapped proxy over a [`DvdTransport`].
pub struct DvdProxy {
    rent: Arc<dyn Operation<String, ()>>,
    ret: Arc<dyn Operation<String, ()>>,
}

impl DvdProxy {
    pub const RENT_OPERATION: &'static str = "rent_dvd_remote";
    pub const RETURN_OPERATION: &'static str = "return_dvd_remote";

    pub fn new(
        transport: Arc<dyn DvdTransport>,
        resilience: &Resilience,
        policy: &OperationPolicy,
    ) -> Self {
        Self {
            rent: resilience.wrap(
                Self::RENT_OPERATION,
                policy,
                Self::remote(transport.clone(), RemoteMethod::RentDvd),
            ),
            ret: resilience.wrap(
                Self::RETURN_OPERATION,
                policy,
                Self::remote(transport, RemoteMethod::ReturnDvd),
            ),
        }
    }

    fn remote(transport: Arc<dyn DvdTransport>, method: RemoteMethod) -> impl Operation<String, ()> {
        operation_fn(move |ctx: CallContext, id: String| {
            let transport = transport.clone();
            async move {
                let response = transport.invoke(&ctx, method, WireRequest { id }).await?;
                RemoteOutcome::from(response).into_result()
            }
        })
    }
}

#[async_trait]
impl DvdRentalProxy for DvdProxy {
    async fn rent_dvd(&self, ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError> {
        self.rent.call(ctx, dvd_id.to_string()).await
    }

    async fn return_dvd(&self, ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError> {
        self.ret.call(ctx, dvd_id.to_string()).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::PrometheusMetricsStore;
    use crate::domain::errors::ErrorKind;
    use crate::domain::ports::WireResponse;
    use crate::infrastructure::CircuitState;
    use std::sync::Mutex;

    /// Transport replaying scripted results and recording requests.
    struct ScriptedTransport {
        results: Mutex<Vec<Result<WireResponse, ServiceError>>>,
        seen: Mutex<Vec<(RemoteMethod, String)>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<WireResponse, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DvdTransport for ScriptedTransport {
        async fn invoke(
            &self,
            _ctx: &CallContext,
            method: RemoteMethod,
            request: WireRequest,
        ) -> Result<WireResponse, ServiceError> {
            self.seen.lock().unwrap().push((method, request.id));
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(WireResponse::default())
            } else {
                results.remove(0)
            }
        }
    }

    fn proxy(transport: Arc<ScriptedTransport>, policy: &OperationPolicy) -> (DvdProxy, Resilience) {
        let resilience = Resilience::new(Arc::new(PrometheusMetricsStore::default()));
        (DvdProxy::new(transport, &resilience, policy), resilience)
    }

    fn ok() -> Result<WireResponse, ServiceError> {
        Ok(WireResponse { err: String::new() })
    }

    #[test]
    fn test_default_policy() {
        let policy = default_proxy_policy();
        assert_eq!(policy.rate_limit.rate_per_sec, 1.0);
        assert_eq!(policy.rate_limit.burst_size, 10);
        assert_eq!(policy.breaker.open_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_rent_success() {
        let transport = ScriptedTransport::new(vec![ok()]);
        let (proxy, _) = proxy(transport.clone(), &default_proxy_policy());

        proxy.rent_dvd(&CallContext::background(), "d1").await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(RemoteMethod::RentDvd, "d1".to_string())]);
    }

    #[tokio::test]
    async fn test_in_band_error_is_typed_remote_error() {
        let transport = ScriptedTransport::new(vec![Ok(WireResponse {
            err: "dvd d1 not available".to_string(),
        })]);
        let (proxy, _) = proxy(transport, &default_proxy_policy());

        let err = proxy
            .rent_dvd(&CallContext::background(), "d1")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(err.message(), "dvd d1 not available");
    }

    #[tokio::test]
    async fn test_return_uses_return_method() {
        let transport = ScriptedTransport::new(vec![ok()]);
        let (proxy, _) = proxy(transport.clone(), &default_proxy_policy());

        proxy.return_dvd(&CallContext::background(), "d2").await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, RemoteMethod::ReturnDvd);
    }

    #[tokio::test]
    async fn test_transport_failures_open_breaker() {
        let failures = (0..3).map(|_| Err(ServiceError::infra("connection refused"))).collect();
        let transport = ScriptedTransport::new(failures);
        let mut policy = default_proxy_policy();
        policy.breaker.failure_threshold = 3;
        let (proxy, resilience) = proxy(transport.clone(), &policy);
        let ctx = CallContext::background();

        for _ in 0..3 {
            assert_eq!(proxy.rent_dvd(&ctx, "d1").await.unwrap_err().kind(), ErrorKind::Infra);
        }
        assert_eq!(
            resilience.breaker().get_state(DvdProxy::RENT_OPERATION),
            CircuitState::Open
        );

        let err = proxy.rent_dvd(&ctx, "d1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
        assert_eq!(transport.seen.lock().unwrap().len(), 3);

        // Return has its own circuit
        assert!(proxy.return_dvd(&ctx, "d1").await.is_ok());
    }

    #[tokio::test]
    async fn test_remote_errors_do_not_open_breaker() {
        let rejections = (0..8)
            .map(|_| Ok(WireResponse { err: "dvd d1 not available".to_string() }))
            .collect();
        let transport = ScriptedTransport::new(rejections);
        let mut policy = default_proxy_policy();
        policy.breaker.failure_threshold = 2;
        let (proxy, resilience) = proxy(transport, &policy);
        let ctx = CallContext::background();

        for _ in 0..8 {
            assert_eq!(proxy.rent_dvd(&ctx, "d1").await.unwrap_err().kind(), ErrorKind::Remote);
        }
        assert_eq!(
            resilience.breaker().get_state(DvdProxy::RENT_OPERATION),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_burst_then_throttled() {
        let transport = ScriptedTransport::new(vec![]);
        let (proxy, _) = proxy(transport.clone(), &default_proxy_policy());
        let ctx = CallContext::background();

        for _ in 0..10 {
            proxy.rent_dvd(&ctx, "d1").await.unwrap();
        }
        let err = proxy.rent_dvd(&ctx, "d1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert_eq!(transport.seen.lock().unwrap().len(), 10);
    }
}
