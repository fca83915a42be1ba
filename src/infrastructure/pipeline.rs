//! Resilience Pipeline
//!
//! Every service method and every remote call runs through the same stack
//! of decorators, from innermost to outermost:
//!
//! rate limiter -> circuit breaker -> tracer -> logger -> instrumenter
//!
//! Each layer is an [`Operation`] wrapping another [`Operation`]. The
//! limiter and breaker state is keyed by operation name and shared by all
//! concurrent callers.

use crate::domain::errors::{ErrorKind, ServiceError};
use crate::domain::ports::MetricsStore;
use crate::infrastructure::call_context::CallContext;
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// A named unit of work taking a request and producing a response.
#[async_trait]
pub trait Operation<Req, Res>: Send + Sync {
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError>;
}

/// Adapts an async closure into an [`Operation`].
pub struct FnOperation<F> {
    f: F,
}

/// Build an [`Operation`] from `|ctx, req| async move { ... }`.
pub fn operation_fn<F>(f: F) -> FnOperation<F> {
    FnOperation { f }
}

#[async_trait]
impl<Req, Res, F, Fut> Operation<Req, Res> for FnOperation<F>
where
    Req: Send + 'static,
    Res: Send + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Res, ServiceError>> + Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        (self.f)(ctx.clone(), req).await
    }
}

/// Rejects calls once the operation's token bucket is empty.
pub struct RateLimitLayer<Req, Res> {
    name: String,
    limiter: Arc<RateLimiter>,
    inner: Arc<dyn Operation<Req, Res>>,
}

#[async_trait]
impl<Req, Res> Operation<Req, Res> for RateLimitLayer<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        match self.limiter.check(&self.name) {
            RateLimitResult::Allowed { .. } => self.inner.call(ctx, req).await,
            RateLimitResult::Limited { retry_after_ms } => {
                tracing::debug!(method = %self.name, retry_after_ms, "rate limited");
                Err(ServiceError::throttled(
                    &self.name,
                    Duration::from_millis(retry_after_ms),
                ))
            }
        }
    }
}

/// Short-circuits calls while the operation's circuit is open and bounds
/// each admitted call by the breaker's call timeout.
pub struct CircuitBreakerLayer<Req, Res> {
    name: String,
    breaker: Arc<CircuitBreaker>,
    inner: Arc<dyn Operation<Req, Res>>,
}

#[async_trait]
impl<Req, Res> Operation<Req, Res> for CircuitBreakerLayer<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        // Released on drop if this future is abandoned mid-call
        let Some(permit) = self.breaker.allow_request(&self.name) else {
            return Err(ServiceError::circuit_open(&self.name));
        };

        let child = ctx.child_with_timeout(self.breaker.call_timeout(&self.name));
        let result = child.run(self.inner.call(&child, req)).await;

        match &result {
            Ok(_) => permit.record_success(),
            Err(e) if e.kind().trips_breaker() => permit.record_failure(),
            // Never reached the dependency
            Err(e) if matches!(e.kind(), ErrorKind::Throttled | ErrorKind::Cancelled) => {
                permit.release()
            }
            Err(_) => permit.record_success(),
        }

        result
    }
}

/// Runs each call inside a `tracing` span recording its outcome.
pub struct TraceLayer<Req, Res> {
    name: String,
    inner: Arc<dyn Operation<Req, Res>>,
}

#[async_trait]
impl<Req, Res> Operation<Req, Res> for TraceLayer<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        let span = tracing::info_span!(
            "operation",
            method = %self.name,
            outcome = tracing::field::Empty,
            error_kind = tracing::field::Empty,
        );

        let result = self.inner.call(ctx, req).instrument(span.clone()).await;

        match &result {
            Ok(_) => {
                span.record("outcome", "ok");
            }
            Err(e) => {
                span.record("outcome", "error");
                span.record("error_kind", e.kind().as_str());
            }
        }

        result
    }
}

/// Emits one structured log event per call.
pub struct LogLayer<Req, Res> {
    name: String,
    inner: Arc<dyn Operation<Req, Res>>,
}

#[async_trait]
impl<Req, Res> Operation<Req, Res> for LogLayer<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        let start = Instant::now();
        let result = self.inner.call(ctx, req).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(method = %self.name, elapsed_ms, "call completed"),
            Err(e) => tracing::warn!(
                method = %self.name,
                elapsed_ms,
                kind = %e.kind(),
                error = %e,
                "call failed"
            ),
        }

        result
    }
}

/// Counts requests and records latency labelled by method and success.
pub struct InstrumentLayer<Req, Res> {
    name: String,
    metrics: Arc<dyn MetricsStore>,
    inner: Arc<dyn Operation<Req, Res>>,
}

#[async_trait]
impl<Req, Res> Operation<Req, Res> for InstrumentLayer<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, ctx: &CallContext, req: Req) -> Result<Res, ServiceError> {
        let start = Instant::now();
        let result = self.inner.call(ctx, req).await;

        self.metrics.increment_requests(&self.name);
        self.metrics
            .observe_latency(&self.name, result.is_ok(), start.elapsed());

        result
    }
}

/// Rate limit and breaker settings for one named operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPolicy {
    pub rate_limit: RateLimitConfig,
    pub breaker: CircuitBreakerConfig,
}

/// Process-wide resilience state and the builder for pipelines.
#[derive(Clone)]
pub struct Resilience {
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<dyn MetricsStore>,
}

impl Resilience {
    pub fn new(metrics: Arc<dyn MetricsStore>) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::default()),
            breaker: Arc::new(CircuitBreaker::default()),
            metrics,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsStore> {
        &self.metrics
    }

    /// Register `policy` under `name` and wrap `op` in the full pipeline.
    pub fn wrap<Req, Res, O>(
        &self,
        name: &str,
        policy: &OperationPolicy,
        op: O,
    ) -> Arc<dyn Operation<Req, Res>>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        O: Operation<Req, Res> + 'static,
    {
        self.limiter.configure(name, policy.rate_limit.clone());
        self.breaker.configure(name, policy.breaker.clone());

        let name = name.to_string();
        let op: Arc<dyn Operation<Req, Res>> = Arc::new(op);

        let op: Arc<dyn Operation<Req, Res>> = Arc::new(RateLimitLayer {
            name: name.clone(),
            limiter: self.limiter.clone(),
            inner: op,
        });
        let op: Arc<dyn Operation<Req, Res>> = Arc::new(CircuitBreakerLayer {
            name: name.clone(),
            breaker: self.breaker.clone(),
            inner: op,
        });
        let op: Arc<dyn Operation<Req, Res>> = Arc::new(TraceLayer {
            name: name.clone(),
            inner: op,
        });
        let op: Arc<dyn Operation<Req, Res>> = Arc::new(LogLayer {
            name: name.clone(),
            inner: op,
        });
        Arc::new(InstrumentLayer {
            name,
            metrics: self.metrics.clone(),
            inner: op,
        })
    }
}
