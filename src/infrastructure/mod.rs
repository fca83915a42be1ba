//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod call_context;
pub mod circuit_breaker;
pub mod pipeline;
pub mod rate_limiter;
pub mod shutdown;

pub use call_context::CallContext;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitPermit, CircuitState,
};
pub use pipeline::{operation_fn, FnOperation, Operation, OperationPolicy, Resilience};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
