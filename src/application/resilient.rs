//! Resilient service wrappers
//!
//! Every public method of a service is delegated through its own named
//! pipeline, so each method is rate limited, guarded by its own breaker,
//! traced, logged and instrumented under its own name.

use crate::application::customer_service::CustomerService;
use crate::application::dvd_service::DvdService;
use crate::domain::entities::{Customer, Dvd, Rental};
use crate::domain::errors::ServiceError;
use crate::infrastructure::{
    operation_fn, CallContext, CircuitBreakerConfig, Operation, OperationPolicy, RateLimitConfig,
    Resilience,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Default policy for service endpoints: 1/s with a burst of 1.
pub fn default_endpoint_policy() -> OperationPolicy {
    OperationPolicy {
        rate_limit: RateLimitConfig {
            rate_per_sec: 1.0,
            burst_size: 1,
        },
        breaker: CircuitBreakerConfig::default(),
    }
}

/// Wrap a service method as an operation over `Req`.
macro_rules! endpoint {
    ($resilience:expr, $policy:expr, $svc:expr, $name:literal, |$s:ident, $ctx:ident, $req:tt : $ty:ty| $body:expr) => {{
        let svc = $svc.clone();
        $resilience.wrap(
            $name,
            $policy,
            operation_fn(move |$ctx: CallContext, $req: $ty| {
                let $s = svc.clone();
                async move { $body }
            }),
        )
    }};
}

// ===== Customer =====

/// [`CustomerService`] with every method behind a pipeline.
pub struct ResilientCustomerService {
    register: Arc<dyn Operation<(String, String), Customer>>,
    get: Arc<dyn Operation<String, Customer>>,
    update: Arc<dyn Operation<(String, String, String), Customer>>,
    delete: Arc<dyn Operation<String, ()>>,
    rent: Arc<dyn Operation<(String, String), Rental>>,
    return_rental: Arc<dyn Operation<String, ()>>,
}

impl ResilientCustomerService {
    pub fn new(
        inner: Arc<dyn CustomerService>,
        resilience: &Resilience,
        policy: &OperationPolicy,
    ) -> Self {
        Self {
            register: endpoint!(resilience, policy, inner, "register", |s, ctx, (name, address): (String, String)| {
                s.register(&ctx, name, address).await
            }),
            get: endpoint!(resilience, policy, inner, "get_customer", |s, ctx, id: String| {
                s.get_customer(&ctx, id).await
            }),
            update: endpoint!(resilience, policy, inner, "update_customer", |s, ctx, (id, name, address): (String, String, String)| {
                s.update_customer(&ctx, id, name, address).await
            }),
            delete: endpoint!(resilience, policy, inner, "delete_customer", |s, ctx, id: String| {
                s.delete_customer(&ctx, id).await
            }),
            rent: endpoint!(resilience, policy, inner, "rent", |s, ctx, (customer_id, dvd_id): (String, String)| {
                s.rent(&ctx, customer_id, dvd_id).await
            }),
            return_rental: endpoint!(resilience, policy, inner, "return_rental", |s, ctx, id: String| {
                s.return_rental(&ctx, id).await
            }),
        }
    }
}

#[async_trait]
impl CustomerService for ResilientCustomerService {
    async fn register(
        &self,
        ctx: &CallContext,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError> {
        self.register.call(ctx, (name, address)).await
    }

    async fn get_customer(&self, ctx: &CallContext, id: String) -> Result<Customer, ServiceError> {
        self.get.call(ctx, id).await
    }

    async fn update_customer(
        &self,
        ctx: &CallContext,
        id: String,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError> {
        self.update.call(ctx, (id, name, address)).await
    }

    async fn delete_customer(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError> {
        self.delete.call(ctx, id).await
    }

    async fn rent(
        &self,
        ctx: &CallContext,
        customer_id: String,
        dvd_id: String,
    ) -> Result<Rental, ServiceError> {
        self.rent.call(ctx, (customer_id, dvd_id)).await
    }

    async fn return_rental(&self, ctx: &CallContext, rental_id: String) -> Result<(), ServiceError> {
        self.return_rental.call(ctx, rental_id).await
    }
}

// ===== DVD =====

/// [`DvdService`] with every method behind a pipeline.
pub struct ResilientDvdService {
    create: Arc<dyn Operation<String, Dvd>>,
    get: Arc<dyn Operation<String, Dvd>>,
    rent: Arc<dyn Operation<String, Dvd>>,
    ret: Arc<dyn Operation<String, Dvd>>,
    delete: Arc<dyn Operation<String, ()>>,
}

impl ResilientDvdService {
    pub fn new(inner: Arc<dyn DvdService>, resilience: &Resilience, policy: &OperationPolicy) -> Self {
        Self {
            create: endpoint!(resilience, policy, inner, "create_dvd", |s, ctx, name: String| {
                s.create_dvd(&ctx, name).await
            }),
            get: endpoint!(resilience, policy, inner, "get_dvd", |s, ctx, id: String| {
                s.get_dvd(&ctx, id).await
            }),
            rent: endpoint!(resilience, policy, inner, "rent_dvd", |s, ctx, id: String| {
                s.rent_dvd(&ctx, id).await
            }),
            ret: endpoint!(resilience, policy, inner, "return_dvd", |s, ctx, id: String| {
                s.return_dvd(&ctx, id).await
            }),
            delete: endpoint!(resilience, policy, inner, "delete_dvd", |s, ctx, id: String| {
                s.delete_dvd(&ctx, id).await
            }),
        }
    }
}

#[async_trait]
impl DvdService for ResilientDvdService {
    async fn create_dvd(&self, ctx: &CallContext, name: String) -> Result<Dvd, ServiceError> {
        self.create.call(ctx, name).await
    }

    async fn get_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        self.get.call(ctx, id).await
    }

    async fn rent_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        self.rent.call(ctx, id).await
    }

    async fn return_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        self.ret.call(ctx, id).await
    }

    async fn delete_dvd(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError> {
        self.delete.call(ctx, id).await
    }
}
