//! Customer Service - Main application use case
//!
//! Registers and maintains customers, and books rentals: the DVD side of a
//! rental is changed on the DVD service through the proxy, the customer side
//! is recorded locally as a `Rental`.

use crate::application::dvd_proxy::DvdRentalProxy;
use crate::application::validation;
use crate::domain::entities::{Customer, Entity, Rental};
use crate::domain::errors::ServiceError;
use crate::domain::ports::Repository;
use crate::infrastructure::CallContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for a compensating remote call issued after a failed
/// rental booking.
const COMPENSATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Customer use cases.
#[async_trait]
pub trait CustomerService: Send + Sync {
    async fn register(
        &self,
        ctx: &CallContext,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError>;

    async fn get_customer(&self, ctx: &CallContext, id: String) -> Result<Customer, ServiceError>;

    async fn update_customer(
        &self,
        ctx: &CallContext,
        id: String,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError>;

    async fn delete_customer(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError>;

    /// Rent a DVD for a customer and record the rental.
    async fn rent(
        &self,
        ctx: &CallContext,
        customer_id: String,
        dvd_id: String,
    ) -> Result<Rental, ServiceError>;

    /// Return the DVD of a rental and close the rental.
    async fn return_rental(&self, ctx: &CallContext, rental_id: String) -> Result<(), ServiceError>;
}

/// Customer service backed by repositories and the DVD proxy.
pub struct BasicCustomerService {
    customers: Arc<dyn Repository<Customer>>,
    rentals: Arc<dyn Repository<Rental>>,
    dvds: Arc<dyn DvdRentalProxy>,
}

impl BasicCustomerService {
    pub fn new(
        customers: Arc<dyn Repository<Customer>>,
        rentals: Arc<dyn Repository<Rental>>,
        dvds: Arc<dyn DvdRentalProxy>,
    ) -> Self {
        Self {
            customers,
            rentals,
            dvds,
        }
    }
}

#[async_trait]
impl CustomerService for BasicCustomerService {
    async fn register(
        &self,
        ctx: &CallContext,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError> {
        validation::require("name", &name)?;
        validation::require("address", &address)?;

        let customer = self.customers.store(ctx, Customer::new(name, address)).await?;
        tracing::info!(id = customer.id(), "customer registered");
        Ok(customer)
    }

    async fn get_customer(&self, ctx: &CallContext, id: String) -> Result<Customer, ServiceError> {
        validation::entity_id("id", &id)?;
        self.customers.get_by_id(ctx, &id).await
    }

    async fn update_customer(
        &self,
        ctx: &CallContext,
        id: String,
        name: String,
        address: String,
    ) -> Result<Customer, ServiceError> {
        validation::entity_id("id", &id)?;
        validation::require("name", &name)?;
        validation::require("address", &address)?;

        self.customers
            .modify(
                ctx,
                &id,
                Box::new(move |customer: &mut Customer| {
                    customer.name = name;
                    customer.address = address;
                    Ok(())
                }),
            )
            .await
    }

    async fn delete_customer(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError> {
        validation::entity_id("id", &id)?;
        let customer = self.customers.get_by_id(ctx, &id).await?;
        self.customers.delete(ctx, &customer).await?;
        tracing::info!(id = %id, "customer deleted");
        Ok(())
    }

    async fn rent(
        &self,
        ctx: &CallContext,
        customer_id: String,
        dvd_id: String,
    ) -> Result<Rental, ServiceError> {
        validation::entity_id("customer_id", &customer_id)?;
        validation::entity_id("dvd_id", &dvd_id)?;

        // Fails with NotFound before anything remote happens
        self.customers.get_by_id(ctx, &customer_id).await?;

        self.dvds.rent_dvd(ctx, &dvd_id).await?;

        match self
            .rentals
            .store(ctx, Rental::new(customer_id, dvd_id.clone()))
            .await
        {
            Ok(rental) => {
                tracing::info!(
                    rental = rental.id(),
                    customer = %rental.customer_id,
                    dvd = %rental.dvd_id,
                    "dvd rented"
                );
                Ok(rental)
            }
            Err(e) => {
                tracing::warn!(dvd = %dvd_id, "recording rental failed, returning dvd: {}", e);
                let compensation = CallContext::with_timeout(COMPENSATION_TIMEOUT);
                if let Err(undo) = self.dvds.return_dvd(&compensation, &dvd_id).await {
                    tracing::error!(
                        dvd = %dvd_id,
                        "compensating return failed, dvd left rented: {}",
                        undo
                    );
                }
                Err(e)
            }
        }
    }

    async fn return_rental(&self, ctx: &CallContext, rental_id: String) -> Result<(), ServiceError> {
        validation::entity_id("rental_id", &rental_id)?;

        let rental = self.rentals.get_by_id(ctx, &rental_id).await?;
        self.dvds.return_dvd(ctx, &rental.dvd_id).await?;
        self.rentals.delete(ctx, &rental).await?;

        tracing::info!(rental = %rental_id, dvd = %rental.dvd_id, "dvd returned");
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;
    use crate::domain::ports::Mutation;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ===== Mock Implementations =====

    struct MockRepo<E> {
        items: Mutex<HashMap<String, E>>,
        fail_store: Mutex<Option<ServiceError>>,
    }

    impl<E> MockRepo<E> {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(HashMap::new()),
                fail_store: Mutex::new(None),
            })
        }

        fn len(&self) -> usize {
            self.items.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<E: Entity> Repository<E> for MockRepo<E> {
        async fn store(&self, _ctx: &CallContext, entity: E) -> Result<E, ServiceError> {
            if let Some(err) = self.fail_store.lock().unwrap().clone() {
                return Err(err);
            }
            self.items
                .lock()
                .unwrap()
                .insert(entity.id().to_string(), entity.clone());
            Ok(entity)
        }

        async fn get_by_id(&self, _ctx: &CallContext, id: &str) -> Result<E, ServiceError> {
            self.items
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found(E::COLLECTION, id))
        }

        async fn update(&self, _ctx: &CallContext, entity: E) -> Result<E, ServiceError> {
            self.items
                .lock()
                .unwrap()
                .insert(entity.id().to_string(), entity.clone());
            Ok(entity)
        }

        async fn modify(
            &self,
            _ctx: &CallContext,
            id: &str,
            mutation: Mutation<E>,
        ) -> Result<E, ServiceError> {
            let mut items = self.items.lock().unwrap();
            let mut next = items
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found(E::COLLECTION, id))?;
            mutation(&mut next)?;
            items.insert(id.to_string(), next.clone());
            Ok(next)
        }

        async fn delete(&self, _ctx: &CallContext, entity: &E) -> Result<(), ServiceError> {
            self.items.lock().unwrap().remove(entity.id());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockProxy {
        calls: Mutex<Vec<String>>,
        rent_error: Mutex<Option<ServiceError>>,
    }

    #[async_trait]
    impl DvdRentalProxy for MockProxy {
        async fn rent_dvd(&self, _ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(format!("rent:{}", dvd_id));
            match self.rent_error.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn return_dvd(&self, _ctx: &CallContext, dvd_id: &str) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(format!("return:{}", dvd_id));
            Ok(())
        }
    }

    struct Fixture {
        service: BasicCustomerService,
        customers: Arc<MockRepo<Customer>>,
        rentals: Arc<MockRepo<Rental>>,
        proxy: Arc<MockProxy>,
    }

    fn fixture() -> Fixture {
        let customers = MockRepo::<Customer>::new();
        let rentals = MockRepo::<Rental>::new();
        let proxy = Arc::new(MockProxy::default());
        Fixture {
            service: BasicCustomerService::new(customers.clone(), rentals.clone(), proxy.clone()),
            customers,
            rentals,
            proxy,
        }
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[tokio::test]
    async fn test_register() {
        let f = fixture();
        let customer = f
            .service
            .register(&CallContext::background(), "Ann".into(), "1 Main St".into())
            .await
            .unwrap();

        assert_eq!(customer.name, "Ann");
        assert_eq!(f.customers.len(), 1);
    }

    #[tokio::test]
    async fn test_register_validation_never_reaches_repository() {
        let f = fixture();
        let ctx = CallContext::background();

        let err = f.service.register(&ctx, "".into(), "1 Main St".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f.service.register(&ctx, "Ann".into(), " ".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(f.customers.len(), 0);
    }

    #[tokio::test]
    async fn test_update_customer() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();

        let updated = f
            .service
            .update_customer(&ctx, c.id().to_string(), "Ann B".into(), "2 Side St".into())
            .await
            .unwrap();

        assert_eq!(updated.name, "Ann B");
        assert_eq!(updated.address, "2 Side St");
        assert_eq!(updated.id(), c.id());
    }

    #[tokio::test]
    async fn test_get_with_malformed_id() {
        let f = fixture();
        let err = f
            .service
            .get_customer(&CallContext::background(), "some-id".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_customer() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();

        f.service.delete_customer(&ctx, c.id().to_string()).await.unwrap();

        let err = f.service.get_customer(&ctx, c.id().to_string()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rent_records_rental() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();
        let dvd_id = new_id();

        let rental = f.service.rent(&ctx, c.id().to_string(), dvd_id.clone()).await.unwrap();

        assert_eq!(rental.customer_id, c.id());
        assert_eq!(rental.dvd_id, dvd_id);
        assert_eq!(f.rentals.len(), 1);
        assert_eq!(*f.proxy.calls.lock().unwrap(), vec![format!("rent:{}", dvd_id)]);
    }

    #[tokio::test]
    async fn test_rent_unknown_customer_skips_remote() {
        let f = fixture();
        let err = f
            .service
            .rent(&CallContext::background(), new_id(), new_id())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(f.proxy.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rent_remote_error_records_nothing() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();
        *f.proxy.rent_error.lock().unwrap() = Some(ServiceError::remote("dvd x not available"));

        let err = f.service.rent(&ctx, c.id().to_string(), new_id()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(err.message(), "dvd x not available");
        assert_eq!(f.rentals.len(), 0);
    }

    #[tokio::test]
    async fn test_rent_compensates_when_recording_fails() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();
        *f.rentals.fail_store.lock().unwrap() = Some(ServiceError::infra("db down"));
        let dvd_id = new_id();

        let err = f.service.rent(&ctx, c.id().to_string(), dvd_id.clone()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Infra);
        assert_eq!(
            *f.proxy.calls.lock().unwrap(),
            vec![format!("rent:{}", dvd_id), format!("return:{}", dvd_id)]
        );
    }

    #[tokio::test]
    async fn test_return_rental() {
        let f = fixture();
        let ctx = CallContext::background();
        let c = f.service.register(&ctx, "Ann".into(), "1 Main St".into()).await.unwrap();
        let dvd_id = new_id();
        let rental = f.service.rent(&ctx, c.id().to_string(), dvd_id.clone()).await.unwrap();

        f.service.return_rental(&ctx, rental.id().to_string()).await.unwrap();

        assert_eq!(f.rentals.len(), 0);
        assert_eq!(
            f.proxy.calls.lock().unwrap().last().cloned(),
            Some(format!("return:{}", dvd_id))
        );

        let err = f
            .service
            .return_rental(&ctx, rental.id().to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
