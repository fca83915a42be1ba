//! DVD Service - catalogue and availability use cases
//!
//! Owns the DVD repository. Renting and returning are read-modify-write
//! updates guarded by an availability precondition.

use crate::application::validation;
use crate::domain::entities::{Dvd, DvdStatus, Entity};
use crate::domain::errors::ServiceError;
use crate::domain::ports::Repository;
use crate::infrastructure::CallContext;
use async_trait::async_trait;
use std::sync::Arc;

/// DVD use cases.
#[async_trait]
pub trait DvdService: Send + Sync {
    /// Add a DVD to the catalogue, initially available.
    async fn create_dvd(&self, ctx: &CallContext, name: String) -> Result<Dvd, ServiceError>;

    async fn get_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError>;

    /// Mark an available DVD as rented.
    async fn rent_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError>;

    /// Mark a rented DVD as available again.
    async fn return_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError>;

    async fn delete_dvd(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError>;
}

/// DVD service backed by a repository.
pub struct BasicDvdService {
    dvds: Arc<dyn Repository<Dvd>>,
}

impl BasicDvdService {
    pub fn new(dvds: Arc<dyn Repository<Dvd>>) -> Self {
        Self { dvds }
    }
}

#[async_trait]
impl DvdService for BasicDvdService {
    async fn create_dvd(&self, ctx: &CallContext, name: String) -> Result<Dvd, ServiceError> {
        validation::require("name", &name)?;
        let dvd = self.dvds.store(ctx, Dvd::new(name)).await?;
        tracing::info!(id = dvd.id(), "dvd created");
        Ok(dvd)
    }

    async fn get_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        validation::entity_id("id", &id)?;
        self.dvds.get_by_id(ctx, &id).await
    }

    async fn rent_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        validation::entity_id("id", &id)?;
        self.dvds
            .modify(
                ctx,
                &id,
                Box::new(|dvd: &mut Dvd| {
                    if dvd.status == DvdStatus::NotAvailable {
                        return Err(ServiceError::dvd_not_available(dvd.id()));
                    }
                    dvd.status = DvdStatus::NotAvailable;
                    Ok(())
                }),
            )
            .await
    }

    async fn return_dvd(&self, ctx: &CallContext, id: String) -> Result<Dvd, ServiceError> {
        validation::entity_id("id", &id)?;
        self.dvds
            .modify(
                ctx,
                &id,
                Box::new(|dvd: &mut Dvd| {
                    if dvd.status != DvdStatus::NotAvailable {
                        return Err(ServiceError::dvd_not_rented(dvd.id()));
                    }
                    dvd.status = DvdStatus::Available;
                    Ok(())
                }),
            )
            .await
    }

    async fn delete_dvd(&self, ctx: &CallContext, id: String) -> Result<(), ServiceError> {
        validation::entity_id("id", &id)?;
        let dvd = self.dvds.get_by_id(ctx, &id).await?;
        self.dvds.delete(ctx, &dvd).await?;
        tracing::info!(id = %id, "dvd deleted");
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

    /// Repository over a plain map, applying mutations in place.
    struct MockRepo {
        dvds: Mutex<HashMap<String, Dvd>>,
        stores: Mutex<u32>,
    }

    impl MockRepo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                dvds: Mutex::new(HashMap::new()),
                stores: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Repository<Dvd> for MockRepo {
        async fn store(&self, _ctx: &CallContext, entity: Dvd) -> Result<Dvd, ServiceError> {
            *self.stores.lock().unwrap() += 1;
            self.dvds
                .lock()
                .unwrap()
                .insert(entity.id().to_string(), entity.clone());
            Ok(entity)
        }

        async fn get_by_id(&self, _ctx: &CallContext, id: &str) -> Result<Dvd, ServiceError> {
            self.dvds
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found("dvds", id))
        }

        async fn update(&self, _ctx: &CallContext, entity: Dvd) -> Result<Dvd, ServiceError> {
            self.dvds
                .lock()
                .unwrap()
                .insert(entity.id().to_string(), entity.clone());
            Ok(entity)
        }

        async fn modify(
            &self,
            _ctx: &CallContext,
            id: &str,
            mutation: Mutation<Dvd>,
        ) -> Result<Dvd, ServiceError> {
            let mut dvds = self.dvds.lock().unwrap();
            let current = dvds
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found("dvds", id))?;
            let mut next = current;
            mutation(&mut next)?;
            dvds.insert(id.to_string(), next.clone());
            Ok(next)
        }

        async fn delete(&self, _ctx: &CallContext, entity: &Dvd) -> Result<(), ServiceError> {
            self.dvds.lock().unwrap().remove(entity.id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_dvd() {
        let repo = MockRepo::new();
        let service = BasicDvdService::new(repo.clone());

        let dvd = service
            .create_dvd(&CallContext::background(), "Alien".to_string())
            .await
            .unwrap();

        assert_eq!(dvd.name, "Alien");
        assert!(dvd.is_available());
        assert_eq!(*repo.stores.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let repo = MockRepo::new();
        let service = BasicDvdService::new(repo.clone());

        let err = service
            .create_dvd(&CallContext::background(), "".to_string())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(*repo.stores.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rent_then_rent_again() {
        let service = BasicDvdService::new(MockRepo::new());
        let ctx = CallContext::background();
        let dvd = service.create_dvd(&ctx, "Alien".to_string()).await.unwrap();

        let rented = service.rent_dvd(&ctx, dvd.id().to_string()).await.unwrap();
        assert_eq!(rented.status, DvdStatus::NotAvailable);

        let err = service.rent_dvd(&ctx, dvd.id().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DvdNotAvailable);

        let current = service.get_dvd(&ctx, dvd.id().to_string()).await.unwrap();
        assert_eq!(current.status, DvdStatus::NotAvailable);
    }

    #[tokio::test]
    async fn test_return_requires_rented() {
        let service = BasicDvdService::new(MockRepo::new());
        let ctx = CallContext::background();
        let dvd = service.create_dvd(&ctx, "Alien".to_string()).await.unwrap();

        let err = service.return_dvd(&ctx, dvd.id().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DvdNotRented);

        service.rent_dvd(&ctx, dvd.id().to_string()).await.unwrap();
        let returned = service.return_dvd(&ctx, dvd.id().to_string()).await.unwrap();
        assert!(returned.is_available());
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let service = BasicDvdService::new(MockRepo::new());
        let err = service
            .rent_dvd(&CallContext::background(), "some-id".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_then_get_not_found() {
        let service = BasicDvdService::new(MockRepo::new());
        let ctx = CallContext::background();
        let dvd = service.create_dvd(&ctx, "Alien".to_string()).await.unwrap();

        service.delete_dvd(&ctx, dvd.id().to_string()).await.unwrap();

        let err = service.get_dvd(&ctx, dvd.id().to_string()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
