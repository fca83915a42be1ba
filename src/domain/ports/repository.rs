//! Repository Port
//!
//! Per-entity persistence as seen by the application services. The
//! implementation decides how the durable store and the cache agree.

use crate::domain::entities::Entity;
use crate::domain::errors::ServiceError;
use crate::infrastructure::CallContext;
use async_trait::async_trait;

/// A read-modify-write step applied inside the update transaction.
///
/// Returning an error aborts the transaction and surfaces that error.
pub type Mutation<E> = Box<dyn FnOnce(&mut E) -> Result<(), ServiceError> + Send>;

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Persist a new entity. Returns it with server-assigned timestamps.
    async fn store(&self, ctx: &CallContext, entity: E) -> Result<E, ServiceError>;

    /// Load a live entity by id. A missing id is `NotFound`.
    async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<E, ServiceError>;

    /// Replace a live entity. Returns the stored value.
    async fn update(&self, ctx: &CallContext, entity: E) -> Result<E, ServiceError>;

    /// Transactionally load, mutate and store a live entity.
    async fn modify(
        &self,
        ctx: &CallContext,
        id: &str,
        mutation: Mutation<E>,
    ) -> Result<E, ServiceError>;

    /// Soft-delete a live entity.
    async fn delete(&self, ctx: &CallContext, entity: &E) -> Result<(), ServiceError>;
}
