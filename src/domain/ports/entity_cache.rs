//! Entity Cache Port
//!
//! The cache adapter contract: entities in, entities out. Implementations
//! translate to bytes and never touch the durable store.

use crate::domain::entities::Entity;
use crate::domain::errors::ServiceError;
use async_trait::async_trait;

/// Typed view over a hash cache for one entity type.
#[async_trait]
pub trait EntityCache<E: Entity>: Send + Sync {
    /// Store `value` under (`key`, `value.id()`).
    async fn store_to_cache(&self, key: &str, value: &E) -> Result<(), ServiceError>;

    /// Fetch the entity stored under (`key`, `field`). A miss is `Ok(None)`.
    async fn get_from_cache(&self, key: &str, field: &str) -> Result<Option<E>, ServiceError>;

    /// Remove the entity stored under (`key`, `field`).
    async fn remove_from_cache(&self, key: &str, field: &str) -> Result<(), ServiceError>;
}
