//! JSON Entity Cache
//!
//! Implements EntityCache on top of any HashCache, encoding entities as
//! JSON under (collection key, entity id).

use crate::domain::entities::Entity;
use crate::domain::errors::ServiceError;
use crate::domain::ports::{EntityCache, HashCache};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct JsonEntityCache<E> {
    cache: Arc<dyn HashCache>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> JsonEntityCache<E> {
    pub fn new(cache: Arc<dyn HashCache>) -> Self {
        Self {
            cache,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity> EntityCache<E> for JsonEntityCache<E> {
    async fn store_to_cache(&self, key: &str, value: &E) -> Result<(), ServiceError> {
        let bytes = serde_json::to_vec(value)?;
        self.cache.hset(key, value.id(), bytes).await
    }

    async fn get_from_cache(&self, key: &str, field: &str) -> Result<Option<E>, ServiceError> {
        match self.cache.hget(key, field).await? {
            Some(bytes) => {
                tracing::debug!(key, field, "cache hit");
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => {
                tracing::debug!(key, field, "cache miss");
                Ok(None)
            }
        }
    }

    async fn remove_from_cache(&self, key: &str, field: &str) -> Result<(), ServiceError> {
        self.cache.hdel(key, field).await?;
        Ok(())
    }
}
