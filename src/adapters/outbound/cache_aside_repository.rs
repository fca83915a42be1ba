//! Cache-Aside Repository
//!
//! Implements Repository by coordinating the durable store and the entity
//! cache for one entity type.
//!
//! Reads go to the cache first and fall back to the durable store,
//! repopulating the cache on the way out. Writes update the cache inside the
//! durable transaction and commit only once the cache write succeeded, so a
//! cache failure leaves the durable store untouched. The durable store is the
//! source of truth.

use crate::domain::entities::Entity;
use crate::domain::errors::ServiceError;
use crate::domain::ports::{EntityCache, EntityStore, Mutation, Repository, StoreTx};
use crate::infrastructure::CallContext;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Cache-aside repository for entity type `E`.
///
/// Stateless between calls; safe to share across tasks.
pub struct CacheAsideRepository<E> {
    store: Arc<dyn EntityStore<E>>,
    cache: Arc<dyn EntityCache<E>>,
    key: String,
}

impl<E: Entity> CacheAsideRepository<E> {
    /// Create a repository caching under `E::COLLECTION`.
    pub fn new(store: Arc<dyn EntityStore<E>>, cache: Arc<dyn EntityCache<E>>) -> Self {
        Self {
            store,
            cache,
            key: E::COLLECTION.to_string(),
        }
    }

    /// Override the cache collection key.
    pub fn with_collection_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn collection_key(&self) -> &str {
        &self.key
    }

    /// Roll back `tx` and hand back the error that caused it.
    async fn abort(&self, tx: Box<dyn StoreTx<E>>, cause: ServiceError) -> ServiceError {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(collection = %self.key, "rollback failed: {}", e);
        }
        cause
    }

    /// Write `entity` to the cache, then commit. A cache failure rolls the
    /// transaction back; a commit failure evicts the fresh cache entry.
    async fn cache_then_commit(
        &self,
        ctx: &CallContext,
        tx: Box<dyn StoreTx<E>>,
        entity: &E,
    ) -> Result<(), ServiceError> {
        if let Err(e) = ctx.run(self.cache.store_to_cache(&self.key, entity)).await {
            tracing::warn!(collection = %self.key, id = entity.id(), "cache write failed: {}", e);
            return Err(self.abort(tx, e).await);
        }

        if let Err(e) = ctx.run(tx.commit()).await {
            tracing::error!(collection = %self.key, id = entity.id(), "commit failed: {}", e);
            if let Err(evict) = self.cache.remove_from_cache(&self.key, entity.id()).await {
                tracing::error!(
                    collection = %self.key,
                    id = entity.id(),
                    "evicting uncommitted cache entry failed: {}",
                    evict
                );
            }
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for CacheAsideRepository<E> {
    async fn store(&self, ctx: &CallContext, entity: E) -> Result<E, ServiceError> {
        let mut entity = entity;
        entity.base_mut().stamp_created(Utc::now());

        let mut tx = ctx.run(self.store.begin()).await?;
        if let Err(e) = ctx.run(tx.insert(&entity)).await {
            return Err(self.abort(tx, e).await);
        }

        self.cache_then_commit(ctx, tx, &entity).await?;
        tracing::debug!(collection = %self.key, id = entity.id(), "stored");
        Ok(entity)
    }

    async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<E, ServiceError> {
        if let Some(entity) = ctx.run(self.cache.get_from_cache(&self.key, id)).await? {
            return Ok(entity);
        }

        let entity = ctx
            .run(self.store.select(id))
            .await?
            .ok_or_else(|| ServiceError::not_found(&self.key, id))?;

        ctx.run(self.cache.store_to_cache(&self.key, &entity)).await?;
        Ok(entity)
    }

    async fn update(&self, ctx: &CallContext, entity: E) -> Result<E, ServiceError> {
        let id = entity.id().to_string();
        self.modify(
            ctx,
            &id,
            Box::new(move |current: &mut E| {
                *current = entity;
                Ok(())
            }),
        )
        .await
    }

    async fn modify(
        &self,
        ctx: &CallContext,
        id: &str,
        mutation: Mutation<E>,
    ) -> Result<E, ServiceError> {
        let mut tx = ctx.run(self.store.begin()).await?;

        let mut entity = match ctx.run(tx.select(id)).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                let err = ServiceError::not_found(&self.key, id);
                return Err(self.abort(tx, err).await);
            }
            Err(e) => return Err(self.abort(tx, e).await),
        };

        let original = entity.base().clone();
        if let Err(e) = mutation(&mut entity) {
            return Err(self.abort(tx, e).await);
        }

        // Identity and creation time belong to the stored row
        let base = entity.base_mut();
        base.id = original.id;
        base.created_at = original.created_at;
        base.deleted_at = None;
        base.stamp_updated(Utc::now());

        if let Err(e) = ctx.run(tx.update(&entity)).await {
            return Err(self.abort(tx, e).await);
        }

        self.cache_then_commit(ctx, tx, &entity).await?;
        tracing::debug!(collection = %self.key, id, "updated");
        Ok(entity)
    }

    async fn delete(&self, ctx: &CallContext, entity: &E) -> Result<(), ServiceError> {
        let mut doomed = entity.clone();
        let now = Utc::now();
        doomed.base_mut().deleted_at = Some(now);
        doomed.base_mut().stamp_updated(now);

        let mut tx = ctx.run(self.store.begin()).await?;
        if let Err(e) = ctx.run(tx.delete(&doomed)).await {
            return Err(self.abort(tx, e).await);
        }
        ctx.run(tx.commit()).await?;

        if let Err(e) = ctx
            .run(self.cache.remove_from_cache(&self.key, entity.id()))
            .await
        {
            tracing::warn!(
                collection = %self.key,
                id = entity.id(),
                "deleted but cache entry not removed: {}",
                e
            );
            return Err(e);
        }

        tracing::debug!(collection = %self.key, id = entity.id(), "deleted");
        Ok(())
    }
}
