//! Entity Store Port
//!
//! Defines the interface to the durable store. Implementations may use
//! SQLite, PostgreSQL, or in-memory storage; the repository only relies on
//! insert/select/update/delete inside explicit transactions.

use crate::domain::entities::Entity;
use crate::domain::errors::ServiceError;
use async_trait::async_trait;

/// Durable, transactional storage for one entity type.
///
/// This is an outbound port. Rows whose `deleted_at` is set are treated as
/// absent by every read.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx<E>>, ServiceError>;

    /// Select a live row by primary key outside any transaction.
    async fn select(&self, id: &str) -> Result<Option<E>, ServiceError>;
}

/// An open durable-store transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StoreTx<E: Entity>: Send {
    /// Insert a new row. A duplicate id fails with `AlreadyExists`.
    async fn insert(&mut self, entity: &E) -> Result<(), ServiceError>;

    /// Select a live row by primary key within the transaction.
    async fn select(&mut self, id: &str) -> Result<Option<E>, ServiceError>;

    /// Overwrite a live row. A missing row fails with `NotFound`.
    async fn update(&mut self, entity: &E) -> Result<(), ServiceError>;

    /// Soft-delete a live row using the entity's `deleted_at` stamp.
    /// A missing row fails with `NotFound`.
    async fn delete(&mut self, entity: &E) -> Result<(), ServiceError>;

    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}
