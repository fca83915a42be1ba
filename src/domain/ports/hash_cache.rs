//! Hash Cache Port
//!
//! Defines the interface to a hash-map-shaped cache: values are addressed
//! by a collection key plus a field, the way a Redis hash is.

use crate::domain::errors::ServiceError;
use async_trait::async_trait;

/// Byte-level hash cache.
///
/// A missing field is `Ok(None)`, never an error.
#[async_trait]
pub trait HashCache: Send + Sync {
    /// Set `field` of hash `key` to `value`.
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), ServiceError>;

    /// Get `field` of hash `key`.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, ServiceError>;

    /// Remove `field` from hash `key`. Returns whether it was present.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, ServiceError>;
}
