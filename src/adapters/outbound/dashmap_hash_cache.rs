//! DashMap Hash Cache
//!
//! Implements HashCache in process memory using DashMap for concurrent access.

use crate::domain::errors::ServiceError;
use crate::domain::ports::HashCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory hash cache.
///
/// Each collection key holds its own field map. Cloning shares the
/// underlying storage.
#[derive(Clone, Default)]
pub struct DashMapHashCache {
    hashes: Arc<DashMap<String, HashMap<String, Vec<u8>>>>,
}

impl DashMapHashCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields stored under `key`.
    pub fn len(&self, key: &str) -> usize {
        self.hashes.get(key).map(|h| h.len()).unwrap_or(0)
    }

    /// Whether `key` holds no fields.
    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.hashes.clear();
    }
}

#[async_trait]
impl HashCache for DashMapHashCache {
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), ServiceError> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        Ok(self
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, ServiceError> {
        let removed = self
            .hashes
            .get_mut(key)
            .map(|mut h| h.remove(field).is_some())
            .unwrap_or(false);
        Ok(removed)
    }
}
