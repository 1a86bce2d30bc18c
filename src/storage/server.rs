use super::store::Store;
use crate::cache::KvCache;
use crate::error::{KvError, KvResult};
use std::sync::Arc;

pub const MAX_KEY_SIZE: usize = 256;
pub const MAX_VALUE_SIZE: usize = 256 * 1024;

pub fn validate_key(key: &str) -> KvResult<()> {
    if key.is_empty() {
        return Err(KvError::InvalidKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(KvError::OversizedKey);
    }
    Ok(())
}

pub fn validate_value(value: &str) -> KvResult<()> {
    if value.is_empty() {
        return Err(KvError::InvalidValue);
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::OversizedValue);
    }
    Ok(())
}

/// Write-through storage: an eviction cache over a durable store.
pub struct KvServer {
    cache: KvCache,
    store: Arc<dyn Store>,
}

impl KvServer {
    pub fn new(num_sets: usize, max_elems_per_set: usize, store: Arc<dyn Store>) -> Self {
        Self {
            cache: KvCache::new(num_sets, max_elems_per_set),
            store,
        }
    }

    /// Writes the cache first, then the store, both under the key's set lock.
    pub async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        validate_key(key)?;
        validate_value(value)?;

        let mut set = self.cache.lock_for(key).await;
        set.put(key, value);
        self.store.put(key, value);
        Ok(())
    }

    /// Serves from cache when possible, otherwise reads the store and
    /// backfills the cache on a hit.
    pub async fn get(&self, key: &str) -> KvResult<String> {
        validate_key(key)?;

        let mut set = self.cache.lock_for(key).await;
        if let Some(value) = set.get(key) {
            return Ok(value);
        }

        match self.store.get(key) {
            Some(value) => {
                set.put(key, &value);
                Ok(value)
            }
            None => Err(KvError::NoSuchKey),
        }
    }

    /// Removes the key from both layers. Absence in either is not an error.
    pub async fn del(&self, key: &str) -> KvResult<()> {
        validate_key(key)?;

        let mut set = self.cache.lock_for(key).await;
        set.del(key);
        self.store.del(key);
        Ok(())
    }

    /// Store membership check that leaves cache reference bits untouched.
    /// Taken under the key's set lock, like every other access.
    pub async fn has_key(&self, key: &str) -> bool {
        let _set = self.cache.lock_for(key).await;
        self.store.get(key).is_some()
    }

    pub fn cache(&self) -> &KvCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
