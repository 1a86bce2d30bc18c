use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::Path;

/// Durable key-value backing layer.
///
/// Callers serialize access per key through the cache-set lock, so
/// implementations only need to be safe for concurrent use across keys.
pub trait Store: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str);
    /// Removing an absent key is a no-op.
    fn del(&self, key: &str);
    fn dump_to_file(&self, path: &Path) -> Result<()>;
    fn restore_from_file(&self, path: &Path) -> Result<()>;
}

/// In-memory store persisted through whole-file dumps.
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|value| value.value().clone())
    }

    fn put(&self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
    }

    fn del(&self, key: &str) {
        self.data.remove(key);
    }

    /// Writes a sorted JSON snapshot. The file is replaced atomically so a
    /// crash mid-dump leaves the previous snapshot intact.
    fn dump_to_file(&self, path: &Path) -> Result<()> {
        let snapshot: BTreeMap<String, String> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let tmp = path.with_extension("tmp");
        let encoded = serde_json::to_vec(&snapshot)?;
        std::fs::write(&tmp, encoded)
            .with_context(|| format!("writing store snapshot {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("installing store snapshot {}", path.display()))?;

        tracing::debug!("Dumped {} entries to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Loads a snapshot written by `dump_to_file`, replacing current contents.
    /// A missing file leaves the store empty.
    fn restore_from_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            tracing::info!("No store snapshot at {}, starting empty", path.display());
            return Ok(());
        }

        let raw = std::fs::read(path)
            .with_context(|| format!("reading store snapshot {}", path.display()))?;
        let snapshot: BTreeMap<String, String> = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing store snapshot {}", path.display()))?;

        self.data.clear();
        for (key, value) in snapshot {
            self.data.insert(key, value);
        }

        tracing::info!("Restored {} entries from {}", self.data.len(), path.display());
        Ok(())
    }
}
