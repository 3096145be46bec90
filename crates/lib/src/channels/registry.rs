//! Channel registry: register and look up adapters by id.

use crate::channels::adapter::ChannelAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of channel ids to adapters. Shared across the gateway; all
/// mutation goes through the lock so multi-threaded runtimes are safe.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an adapter under its id. A previous adapter with the same id
    /// is stopped and replaced.
    pub async fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(adapter.id().to_string(), adapter) {
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.inner.write().await.remove(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
