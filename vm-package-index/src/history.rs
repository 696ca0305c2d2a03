//! Bounded log of recent uploads, newest first.

use std::sync::Arc;

use tracing::debug;

use crate::error::IndexResult;
use crate::store::KeyValueStore;

pub struct History {
    store: Arc<dyn KeyValueStore>,
    key: String,
    size: usize,
}

impl History {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str, size: usize) -> Self {
        Self {
            store,
            key: format!("{prefix}history"),
            size: size.max(1),
        }
    }

    fn entry(name: &str, version: &str) -> String {
        format!("{name}/{version}")
    }

    /// Record an upload and truncate the log.
    pub async fn add(&self, name: &str, version: &str) -> IndexResult<()> {
        debug!(package = %name, version = %version, "Recording upload history");
        self.store.lpush(&self.key, &Self::entry(name, version)).await?;
        self.store.ltrim(&self.key, 0, self.size - 1).await
    }

    /// Drop every entry for a version.
    pub async fn remove(&self, name: &str, version: &str) -> IndexResult<()> {
        self.store
            .lrem(&self.key, &Self::entry(name, version))
            .await?;
        Ok(())
    }

    /// `name/version` entries, newest first.
    pub async fn all(&self) -> IndexResult<Vec<String>> {
        self.store.lrange(&self.key, 0, self.size - 1).await
    }

    pub async fn len(&self) -> IndexResult<usize> {
        self.store.llen(&self.key).await
    }

    pub async fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub fn capacity(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_add_truncates_to_size() {
        let history = History::new(Arc::new(MemoryStore::new()), "test.", 3);
        assert!(history.is_empty().await.unwrap());

        for version in ["1.0", "1.1", "1.2", "1.3"] {
            history.add("foo", version).await.unwrap();
        }

        assert_eq!(history.len().await.unwrap(), 3);
        assert_eq!(
            history.all().await.unwrap(),
            ["foo/1.3", "foo/1.2", "foo/1.1"]
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = Arc::new(MemoryStore::new());
        let history = History::new(store.clone(), "test.", 20);
        history.add("foo", "1.0").await.unwrap();
        history.add("bar", "2.0").await.unwrap();
        history.add("foo", "1.0").await.unwrap();

        history.remove("foo", "1.0").await.unwrap();
        assert_eq!(history.all().await.unwrap(), ["bar/2.0"]);
        assert_eq!(store.llen("test.history").await.unwrap(), 1);
    }
}
