//! # Index State
//!
//! Composition root for the engine. [`IndexState`] builds every service once
//! from an [`IndexConfig`] and hands out shared handles; there is no global
//! state, so several independent engines can live in one process (tests do
//! exactly that).
//!
//! ```rust,no_run
//! # async fn example() -> vm_package_index::error::IndexResult<()> {
//! use vm_package_index::{IndexConfig, IndexState, PackageIndex};
//!
//! let state = IndexState::open(IndexConfig::from_env()?).await?;
//! let listing = state.index.get_versions("requests").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::combined::CombinedIndex;
use crate::config::IndexConfig;
use crate::error::IndexResult;
use crate::history::History;
use crate::local::LocalIndex;
use crate::metadata::{MetadataExtractor, SdistMetadataExtractor};
use crate::model::ProjectRegistry;
use crate::remote::{CachedRemoteIndex, RemoteIndex, UpstreamClient};
use crate::storage::DistributionStorage;
use crate::store::{KeyValueStore, MemoryStore};

/// Shared handles to every engine service.
#[derive(Clone)]
pub struct IndexState {
    pub config: Arc<IndexConfig>,
    pub store: Arc<dyn KeyValueStore>,
    pub local: Arc<LocalIndex>,
    pub remote: Arc<CachedRemoteIndex>,
    pub index: Arc<CombinedIndex>,
}

impl IndexState {
    /// Wire the engine around an existing store and metadata extractor.
    pub fn new(
        config: IndexConfig,
        store: Arc<dyn KeyValueStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> IndexResult<Self> {
        config.validate()?;
        let prefix = config.store.key_prefix.as_str();

        let history = Arc::new(History::new(store.clone(), prefix, config.history.size));
        let local = Arc::new(LocalIndex::new(
            DistributionStorage::new(&config.storage.local_dir),
            ProjectRegistry::new(store.clone(), prefix),
            history,
            extractor,
            config.max_upload_size_bytes(),
        ));

        let client = UpstreamClient::from_config(&config.remote)?;
        let remote = Arc::new(CachedRemoteIndex::new(
            RemoteIndex::new(client, config.remote.index_url.clone(), config.remote.max_depth),
            store.clone(),
            DistributionStorage::new(&config.storage.remote_dir),
            prefix,
            config.remote.long_ttl(),
            config.remote.short_ttl(),
        ));

        let index = Arc::new(CombinedIndex::new(local.clone(), remote.clone()));

        info!(
            index_url = %config.remote.index_url,
            local_dir = %config.storage.local_dir.display(),
            remote_dir = %config.storage.remote_dir.display(),
            "Package index ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            local,
            remote,
            index,
        })
    }

    /// Build the engine with the configured store and the sdist extractor.
    ///
    /// A Redis URL is honored when the `redis-store` feature is enabled;
    /// otherwise the in-memory store is used.
    pub async fn open(config: IndexConfig) -> IndexResult<Self> {
        let store = open_store(&config).await?;
        Self::new(config, store, Arc::new(SdistMetadataExtractor))
    }
}

async fn open_store(config: &IndexConfig) -> IndexResult<Arc<dyn KeyValueStore>> {
    match config.store.redis_url.as_deref() {
        #[cfg(feature = "redis-store")]
        Some(url) => Ok(Arc::new(crate::store::RedisStore::connect(url).await?)),
        #[cfg(not(feature = "redis-store"))]
        Some(url) => {
            tracing::warn!(url = %url, "Redis support not compiled in; using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
