//! Caching layer over [`RemoteIndex`].
//!
//! Listings are stored as JSON under `<prefix>remote.<name>` with the long
//! TTL. An entry older than the short TTL is stale: it triggers a refresh,
//! but is still served when the refresh fails for a transient reason. A
//! definitive upstream 404 is cached as an empty listing.
//!
//! Distribution files never change once published, so they are kept in
//! remote storage without expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::RemoteIndex;
use crate::error::IndexResult;
use crate::index::{Origin, PackageIndex, VersionListing};
use crate::model::Metadata;
use crate::storage::{base_name, Distribution, DistributionStorage};
use crate::store::{KeyTtl, KeyValueStore};

/// Whether an entry with the given remaining TTL has outlived `short_ttl`.
///
/// Missing and non-expiring keys are never stale.
pub fn is_stale(ttl: KeyTtl, long_ttl: Duration, short_ttl: Duration) -> bool {
    match ttl {
        KeyTtl::Missing | KeyTtl::Persistent => false,
        KeyTtl::Expires(remaining) => long_ttl.saturating_sub(remaining) >= short_ttl,
    }
}

/// Storage name for a distribution location: its basename without query or
/// fragment.
fn cache_name(location: &str) -> &str {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    base_name(path)
}

pub struct CachedRemoteIndex {
    remote: RemoteIndex,
    store: Arc<dyn KeyValueStore>,
    storage: DistributionStorage,
    prefix: String,
    long_ttl: Duration,
    short_ttl: Duration,
}

impl CachedRemoteIndex {
    pub fn new(
        remote: RemoteIndex,
        store: Arc<dyn KeyValueStore>,
        storage: DistributionStorage,
        prefix: impl Into<String>,
        long_ttl: Duration,
        short_ttl: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            storage,
            prefix: prefix.into(),
            long_ttl,
            short_ttl,
        }
    }

    pub fn storage(&self) -> &DistributionStorage {
        &self.storage
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}remote.{}", self.prefix, name)
    }

    /// Cached listing and whether it is stale.
    pub async fn cached_listing(&self, name: &str) -> IndexResult<Option<(VersionListing, bool)>> {
        let key = self.key(name);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let listing: VersionListing = match serde_json::from_str(&raw) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(package = %name, error = %e, "Ignoring unreadable cached listing");
                return Ok(None);
            }
        };
        let ttl = self.store.ttl(&key).await?;
        Ok(Some((listing, is_stale(ttl, self.long_ttl, self.short_ttl))))
    }

    pub async fn save_listing(&self, name: &str, listing: &VersionListing) -> IndexResult<()> {
        debug!(package = %name, count = listing.len(), "Caching versions listing");
        self.store
            .set_ex(&self.key(name), &serde_json::to_string(listing)?, self.long_ttl)
            .await
    }

    pub async fn save_negative(&self, name: &str) -> IndexResult<()> {
        debug!(package = %name, "Caching negative versions listing");
        self.save_listing(name, &VersionListing::new()).await
    }
}

#[async_trait]
impl PackageIndex for CachedRemoteIndex {
    async fn get_projects(&self) -> IndexResult<Vec<String>> {
        self.remote.get_projects().await
    }

    async fn get_versions(&self, name: &str) -> IndexResult<VersionListing> {
        info!(package = %name, "Checking for cached versions listing");
        let cached = self.cached_listing(name).await?;

        if let Some((listing, false)) = &cached {
            debug!(package = %name, "Found fresh cached versions listing");
            return Ok(listing.clone());
        }

        match self.remote.get_versions(name).await {
            Ok(listing) => {
                self.save_listing(name, &listing).await?;
                Ok(listing)
            }
            Err(e) if e.is_definitive_not_found() => {
                self.save_negative(name).await?;
                Err(e)
            }
            Err(e) => match cached {
                Some((listing, _)) => {
                    warn!(package = %name, error = %e, "Upstream unavailable; serving stale versions listing");
                    Ok(listing)
                }
                None => {
                    warn!(package = %name, error = %e, "Unexpected error querying remote versions listing");
                    Err(e)
                }
            },
        }
    }

    async fn get_metadata(&self, name: &str, version: &str) -> IndexResult<Option<Metadata>> {
        self.remote.get_metadata(name, version).await
    }

    async fn get_distribution(&self, location: &str, origin: Origin) -> IndexResult<Distribution> {
        let name = cache_name(location);
        if let Some(cached) = self.storage.read(name).await? {
            debug!(location = %location, "Found cached distribution");
            return Ok(cached);
        }

        let distribution = self.remote.get_distribution(location, origin).await?;
        if name.is_empty() {
            return Ok(distribution);
        }
        debug!(location = %location, "Caching distribution");
        if let Err(e) = self.storage.write(name, &distribution.data).await {
            warn!(location = %location, error = %e, "Unable to cache distribution");
        }
        Ok(distribution)
    }

    async fn remove_version(&self, name: &str, version: &str) -> IndexResult<()> {
        self.remote.remove_version(name, version).await
    }

    async fn validate_metadata(&self, metadata: &Metadata) -> IndexResult<bool> {
        self.remote.validate_metadata(metadata).await
    }

    async fn upload_distribution(&self, filename: &str, data: Bytes) -> IndexResult<Metadata> {
        self.remote.upload_distribution(filename, data).await
    }
}
