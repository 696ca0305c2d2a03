//! Local and remote indexes behind one interface.
//!
//! Local listings mask remote ones for the same project. Metadata and every
//! mutating operation only ever reach the local index.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::IndexResult;
use crate::history::History;
use crate::index::{Origin, PackageIndex, VersionListing};
use crate::local::{LocalIndex, RebuildReport};
use crate::model::Metadata;
use crate::storage::Distribution;
use crate::versions::sort_filenames;

pub struct CombinedIndex {
    local: Arc<LocalIndex>,
    remote: Arc<dyn PackageIndex>,
}

impl CombinedIndex {
    pub fn new(local: Arc<LocalIndex>, remote: Arc<dyn PackageIndex>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &Arc<LocalIndex> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn PackageIndex> {
        &self.remote
    }

    pub fn history(&self) -> &History {
        self.local.history()
    }

    pub async fn rebuild(&self) -> IndexResult<RebuildReport> {
        self.local.rebuild().await
    }

    /// Listing for `name` as `(filename, path)` pairs in version order.
    pub async fn sorted_versions(&self, name: &str) -> IndexResult<Vec<(String, String)>> {
        let mut listing = self.get_versions(name).await?;
        Ok(sort_filenames(listing.keys().cloned())
            .into_iter()
            .filter_map(|filename| {
                let path = listing.remove(&filename)?;
                Some((filename, path))
            })
            .collect())
    }
}

#[async_trait]
impl PackageIndex for CombinedIndex {
    async fn get_projects(&self) -> IndexResult<Vec<String>> {
        self.local.get_projects().await
    }

    async fn get_versions(&self, name: &str) -> IndexResult<VersionListing> {
        let local = self.local.get_versions(name).await?;
        if !local.is_empty() {
            return Ok(local);
        }
        debug!(package = %name, "No local versions; consulting remote index");
        self.remote.get_versions(name).await
    }

    async fn get_metadata(&self, name: &str, version: &str) -> IndexResult<Option<Metadata>> {
        self.local.get_metadata(name, version).await
    }

    async fn get_distribution(&self, location: &str, origin: Origin) -> IndexResult<Distribution> {
        match origin {
            Origin::Local => self.local.get_distribution(location, origin).await,
            Origin::Remote => self.remote.get_distribution(location, origin).await,
        }
    }

    async fn remove_version(&self, name: &str, version: &str) -> IndexResult<()> {
        self.local.remove_version(name, version).await
    }

    async fn validate_metadata(&self, metadata: &Metadata) -> IndexResult<bool> {
        self.local.validate_metadata(metadata).await
    }

    async fn upload_distribution(&self, filename: &str, data: Bytes) -> IndexResult<Metadata> {
        self.local.upload_distribution(filename, data).await
    }
}
