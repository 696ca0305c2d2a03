use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IndexResult;
use crate::model::Metadata;
use crate::storage::Distribution;

/// Distribution filename mapped to the path it can be downloaded from.
pub type VersionListing = BTreeMap<String, String>;

/// Which index a download request was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Local,
    Remote,
}

/// Package index capability set
///
/// One interface covers local, remote and combined indexes. Operations an
/// index cannot perform fail with [`IndexError::Unsupported`] rather than
/// silently doing nothing.
///
/// [`IndexError::Unsupported`]: crate::error::IndexError::Unsupported
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Names of hosted projects
    async fn get_projects(&self) -> IndexResult<Vec<String>>;

    /// Available distributions for a project; empty when none are known
    async fn get_versions(&self, name: &str) -> IndexResult<VersionListing>;

    /// Metadata for a project version
    async fn get_metadata(&self, name: &str, version: &str) -> IndexResult<Option<Metadata>>;

    /// Distribution content. `origin` is the routing hint of the request;
    /// single-source indexes ignore it.
    async fn get_distribution(&self, location: &str, origin: Origin)
        -> IndexResult<Distribution>;

    /// Remove every trace of a project version
    async fn remove_version(&self, name: &str, version: &str) -> IndexResult<()>;

    /// At minimum, `name` and `version` must be present
    async fn validate_metadata(&self, metadata: &Metadata) -> IndexResult<bool>;

    /// Store and register an uploaded distribution
    async fn upload_distribution(&self, filename: &str, data: Bytes) -> IndexResult<Metadata>;
}
