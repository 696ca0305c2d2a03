//! Project registry backing the local index.
//!
//! Projects, their versions and per-version metadata live in the key-value
//! store under a fixed layout:
//!
//! ```text
//! <prefix>local                      set of project names
//! <prefix>local.<name>               set of version strings
//! <prefix>local.<name>-<version>     JSON metadata
//! ```
//!
//! Updates touch several keys without a transaction. Readers tolerate the
//! transient states a concurrent removal can leave behind (a project with no
//! versions, a version with no metadata) by reporting them as absent.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::store::KeyValueStore;
use crate::versions::name_match;

/// Key under which the stored distribution filename is recorded.
pub const FILENAME_KEY: &str = "_filename";

/// Key under which the upload time (seconds since the epoch) is recorded.
pub const UPLOADED_TIMESTAMP_KEY: &str = "_uploaded_timestamp";

/// Flat metadata map for one version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.get_str("version")
    }

    /// Stored filename; only set once a distribution was uploaded.
    pub fn filename(&self) -> Option<&str> {
        self.get_str(FILENAME_KEY)
    }

    pub fn is_complete(&self) -> bool {
        self.contains_key(FILENAME_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Metadata {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Repository over the project/version/metadata keys.
#[derive(Clone)]
pub struct ProjectRegistry {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ProjectRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn projects_key(&self) -> String {
        format!("{}local", self.prefix)
    }

    fn versions_key(&self, name: &str) -> String {
        format!("{}local.{}", self.prefix, name)
    }

    fn metadata_key(&self, name: &str, version: &str) -> String {
        format!("{}local.{}-{}", self.prefix, name, version)
    }

    /// All hosted project names, sorted.
    pub async fn list_projects(&self) -> IndexResult<Vec<String>> {
        self.store.smembers(&self.projects_key()).await
    }

    /// Find the registered spelling of a project name.
    ///
    /// Tries the exact name first, then any project whose name matches
    /// ignoring case and `_`/`-` differences.
    pub async fn resolve_project(&self, name: &str) -> IndexResult<Option<String>> {
        if self.store.sismember(&self.projects_key(), name).await? {
            return Ok(Some(name.to_string()));
        }
        let found = self
            .list_projects()
            .await?
            .into_iter()
            .find(|project| name_match(project, name));
        Ok(found)
    }

    /// Version strings registered for a project, sorted.
    pub async fn list_versions(&self, name: &str) -> IndexResult<Vec<String>> {
        self.store.smembers(&self.versions_key(name)).await
    }

    pub async fn version_count(&self, name: &str) -> IndexResult<usize> {
        self.store.scard(&self.versions_key(name)).await
    }

    /// Complete metadata for a version, or `None`.
    ///
    /// Records missing from the project or version sets, and records without
    /// a stored filename, are reported as absent.
    pub async fn get_metadata(&self, name: &str, version: &str) -> IndexResult<Option<Metadata>> {
        if !self.store.sismember(&self.projects_key(), name).await? {
            return Ok(None);
        }
        if !self.store.sismember(&self.versions_key(name), version).await? {
            return Ok(None);
        }
        let Some(raw) = self.store.get(&self.metadata_key(name, version)).await? else {
            debug!(package = %name, version = %version, "No metadata found");
            return Ok(None);
        };
        let metadata: Metadata = serde_json::from_str(&raw)?;
        if !metadata.is_complete() {
            debug!(package = %name, version = %version, "Incomplete metadata");
            return Ok(None);
        }
        Ok(Some(metadata))
    }

    /// Register a project, a version and its metadata.
    pub async fn add_metadata(&self, metadata: &Metadata) -> IndexResult<()> {
        let (Some(name), Some(version)) = (metadata.name(), metadata.version()) else {
            return Err(IndexError::BadRequest(
                "Metadata requires both name and version".to_string(),
            ));
        };
        debug!(package = %name, version = %version, "Saving metadata");

        self.store.sadd(&self.projects_key(), name).await?;
        self.store.sadd(&self.versions_key(name), version).await?;
        self.store
            .set(
                &self.metadata_key(name, version),
                &serde_json::to_string(metadata)?,
            )
            .await?;
        Ok(())
    }

    /// Remove a version's metadata, and the project once it has no versions.
    pub async fn remove_metadata(&self, name: &str, version: &str) -> IndexResult<()> {
        debug!(package = %name, version = %version, "Removing metadata");
        self.store.delete(&self.metadata_key(name, version)).await?;
        self.store.srem(&self.versions_key(name), version).await?;

        if self.version_count(name).await? == 0 {
            self.store.delete(&self.versions_key(name)).await?;
            self.store.srem(&self.projects_key(), name).await?;
        }
        Ok(())
    }
}
