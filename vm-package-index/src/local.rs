//! # Local Index
//!
//! Uploaded distributions: validated, stored in [`DistributionStorage`],
//! registered in the [`ProjectRegistry`] and logged to [`History`].
//!
//! ## Upload flow
//!
//! 1. Sanitize the filename and reject duplicates with a conflict
//! 2. Write the blob (metadata extraction needs a real file)
//! 3. Extract, validate and cross-check metadata against the filename
//! 4. Stamp `_filename` and `_uploaded_timestamp`, then register and log
//!
//! Any failure after step 2 removes the written blob before the error
//! propagates. Storage is written before the registry, so a crash leaves at
//! worst an orphaned blob, never a registry entry without content.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::history::History;
use crate::index::{Origin, PackageIndex, VersionListing};
use crate::metadata::MetadataExtractor;
use crate::model::{Metadata, ProjectRegistry, FILENAME_KEY, UPLOADED_TIMESTAMP_KEY};
use crate::storage::{base_name, secure_filename, Distribution, DistributionStorage};
use crate::versions::{name_match, parse_name_and_version};

/// Path prefix under which local distributions are served.
pub const LOCAL_PATH_PREFIX: &str = "/local/";

/// Outcome of [`LocalIndex::rebuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// `name/version` of every re-registered distribution
    pub registered: Vec<String>,
    pub failed: Vec<RebuildFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildFailure {
    pub filename: String,
    pub error: String,
}

/// A freshly written blob that is removed again unless committed.
struct PendingBlob<'a> {
    storage: &'a DistributionStorage,
    filename: &'a str,
    armed: bool,
}

impl<'a> PendingBlob<'a> {
    fn new(storage: &'a DistributionStorage, filename: &'a str) -> Self {
        Self {
            storage,
            filename,
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingBlob<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(filename = %self.filename, "Removing uploaded file on error");
            self.storage.remove_blocking(self.filename);
        }
    }
}

pub struct LocalIndex {
    storage: DistributionStorage,
    projects: ProjectRegistry,
    history: Arc<History>,
    extractor: Arc<dyn MetadataExtractor>,
    max_upload_size: usize,
}

impl LocalIndex {
    pub fn new(
        storage: DistributionStorage,
        projects: ProjectRegistry,
        history: Arc<History>,
        extractor: Arc<dyn MetadataExtractor>,
        max_upload_size: usize,
    ) -> Self {
        Self {
            storage,
            projects,
            history,
            extractor,
            max_upload_size,
        }
    }

    pub fn storage(&self) -> &DistributionStorage {
        &self.storage
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Re-register every stored distribution from its own metadata.
    ///
    /// Registry entries whose blob has disappeared are left in place.
    pub async fn rebuild(&self) -> IndexResult<RebuildReport> {
        info!(base_dir = %self.storage.base_dir().display(), "Rebuilding local index");
        let mut report = RebuildReport::default();

        for path in self.storage.list().await? {
            let filename = base_name(&path.to_string_lossy()).to_string();
            let result = match self.checked_metadata(&path, &filename).await {
                Ok(metadata) => self.projects.add_metadata(&metadata).await.map(|()| metadata),
                Err(e) => Err(e),
            };
            match result {
                Ok(metadata) => {
                    debug!(filename = %filename, "Re-registered distribution");
                    report.registered.push(format!(
                        "{}/{}",
                        metadata.name().unwrap_or_default(),
                        metadata.version().unwrap_or_default()
                    ));
                }
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Unable to re-register distribution");
                    report.failed.push(RebuildFailure {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "Rebuilt local index"
        );
        Ok(report)
    }

    /// Extract metadata for a stored blob and check it against its filename.
    async fn checked_metadata(&self, path: &Path, filename: &str) -> IndexResult<Metadata> {
        debug!(filename = %filename, "Parsing distribution for metadata");
        let mut metadata = self.extractor.extract(path).await?;

        if !self.validate_metadata(&metadata).await? {
            return Err(IndexError::BadRequest(format!(
                "{filename}: metadata must declare a name and version"
            )));
        }
        if metadata.contains_key(FILENAME_KEY) {
            return Err(IndexError::BadRequest(format!(
                "{filename}: metadata must not declare {FILENAME_KEY}"
            )));
        }

        let (expected_name, expected_version) = parse_name_and_version(filename)?;
        let name = metadata.name().unwrap_or_default();
        let version = metadata.version().unwrap_or_default();
        if !name_match(name, &expected_name) || version != expected_version {
            warn!(
                filename = %filename,
                package = %name,
                version = %version,
                "Conflicting filename and metadata"
            );
            return Err(IndexError::BadRequest(format!(
                "{filename}: filename does not match declared {name} {version}"
            )));
        }

        metadata.insert(FILENAME_KEY, filename);
        metadata.insert(UPLOADED_TIMESTAMP_KEY, upload_timestamp());
        Ok(metadata)
    }
}

/// Seconds since the epoch, with sub-second precision.
fn upload_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[async_trait]
impl PackageIndex for LocalIndex {
    async fn get_projects(&self) -> IndexResult<Vec<String>> {
        info!("Getting local projects");
        let projects = self.projects.list_projects().await?;
        debug!(count = projects.len(), "Obtained local projects");
        Ok(projects)
    }

    async fn get_versions(&self, name: &str) -> IndexResult<VersionListing> {
        info!(package = %name, "Getting local versions listing");
        let mut listing = VersionListing::new();

        let Some(project) = self.projects.resolve_project(name).await? else {
            return Ok(listing);
        };
        for version in self.projects.list_versions(&project).await? {
            let Some(metadata) = self.projects.get_metadata(&project, &version).await? else {
                continue;
            };
            if let Some(filename) = metadata.filename() {
                listing.insert(filename.to_string(), format!("{LOCAL_PATH_PREFIX}{filename}"));
            }
        }

        debug!(package = %name, count = listing.len(), "Obtained local versions listing");
        Ok(listing)
    }

    async fn get_metadata(&self, name: &str, version: &str) -> IndexResult<Option<Metadata>> {
        info!(package = %name, version = %version, "Getting local metadata");
        match self.projects.resolve_project(name).await? {
            Some(project) => self.projects.get_metadata(&project, version).await,
            None => Ok(None),
        }
    }

    async fn get_distribution(&self, location: &str, _origin: Origin) -> IndexResult<Distribution> {
        info!(location = %location, "Getting local distribution");
        // content is binary; never log it
        self.storage.read(location).await?.ok_or_else(|| {
            info!(location = %location, "Distribution not found");
            IndexError::not_found(format!("Distribution not found: {location}"))
        })
    }

    async fn remove_version(&self, name: &str, version: &str) -> IndexResult<()> {
        info!(package = %name, version = %version, "Removing version");

        let project = self.projects.resolve_project(name).await?;
        let metadata = match &project {
            Some(project) => self.projects.get_metadata(project, version).await?,
            None => None,
        };
        let (Some(project), Some(metadata)) = (project, metadata) else {
            info!(package = %name, version = %version, "Version not found");
            return Err(IndexError::not_found(format!(
                "Version not found: {name} {version}"
            )));
        };

        if let Some(filename) = metadata.filename() {
            if !self.storage.remove(filename).await {
                warn!(filename = %filename, "Distribution file was already gone");
            }
        }
        self.projects.remove_metadata(&project, version).await?;
        self.history.remove(&project, version).await?;
        Ok(())
    }

    async fn validate_metadata(&self, metadata: &Metadata) -> IndexResult<bool> {
        debug!("Validating metadata");
        Ok(["name", "version"]
            .iter()
            .all(|required| metadata.contains_key(required)))
    }

    async fn upload_distribution(&self, filename: &str, data: Bytes) -> IndexResult<Metadata> {
        if data.len() > self.max_upload_size {
            return Err(IndexError::UploadTooLarge {
                size: data.len(),
                max: self.max_upload_size,
            });
        }

        let filename = secure_filename(filename);
        if filename.is_empty() {
            return Err(IndexError::BadRequest("Missing upload filename".to_string()));
        }
        // content is binary; never log it
        info!(filename = %filename, size = data.len(), "Uploading distribution");

        if self.storage.exists(&filename).await {
            warn!(filename = %filename, "Aborting upload; already exists");
            return Err(IndexError::Conflict(format!(
                "Distribution already exists: {filename}"
            )));
        }

        // armed before the write so a partially written file is removed too
        let pending = PendingBlob::new(&self.storage, &filename);
        let path = self.storage.write(&filename, &data).await?;

        let metadata = self.checked_metadata(&path, &filename).await?;
        self.projects.add_metadata(&metadata).await?;
        pending.commit();

        let name = metadata.name().unwrap_or_default();
        let version = metadata.version().unwrap_or_default();
        self.history.add(name, version).await?;

        info!(package = %name, version = %version, "Uploaded distribution");
        Ok(metadata)
    }
}
