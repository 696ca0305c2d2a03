//! # Distribution Storage
//!
//! File system storage for distribution archives. Blobs are addressed by their
//! (sanitized) filename and partitioned into `releases/` and `pre-releases/`
//! so released distributions are easy to tell apart for backups.
//!
//! ```text
//! <base_dir>/
//!   releases/example-1.0.tar.gz
//!   pre-releases/example-1.1.dev1.tar.gz
//! ```

use std::path::{Path, PathBuf};

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{IndexError, IndexResult};
use crate::versions::is_pre_release;

pub const RELEASE_DIR: &str = "releases";
pub const PRE_RELEASE_DIR: &str = "pre-releases";

/// Raw distribution content together with its sniffed content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub data: Bytes,
    pub content_type: String,
}

/// Release/pre-release partitioned blob store rooted at one directory.
#[derive(Debug, Clone)]
pub struct DistributionStorage {
    base_dir: PathBuf,
    release_dir: PathBuf,
    pre_release_dir: PathBuf,
}

impl DistributionStorage {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        let base_dir = base_dir.into();
        Self {
            release_dir: base_dir.join(RELEASE_DIR),
            pre_release_dir: base_dir.join(PRE_RELEASE_DIR),
            base_dir,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Compute the file system path for a blob name.
    ///
    /// Directory components are discarded; the partition follows the
    /// pre-release classification of the filename. Names whose version cannot
    /// be parsed land in the release partition.
    pub fn compute_path(&self, name: &str) -> PathBuf {
        let filename = base_name(name);
        let pre_release = match is_pre_release(filename) {
            Ok(pre_release) => pre_release,
            Err(e) => {
                debug!(name = %name, error = %e, "Unable to classify distribution; treating as release");
                false
            }
        };
        let dir = if pre_release {
            &self.pre_release_dir
        } else {
            &self.release_dir
        };
        let path = dir.join(filename);
        debug!(name = %name, path = %path.display(), "Computed storage path");
        path
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.compute_path(name))
            .await
            .unwrap_or(false)
    }

    /// Read a blob and sniff its content type. Returns `None` when absent.
    pub async fn read(&self, name: &str) -> IndexResult<Option<Distribution>> {
        let path = self.compute_path(name);
        match fs::read(&path).await {
            Ok(data) => {
                let content_type = sniff_content_type(&data).to_string();
                debug!(name = %name, content_type = %content_type, "Computed content type");
                Ok(Some(Distribution {
                    data: Bytes::from(data),
                    content_type,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(name = %name, "No file exists");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write a blob, creating the partition directories first.
    pub async fn write(&self, name: &str, data: &[u8]) -> IndexResult<PathBuf> {
        self.make_base_dirs().await?;
        let path = self.compute_path(name);
        fs::write(&path, data).await?;
        info!(name = %name, path = %path.display(), size = data.len(), "Wrote distribution file");
        Ok(path)
    }

    /// Remove a blob. A missing file is reported as `false`, not as an error.
    pub async fn remove(&self, name: &str) -> bool {
        let path = self.compute_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name = %name, "Removed distribution file");
                true
            }
            Err(e) => {
                debug!(name = %name, error = %e, "Unable to remove distribution file");
                false
            }
        }
    }

    /// Every stored blob path, in a stable order.
    pub async fn list(&self) -> IndexResult<Vec<PathBuf>> {
        let base_dir = self.base_dir.clone();
        let paths = tokio::task::spawn_blocking(move || {
            WalkDir::new(&base_dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable storage entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| IndexError::Internal(format!("Storage walk failed: {e}")))?;
        Ok(paths)
    }

    /// Blocking removal used by cleanup guards that cannot await.
    pub(crate) fn remove_blocking(&self, name: &str) -> bool {
        let path = self.compute_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                debug!(name = %name, error = %e, "Unable to remove distribution file");
                false
            }
        }
    }

    async fn make_base_dirs(&self) -> IndexResult<()> {
        for dir in [&self.release_dir, &self.pre_release_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Strip directory components (either separator) from a name.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9_.-]")
        .unwrap_or_else(|e| panic!("Failed to compile filename sanitizing regex: {e}"))
});

/// Reduce an uploaded filename to a safe, flat name.
///
/// Path separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are trimmed.
///
/// ```
/// # use vm_package_index::storage::secure_filename;
/// assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
/// assert_eq!(secure_filename("My Package-1.0.tar.gz"), "My_Package-1.0.tar.gz");
/// ```
pub fn secure_filename(filename: &str) -> String {
    let flattened = filename.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Guess a MIME type from the leading bytes of a file.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    const TAR_MAGIC_OFFSET: usize = 257;

    if data.is_empty() {
        return "application/x-empty";
    }
    if data.starts_with(&[0x1f, 0x8b]) {
        return "application/x-gzip";
    }
    if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
        return "application/zip";
    }
    if data.starts_with(b"BZh") {
        return "application/x-bzip2";
    }
    if data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        return "application/x-xz";
    }
    if data.len() > TAR_MAGIC_OFFSET + 5
        && &data[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return "application/x-tar";
    }
    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }

    let head = &data[..data.len().min(1024)];
    let textual = match std::str::from_utf8(head) {
        Ok(text) => text
            .chars()
            .all(|c| !c.is_control() || c.is_ascii_whitespace()),
        // a multi-byte character may be cut at the sniffing boundary
        Err(e) => e.error_len().is_none() && e.valid_up_to() > 0,
    };
    if textual {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compute_path_partitions_by_pre_release() {
        let storage = DistributionStorage::new("/srv/dists");
        assert_eq!(
            storage.compute_path("foo-1.0.tar.gz"),
            PathBuf::from("/srv/dists/releases/foo-1.0.tar.gz")
        );
        assert_eq!(
            storage.compute_path("foo-1.0.dev1.tar.gz"),
            PathBuf::from("/srv/dists/pre-releases/foo-1.0.dev1.tar.gz")
        );
        assert_eq!(
            storage.compute_path("/local/../foo-1.0c1.zip"),
            PathBuf::from("/srv/dists/pre-releases/foo-1.0c1.zip")
        );
        assert_eq!(
            storage.compute_path("README"),
            PathBuf::from("/srv/dists/releases/README")
        );
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DistributionStorage::new(temp_dir.path());

        assert!(!storage.exists("foo-1.0.tar.gz").await);
        assert!(storage.read("foo-1.0.tar.gz").await.unwrap().is_none());

        let gzip = [0x1f, 0x8b, 0x08, 0x00, 0x00];
        let path = storage.write("foo-1.0.tar.gz", &gzip).await.unwrap();
        assert!(path.starts_with(temp_dir.path().join(RELEASE_DIR)));
        assert!(storage.exists("foo-1.0.tar.gz").await);

        let distribution = storage.read("foo-1.0.tar.gz").await.unwrap().unwrap();
        assert_eq!(distribution.data.as_ref(), &gzip);
        assert_eq!(distribution.content_type, "application/x-gzip");

        assert!(storage.remove("foo-1.0.tar.gz").await);
        assert!(!storage.remove("foo-1.0.tar.gz").await);
        assert!(!storage.exists("foo-1.0.tar.gz").await);
    }

    #[tokio::test]
    async fn test_list_walks_both_partitions() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DistributionStorage::new(temp_dir.path());
        assert!(storage.list().await.unwrap().is_empty());

        storage.write("foo-1.0.tar.gz", b"a").await.unwrap();
        storage.write("foo-1.1a1.tar.gz", b"b").await.unwrap();

        let names: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["foo-1.1a1.tar.gz", "foo-1.0.tar.gz"]);
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("foo-1.0.tar.gz"), "foo-1.0.tar.gz");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\dists\\foo-1.0.zip"), "C_dists_foo-1.0.zip");
        assert_eq!(secure_filename("  .hidden "), "hidden");
        assert_eq!(secure_filename("../.."), "");
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(&[0x1f, 0x8b, 0x08]), "application/x-gzip");
        assert_eq!(sniff_content_type(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(sniff_content_type(b"BZh91AY"), "application/x-bzip2");
        assert_eq!(sniff_content_type(b"Metadata-Version: 1.0\n"), "text/plain");
        assert_eq!(sniff_content_type(&[0x00, 0x01, 0x02]), "application/octet-stream");
        assert_eq!(sniff_content_type(b""), "application/x-empty");
    }
}
