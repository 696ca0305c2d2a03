//! Common test utilities and helpers
//!
//! Shared setup for the integration tests: temporary storage directories, an
//! engine wired to an in-memory store, and real source distribution fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vm_package_index::metadata::SdistMetadataExtractor;
use vm_package_index::{IndexConfig, IndexState, MemoryStore};

pub const KEY_PREFIX: &str = "test.";

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub state: IndexState,
}

/// Settings rooted in `temp_dir` and pointing at `index_url`.
pub fn test_config(temp_dir: &TempDir, index_url: &str) -> IndexConfig {
    let mut config = IndexConfig::default();
    config.remote.index_url = index_url.to_string();
    config.remote.timeout_secs = 5;
    config.storage.local_dir = temp_dir.path().join("local");
    config.storage.remote_dir = temp_dir.path().join("remote");
    config.store.key_prefix = KEY_PREFIX.to_string();
    config
}

/// Creates an engine over temporary directories and a fresh in-memory store.
pub fn create_test_setup(index_url: &str) -> Result<TestSetup> {
    create_test_setup_with(index_url, |_| {})
}

/// Like [`create_test_setup`], with a hook to adjust the settings.
pub fn create_test_setup_with(
    index_url: &str,
    adjust: impl FnOnce(&mut IndexConfig),
) -> Result<TestSetup> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir, index_url);
    adjust(&mut config);

    let state = IndexState::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(SdistMetadataExtractor),
    )?;
    Ok(TestSetup { temp_dir, state })
}

/// A gzipped tar source distribution declaring `name` and `version`.
pub fn make_sdist(name: &str, version: &str) -> Result<Vec<u8>> {
    let pkg_info = format!(
        "Metadata-Version: 1.1\nName: {name}\nVersion: {version}\nSummary: Test package\nClassifier: Development Status :: 4 - Beta\n"
    );

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in [
        (format!("{name}-{version}/PKG-INFO"), pkg_info.as_bytes()),
        (format!("{name}-{version}/setup.py"), b"from setuptools import setup\n".as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_path(&path)?;
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data)?;
    }
    Ok(builder.into_inner()?.finish()?)
}

/// The `base` query value for a mock server URI.
pub fn quoted_base(uri: &str) -> String {
    url::form_urlencoded::byte_serialize(uri.as_bytes()).collect()
}
