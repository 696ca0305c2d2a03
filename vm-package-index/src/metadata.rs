//! Metadata extraction from uploaded distributions.
//!
//! Source distributions carry a `PKG-INFO` file in RFC 822 format. Header
//! names are turned into snake_case keys; headers that may repeat are
//! collected into lists under plural keys.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde_json::Value;
use tar::Archive;
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::model::Metadata;

const PKG_INFO: &str = "PKG-INFO";

/// Headers that may appear more than once, and the list key they fill.
const MULTI_VALUED: &[(&str, &str)] = &[
    ("platform", "platforms"),
    ("supported-platform", "supported_platforms"),
    ("classifier", "classifiers"),
    ("requires", "requires"),
    ("provides", "provides"),
    ("obsoletes", "obsoletes"),
    ("requires-dist", "requires_dist"),
    ("provides-dist", "provides_dist"),
    ("obsoletes-dist", "obsoletes_dist"),
    ("requires-external", "requires_external"),
    ("provides-extra", "provides_extra"),
    ("project-url", "project_urls"),
];

/// Reads declared package metadata out of a stored distribution.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> IndexResult<Metadata>;
}

/// Extractor for gzipped tar source distributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdistMetadataExtractor;

#[async_trait]
impl MetadataExtractor for SdistMetadataExtractor {
    async fn extract(&self, path: &Path) -> IndexResult<Metadata> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if !(filename.ends_with(".tar.gz") || filename.ends_with(".tgz")) {
            return Err(IndexError::BadRequest(format!(
                "{filename}: unsupported distribution format"
            )));
        }

        let path = path.to_path_buf();
        let pkg_info = tokio::task::spawn_blocking(move || read_pkg_info(&path))
            .await
            .map_err(|e| IndexError::Internal(format!("Metadata extraction failed: {e}")))??;

        debug!(filename = %filename, "Parsed PKG-INFO");
        Ok(parse_pkg_info(&pkg_info))
    }
}

/// Contents of the shallowest `PKG-INFO` in a `.tar.gz` archive.
///
/// A damaged archive or a non-UTF-8 `PKG-INFO` is the uploader's fault and
/// is reported as a bad request; only opening the stored file is an I/O error.
fn read_pkg_info(path: &Path) -> IndexResult<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let invalid = |e: std::io::Error| {
        IndexError::BadRequest(format!("{}: unreadable distribution: {e}", path.display()))
    };

    let mut best: Option<(usize, String)> = None;
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let entry_path = entry.path().map_err(invalid)?.into_owned();
        if entry_path.file_name().and_then(|name| name.to_str()) != Some(PKG_INFO) {
            continue;
        }
        let depth = entry_path.components().count();
        if best.as_ref().is_some_and(|(best_depth, _)| *best_depth <= depth) {
            continue;
        }
        let mut contents = String::new();
        entry.read_to_string(&mut contents).map_err(invalid)?;
        best = Some((depth, contents));
    }

    best.map(|(_, contents)| contents).ok_or_else(|| {
        IndexError::BadRequest(format!(
            "{}: no {PKG_INFO} found in distribution",
            path.display()
        ))
    })
}

fn header_key(header: &str) -> String {
    header.trim().to_lowercase().replace('-', "_")
}

/// Parse `PKG-INFO` headers (with continuation lines) and body.
pub fn parse_pkg_info(text: &str) -> Metadata {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut lines = text.lines();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push('\n');
                value.push_str(line.trim_start().trim_start_matches('|'));
            }
            continue;
        }
        if let Some((header, value)) = line.split_once(':') {
            fields.push((header.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    body_lines.extend(lines);

    let mut metadata = Metadata::new();
    for (header, value) in fields {
        match MULTI_VALUED.iter().find(|(name, _)| *name == header) {
            Some((_, key)) => {
                let mut values = match metadata.get(key) {
                    Some(Value::Array(values)) => values.clone(),
                    _ => Vec::new(),
                };
                values.push(Value::String(value));
                metadata.insert(*key, Value::Array(values));
            }
            None => {
                metadata.insert(header_key(&header), value);
            }
        }
    }

    let body = body_lines.join("\n");
    let body = body.trim();
    if !body.is_empty() && !metadata.contains_key("description") {
        metadata.insert("description", body);
    }
    metadata
}
