//! # Remote Index
//!
//! Read-only proxy for an upstream "simple" index. A listing request fetches
//! `{index_url}/{name}`, classifies every anchor on the page and follows
//! `rel="download"` links to further pages, up to a fixed depth. The crawl
//! runs as an explicit stack of pages so link order is preserved without
//! recursion.
//!
//! [`CachedRemoteIndex`] wraps the crawler with a two-tier TTL cache for
//! listings and permanent file caching for distributions.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{IndexError, IndexResult};
use crate::index::{Origin, PackageIndex, VersionListing};
use crate::model::Metadata;
use crate::storage::{sniff_content_type, Distribution};

pub mod cache;
pub mod client;
pub mod links;
pub mod location;

pub use cache::CachedRemoteIndex;
pub use client::{UpstreamClient, UpstreamRedirect, UpstreamResponse};
pub use links::{extract_anchors, version_links, Anchor, VersionLink};
pub use location::{build_remote_path, request_location, resolve_remote_path};

/// A fetched listing page whose links are still being processed.
struct CrawlFrame {
    links: VecDeque<VersionLink>,
    location: String,
    depth: u32,
}

pub struct RemoteIndex {
    client: UpstreamClient,
    index_url: String,
    max_depth: u32,
}

impl RemoteIndex {
    pub fn new(client: UpstreamClient, index_url: impl Into<String>, max_depth: u32) -> Self {
        Self {
            client,
            index_url: index_url.into(),
            max_depth,
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    async fn fetch_page(&self, url: &str, name: &str, depth: u32) -> IndexResult<CrawlFrame> {
        info!(package = %name, url = %url, depth, "Getting remote version listing");

        let response = self.client.get(url).await.inspect_err(|e| {
            info!(package = %name, url = %url, error = %e, "Remote version listing not found");
        })?;

        let location = request_location(url, response.redirect_locations());
        debug!(package = %name, location = %location, "Index location was");

        Ok(CrawlFrame {
            links: version_links(&response.text(), name).into(),
            location,
            depth,
        })
    }

    /// Crawl the listing for `name`, following download links depth-first.
    ///
    /// The first occurrence of a filename wins. Download links are followed
    /// from pages up to `max_depth` deep (the project page is depth 0), so the
    /// deepest page fetched is at `max_depth + 1`. Followed pages that cannot
    /// be fetched are skipped; only a failure on the project page itself is an
    /// error.
    async fn crawl(&self, name: &str) -> IndexResult<VersionListing> {
        let url = format!("{}/{}", self.index_url.trim_end_matches('/'), name);
        let mut stack = vec![self.fetch_page(&url, name, 0).await?];
        let mut listing = VersionListing::new();

        while let Some(frame) = stack.last_mut() {
            let Some(link) = frame.links.pop_front() else {
                stack.pop();
                continue;
            };

            match link {
                VersionLink::Direct { filename, href } => {
                    match build_remote_path(&href, &frame.location) {
                        Ok(path) => {
                            listing.entry(filename).or_insert(path);
                        }
                        Err(e) => warn!(href = %href, error = %e, "Skipping unusable link"),
                    }
                }
                VersionLink::Recursive { href } => {
                    if frame.depth > self.max_depth {
                        info!(href = %href, "Reached maximum depth; not spidering");
                        continue;
                    }
                    let depth = frame.depth + 1;
                    let target = match Url::parse(&frame.location).and_then(|base| base.join(&href)) {
                        Ok(target) => target.to_string(),
                        Err(e) => {
                            warn!(href = %href, error = %e, "Skipping unusable link");
                            continue;
                        }
                    };
                    info!(href = %target, "Spidering");
                    match self.fetch_page(&target, name, depth).await {
                        Ok(next) => stack.push(next),
                        Err(e @ IndexError::NotFound { .. }) => {
                            debug!(href = %target, error = %e, "Unable to spider");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        debug!(package = %name, count = listing.len(), "Obtained remote version listing");
        Ok(listing)
    }

    /// Fetch a distribution from a `/remote` path or an absolute URL.
    async fn fetch_distribution(&self, location: &str) -> IndexResult<Distribution> {
        info!(location = %location, "Getting remote distribution");
        let url = resolve_remote_path(location)?;

        let response = self.client.get(&url).await.inspect_err(|e| {
            info!(location = %location, error = %e, "Distribution not found");
        })?;

        // content is binary; never log it
        let content_type = response
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| sniff_content_type(&response.body).to_string());
        Ok(Distribution {
            data: response.body,
            content_type,
        })
    }
}

#[async_trait]
impl PackageIndex for RemoteIndex {
    async fn get_projects(&self) -> IndexResult<Vec<String>> {
        Err(IndexError::Unsupported("get_projects"))
    }

    async fn get_versions(&self, name: &str) -> IndexResult<VersionListing> {
        self.crawl(name).await
    }

    async fn get_metadata(&self, _name: &str, _version: &str) -> IndexResult<Option<Metadata>> {
        Ok(None)
    }

    async fn get_distribution(&self, location: &str, _origin: Origin) -> IndexResult<Distribution> {
        self.fetch_distribution(location).await
    }

    async fn remove_version(&self, _name: &str, _version: &str) -> IndexResult<()> {
        Err(IndexError::Unsupported("remove_version"))
    }

    async fn validate_metadata(&self, _metadata: &Metadata) -> IndexResult<bool> {
        Err(IndexError::Unsupported("validate_metadata"))
    }

    async fn upload_distribution(&self, _filename: &str, _data: Bytes) -> IndexResult<Metadata> {
        Err(IndexError::Unsupported("upload_distribution"))
    }
}
