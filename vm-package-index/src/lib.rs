//! # Package Index Engine
//!
//! The engine behind a Python package index server that merges locally
//! uploaded releases with a caching, crawling proxy for an upstream index.
//!
//! ## Features
//!
//! - **Local registry**: uploads are validated against their own metadata,
//!   stored on disk and registered in a key-value store
//! - **Upstream proxy**: listing pages are crawled with bounded depth and
//!   cached with a freshness window and stale-on-error fallback
//! - **Version heuristics**: filename parsing, version ordering and
//!   pre-release classification shared by every component
//!
//! ## Key Modules
//!
//! - [`combined`]: the index the presentation layer talks to
//! - [`local`]: uploads, removals and rebuilds of hosted projects
//! - [`remote`]: upstream crawler and its cache
//! - [`storage`]: release/pre-release partitioned distribution files
//! - [`store`]: key-value store abstraction (in-memory or Redis)
//! - [`versions`]: filename and version utilities
//! - [`config`], [`state`], [`error`]: settings, wiring and error taxonomy
//!
//! The HTTP layer, authentication and logging setup are left to the
//! embedding application.

pub mod combined;
pub mod config;
pub mod error;
pub mod history;
pub mod index;
pub mod local;
pub mod metadata;
pub mod model;
pub mod remote;
pub mod state;
pub mod storage;
pub mod store;
pub mod versions;

pub use combined::CombinedIndex;
pub use config::IndexConfig;
pub use error::{ErrorCode, IndexError, IndexResult};
pub use history::History;
pub use index::{Origin, PackageIndex, VersionListing};
pub use local::{LocalIndex, RebuildReport};
pub use metadata::{MetadataExtractor, SdistMetadataExtractor};
pub use model::{Metadata, ProjectRegistry};
pub use remote::{CachedRemoteIndex, RemoteIndex, UpstreamClient};
pub use state::IndexState;
pub use storage::{Distribution, DistributionStorage};
pub use store::{KeyTtl, KeyValueStore, MemoryStore};
