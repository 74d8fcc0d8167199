//! Offline mirroring of websites from the Internet Archive's Wayback Machine.
//!
//! Given a domain or URL, the pipeline discovers every archived capture of
//! that origin through the CDX index, deduplicates the captures down to one
//! snapshot per resource, downloads the snapshots concurrently from the
//! raw-content endpoint, and rewrites HTML/CSS references so the mirror
//! browses correctly from the local filesystem.
//!
//! The stages are exposed as independent modules so they can be driven
//! separately (and tested in isolation):
//!
//! 1. [`cdx`] — paginated CDX index client with rate limiting and retry
//! 2. [`snapshot_index`] — one authoritative timestamp per logical resource
//! 3. [`path_map`] — deterministic URL → filesystem path mapping
//! 4. [`downloader`] — bounded worker pool with atomic writes
//! 5. [`rewriter`] — HTML and CSS reference rewriting

pub mod cdx;
pub mod config;
pub mod downloader;
pub mod path_map;
pub mod progress;
pub mod rewriter;
pub mod snapshot_index;
pub mod storage;
pub mod urls;

pub use cdx::{CdxError, CdxRow};
pub use config::{CanonicalAction, MirrorConfig};
pub use downloader::{build_plan, download_all, wayback_asset_url, DownloadPlan, DownloadReport};
pub use path_map::{relative_link, url_to_local_path};
pub use progress::{ConsoleProgress, NoOpProgress, ProgressReporter};
pub use rewriter::RewriterKind;
pub use snapshot_index::{Snapshot, SnapshotIndex};
pub use storage::{LocalStorage, Storage};
pub use urls::{normalize_base_url, NormalizedBase};
