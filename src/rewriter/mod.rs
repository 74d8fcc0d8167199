//! Post-download reference rewriting.
//!
//! Detection and dispatch over the closed set of rewriter kinds. The kind
//! is picked from the logical path, the response content type, and the
//! first bytes of the body; anything that is neither HTML nor CSS is left
//! exactly as downloaded.

pub mod css;
pub mod html;

use anyhow::Result;

use crate::config::MirrorConfig;
use crate::snapshot_index::SnapshotIndex;
use crate::storage::Storage;
use crate::urls::{is_css_resource, is_html_file};

/// The closed set of rewritable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriterKind {
    Html,
    Css,
}

impl RewriterKind {
    /// Pick the rewriter for a stored resource, or `None` when no rewriting
    /// applies.
    #[must_use]
    pub fn detect(logical_path: &str, content_type: &str, first_bytes: &[u8]) -> Option<Self> {
        if is_html_file(logical_path, content_type, first_bytes) {
            Some(Self::Html)
        } else if is_css_resource(logical_path, content_type) {
            Some(Self::Css)
        } else {
            None
        }
    }

    /// Rewrite the resource at `logical_path` in place through `store`.
    ///
    /// `page_url` is the URL the resource was archived under; relative
    /// references are resolved against it.
    pub async fn rewrite(
        self,
        store: &dyn Storage,
        logical_path: &str,
        page_url: &str,
        cfg: &MirrorConfig,
        idx: &SnapshotIndex,
    ) -> Result<()> {
        match self {
            Self::Html => html::rewrite_html_file(store, logical_path, page_url, cfg, idx).await,
            Self::Css => css::rewrite_css_file(store, logical_path, page_url, cfg, idx).await,
        }
    }
}
