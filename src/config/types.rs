//! Core configuration types for mirror runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How `<link rel="canonical">` tags are handled during HTML rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalAction {
    /// Leave canonical links in place.
    #[default]
    Keep,
    /// Detach canonical links from the document.
    Remove,
}

impl std::str::FromStr for CanonicalAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "remove" => Ok(Self::Remove),
            other => Err(format!("canonical must be 'keep' or 'remove', got {other:?}")),
        }
    }
}

/// Immutable configuration for one mirror run.
///
/// Built through [`MirrorConfig::builder`], which normalizes the target URL
/// and validates the numeric knobs before any I/O happens.
///
/// [`MirrorConfig::builder`]: super::MirrorConfigBuilder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Canonical form of the user-supplied URL.
    pub base_url: String,
    /// All `http/https × bare/www` combinations queried against the CDX index.
    pub variants: Vec<String>,
    /// Hostname with any leading `www.` stripped; the same-origin test for
    /// link rewriting compares against this.
    pub bare_host: String,
    /// IDN-decoded hostname for display.
    pub unicode_host: String,
    /// Query the exact URL only, without the `/*` wildcard expansion.
    pub exact_url: bool,
    /// Output root the mirrored tree is written under.
    pub directory: PathBuf,
    /// Inclusive `YYYYMMDDhhmmss` lower bound for captures.
    pub from_timestamp: Option<String>,
    /// Inclusive `YYYYMMDDhhmmss` upper bound for captures.
    pub to_timestamp: Option<String>,
    /// Worker-pool size for concurrent downloads.
    pub threads: usize,
    /// Rewrite HTML/CSS references to relative local paths after download.
    pub rewrite_links: bool,
    /// Use the sanitized "pretty" path policy instead of preserving the
    /// original URL structure.
    pub pretty_path: bool,
    pub canonical_action: CanonicalAction,
    /// Reserved: accepted and carried, but external references are currently
    /// left untouched.
    pub download_external_assets: bool,
    /// Abort the whole run on the first per-snapshot error instead of
    /// counting failures and continuing.
    pub stop_on_error: bool,
    /// Token-bucket refill for CDX requests, in requests per minute.
    pub cdx_rate_per_min: u32,
    /// Maximum retries for retriable CDX responses (429/503/5xx).
    pub cdx_max_retries: u32,
    /// Verbose debug logging.
    pub debug: bool,
}

impl MirrorConfig {
    #[must_use]
    pub fn builder(url: impl Into<String>) -> super::MirrorConfigBuilder {
        super::MirrorConfigBuilder::new(url)
    }
}
