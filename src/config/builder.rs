//! Builder for [`MirrorConfig`] with upfront validation.

use anyhow::{bail, Result};
use std::path::PathBuf;

use super::types::{CanonicalAction, MirrorConfig};
use crate::urls::normalize_base_url;

/// Fluent builder producing a validated [`MirrorConfig`].
///
/// Defaults match the CLI defaults: 3 threads, preserve paths, canonical
/// links kept, 60 CDX requests/min, 5 CDX retries.
#[derive(Debug, Clone)]
pub struct MirrorConfigBuilder {
    url: String,
    from_timestamp: Option<String>,
    to_timestamp: Option<String>,
    threads: usize,
    directory: Option<PathBuf>,
    rewrite_links: bool,
    pretty_path: bool,
    canonical_action: CanonicalAction,
    exact_url: bool,
    download_external_assets: bool,
    stop_on_error: bool,
    cdx_rate_per_min: u32,
    cdx_max_retries: u32,
    debug: bool,
}

impl MirrorConfigBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            from_timestamp: None,
            to_timestamp: None,
            threads: 3,
            directory: None,
            rewrite_links: false,
            pretty_path: false,
            canonical_action: CanonicalAction::Keep,
            exact_url: false,
            download_external_assets: false,
            stop_on_error: false,
            cdx_rate_per_min: 60,
            cdx_max_retries: 5,
            debug: false,
        }
    }

    #[must_use]
    pub fn from_timestamp(mut self, ts: Option<String>) -> Self {
        self.from_timestamp = ts;
        self
    }

    #[must_use]
    pub fn to_timestamp(mut self, ts: Option<String>) -> Self {
        self.to_timestamp = ts;
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Output root. When unset, defaults to `websites/<bareHost>`.
    #[must_use]
    pub fn directory(mut self, dir: Option<PathBuf>) -> Self {
        self.directory = dir;
        self
    }

    #[must_use]
    pub fn rewrite_links(mut self, enabled: bool) -> Self {
        self.rewrite_links = enabled;
        self
    }

    #[must_use]
    pub fn pretty_path(mut self, enabled: bool) -> Self {
        self.pretty_path = enabled;
        self
    }

    #[must_use]
    pub fn canonical_action(mut self, action: CanonicalAction) -> Self {
        self.canonical_action = action;
        self
    }

    #[must_use]
    pub fn exact_url(mut self, enabled: bool) -> Self {
        self.exact_url = enabled;
        self
    }

    #[must_use]
    pub fn download_external_assets(mut self, enabled: bool) -> Self {
        self.download_external_assets = enabled;
        self
    }

    #[must_use]
    pub fn stop_on_error(mut self, enabled: bool) -> Self {
        self.stop_on_error = enabled;
        self
    }

    #[must_use]
    pub fn cdx_rate_per_min(mut self, rate: u32) -> Self {
        self.cdx_rate_per_min = rate;
        self
    }

    #[must_use]
    pub fn cdx_max_retries(mut self, retries: u32) -> Self {
        self.cdx_max_retries = retries;
        self
    }

    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Normalize the target URL and assemble the final configuration.
    ///
    /// Fails fast, before any I/O, on an invalid thread count, an empty or
    /// unparsable URL, an unsupported scheme, or a missing host.
    pub fn build(self) -> Result<MirrorConfig> {
        if self.threads == 0 {
            bail!("threads must be greater than 0");
        }
        if self.cdx_rate_per_min == 0 {
            bail!("cdx rate must be greater than 0 requests/min");
        }

        let base = normalize_base_url(&self.url)?;
        let directory = self
            .directory
            .unwrap_or_else(|| PathBuf::from("websites").join(&base.bare_host));

        Ok(MirrorConfig {
            base_url: base.canonical_url,
            variants: base.variants,
            bare_host: base.bare_host,
            unicode_host: base.unicode_host,
            exact_url: self.exact_url,
            directory,
            from_timestamp: self.from_timestamp,
            to_timestamp: self.to_timestamp,
            threads: self.threads,
            rewrite_links: self.rewrite_links,
            pretty_path: self.pretty_path,
            canonical_action: self.canonical_action,
            download_external_assets: self.download_external_assets,
            stop_on_error: self.stop_on_error,
            cdx_rate_per_min: self.cdx_rate_per_min,
            cdx_max_retries: self.cdx_max_retries,
            debug: self.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_defaults_directory_to_bare_host() {
        let cfg = MirrorConfig::builder("https://www.example.com/")
            .build()
            .expect("valid config");
        assert_eq!(cfg.directory, PathBuf::from("websites/example.com"));
        assert_eq!(cfg.bare_host, "example.com");
        assert_eq!(cfg.threads, 3);
        assert_eq!(cfg.cdx_rate_per_min, 60);
        assert_eq!(cfg.cdx_max_retries, 5);
    }

    #[test]
    fn build_rejects_zero_threads() {
        let err = MirrorConfig::builder("example.com").threads(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn build_rejects_bad_scheme() {
        let err = MirrorConfig::builder("ftp://example.com").build();
        assert!(err.is_err());
    }

    #[test]
    fn canonical_action_parses_case_insensitively() {
        assert_eq!("Keep".parse::<CanonicalAction>(), Ok(CanonicalAction::Keep));
        assert_eq!(
            "REMOVE".parse::<CanonicalAction>(),
            Ok(CanonicalAction::Remove)
        );
        assert!("drop".parse::<CanonicalAction>().is_err());
    }
}
