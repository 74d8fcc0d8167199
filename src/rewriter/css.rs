//! Text-level CSS reference rewriting.
//!
//! CSS is rewritten with regexes rather than a full parser: the only
//! constructs that carry URLs are `url(...)` and `@import`, and both survive
//! minification. Five patterns are applied in order: double-quoted,
//! single-quoted, and bare `url()`, then double- and single-quoted
//! `@import`.

use std::sync::LazyLock;

use anyhow::Result;
use regex::{Captures, Regex};
use url::Url;

use crate::config::MirrorConfig;
use crate::path_map::{join_local, relative_link, to_posix, url_to_local_path};
use crate::snapshot_index::SnapshotIndex;
use crate::storage::Storage;
use crate::urls::is_internal_host;

static RE_URL_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*"([^"]+)"\s*\)"#).expect("RE_URL_DOUBLE: hardcoded regex is valid")
});

static RE_URL_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)url\(\s*'([^']+)'\s*\)").expect("RE_URL_SINGLE: hardcoded regex is valid")
});

static RE_URL_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*([^)'"]+?)\s*\)"#).expect("RE_URL_BARE: hardcoded regex is valid")
});

static RE_IMPORT_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+"([^"]+)""#).expect("RE_IMPORT_DOUBLE: hardcoded regex is valid")
});

static RE_IMPORT_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@import\s+'([^']+)'").expect("RE_IMPORT_SINGLE: hardcoded regex is valid")
});

/// Rewrite `url()` and `@import` references in CSS text. Same-origin
/// references become paths relative to the CSS file's own directory; data
/// URIs, fragments, and external hosts are left untouched.
#[must_use]
pub fn rewrite_css_content(css: &str, page_url: &str, cfg: &MirrorConfig) -> String {
    let Ok(page) = Url::parse(page_url) else {
        return css.to_string();
    };

    // Directory of the CSS file itself; rewritten references are relative
    // to it.
    let local_path = url_to_local_path(page_url, cfg.pretty_path);
    let local_file = join_local(&cfg.directory, &local_path);
    let local_dir = local_file
        .parent()
        .map(to_posix)
        .unwrap_or_default();

    let mut out = css.to_string();
    for re in [
        &*RE_URL_DOUBLE,
        &*RE_URL_SINGLE,
        &*RE_URL_BARE,
        &*RE_IMPORT_DOUBLE,
        &*RE_IMPORT_SINGLE,
    ] {
        out = re
            .replace_all(&out, |caps: &Captures| {
                let whole = &caps[0];
                let reference = caps[1].trim();
                match rewrite_reference(reference, &page, &local_dir, cfg) {
                    Some(rel) => whole.replacen(reference, &rel, 1),
                    None => whole.to_string(),
                }
            })
            .into_owned();
    }
    out
}

/// Resolve one CSS reference; `None` means leave it as-is.
fn rewrite_reference(
    reference: &str,
    page: &Url,
    local_dir: &str,
    cfg: &MirrorConfig,
) -> Option<String> {
    if reference.is_empty()
        || reference.starts_with("data:")
        || reference.starts_with("javascript:")
        || reference.starts_with('#')
    {
        return None;
    }

    let resolved = page.join(reference).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    if !is_internal_host(resolved.host_str()?, &cfg.bare_host) {
        // External asset download is reserved; leave the reference alone
        // whether or not the flag is set.
        return None;
    }

    let target = join_local(
        &cfg.directory,
        &url_to_local_path(resolved.as_str(), cfg.pretty_path),
    );
    Some(relative_link(local_dir, &to_posix(&target)))
}

/// Read a CSS file from storage, rewrite its references, and write it back.
pub async fn rewrite_css_file(
    store: &dyn Storage,
    logical_path: &str,
    page_url: &str,
    cfg: &MirrorConfig,
    _idx: &SnapshotIndex,
) -> Result<()> {
    let data = store.get(logical_path).await?;
    let css = String::from_utf8_lossy(&data);
    let rewritten = rewrite_css_content(&css, page_url, cfg);
    store.put_bytes(logical_path, rewritten.as_bytes()).await
}
