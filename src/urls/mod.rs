//! Base-URL normalization and resource-kind detection.
//!
//! The user may hand us a bare domain, a full URL, or anything in between.
//! [`normalize_base_url`] turns that input into its canonical form plus the
//! four `scheme × (bare|www)` variants the CDX index is queried under.

use anyhow::{bail, Result};
use url::Url;

/// Canonical form and all queryable variants of a user-supplied base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBase {
    pub canonical_url: String,
    /// All `http/https × bare/www` combinations.
    pub variants: Vec<String>,
    /// Hostname without a leading `www.`.
    pub bare_host: String,
    /// IDN-decoded hostname, for display.
    pub unicode_host: String,
}

/// Parse and normalize the user-supplied URL or domain.
///
/// A missing scheme defaults to `https://`. Non-http(s) schemes and empty
/// hosts are rejected.
pub fn normalize_base_url(input: &str) -> Result<NormalizedBase> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty URL");
    }
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| anyhow::anyhow!("parse {input:?}: {e}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        bail!("unsupported scheme {:?}", parsed.scheme());
    }
    let host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => bail!("missing host"),
    };

    let bare_host = if host.to_ascii_lowercase().starts_with("www.") {
        host[4..].to_string()
    } else {
        host.clone()
    };

    let unicode_host = match idna::domain_to_unicode(&bare_host) {
        (decoded, Ok(())) => decoded,
        (_, Err(_)) => bare_host.clone(),
    };

    let url_path = match parsed.path() {
        "" => "/",
        p => p,
    };
    let query_suffix = match parsed.query() {
        Some(q) if !q.is_empty() => format!("?{q}"),
        _ => String::new(),
    };

    let mut variants = Vec::with_capacity(4);
    for scheme in ["https", "http"] {
        for host_variant in [bare_host.clone(), format!("www.{bare_host}")] {
            variants.push(format!("{scheme}://{host_variant}{url_path}{query_suffix}"));
        }
    }

    let canonical_url = format!("https://{host}{url_path}{query_suffix}");

    Ok(NormalizedBase {
        canonical_url,
        variants,
        bare_host,
        unicode_host,
    })
}

/// Whether `host`, lowercased and with any `www.` stripped, names the same
/// origin as the configured bare host.
#[must_use]
pub fn is_internal_host(host: &str, bare_host: &str) -> bool {
    let lowered = host.to_ascii_lowercase();
    let stripped = lowered.strip_prefix("www.").unwrap_or(&lowered);
    stripped == bare_host.to_ascii_lowercase()
}

/// Lowercased extension of the final path segment, without the dot.
fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Whether the path, content type, or magic bytes indicate HTML.
///
/// The magic check skips an optional UTF-8 BOM and leading whitespace, then
/// looks for a `<`.
#[must_use]
pub fn is_html_file(file_path: &str, content_type: &str, first_bytes: &[u8]) -> bool {
    if content_type.to_ascii_lowercase().contains("text/html") {
        return true;
    }
    if matches!(path_extension(file_path).as_deref(), Some("html" | "htm")) {
        return true;
    }
    let mut bytes = first_bytes;
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes = &bytes[3..];
    }
    while let Some((&b, rest)) = bytes.split_first() {
        if b.is_ascii_whitespace() {
            bytes = rest;
        } else {
            return b == b'<';
        }
    }
    false
}

/// Whether the path or content type indicates CSS.
#[must_use]
pub fn is_css_resource(file_path: &str, content_type: &str) -> bool {
    if content_type.to_ascii_lowercase().contains("text/css") {
        return true;
    }
    path_extension(file_path).as_deref() == Some("css")
}
