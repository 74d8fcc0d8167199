//! URL → local-path mapping.
//!
//! Converts absolute URLs into relative, forward-slash filesystem path
//! fragments that are safe on every platform (including Windows). Two
//! policies exist:
//!
//! - **pretty**: aggressively sanitized segments, extension-less segments
//!   promoted to directories, queries embedded into the filename with `_`
//!   separators.
//! - **preserve** (default): the original URL structure and its percent
//!   encodings are kept; only filesystem-hostile characters are escaped and
//!   the query is appended after an encoded `?` (`%3F`).

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use url::Url;

/// Convert an absolute URL to a relative filesystem path fragment (no
/// leading slash) suitable for joining with the output directory. The URL
/// fragment (`#…`) is always stripped; an unparsable URL maps to `unknown`.
#[must_use]
pub fn url_to_local_path(raw_url: &str, pretty: bool) -> String {
    let Ok(parsed) = Url::parse(raw_url) else {
        return "unknown".to_string();
    };

    let decoded_path = percent_decode_str(parsed.path())
        .decode_utf8_lossy()
        .into_owned();
    let is_dir = decoded_path.is_empty() || decoded_path.ends_with('/');
    let raw_query = parsed.query().filter(|q| !q.is_empty());

    if pretty {
        pretty_path(&decoded_path, is_dir, raw_query)
    } else {
        preserve_path(parsed.path(), is_dir, raw_query)
    }
}

/// Pretty policy: sanitized segments, implicit directories, embedded query.
fn pretty_path(decoded_path: &str, is_dir: bool, raw_query: Option<&str>) -> String {
    let segments: Vec<String> = decoded_path
        .trim_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty())
        .map(sanitize_segment)
        .filter(|seg| !seg.is_empty())
        .collect();

    let (dir_segs, filename) = if is_dir || segments.is_empty() {
        (segments.as_slice(), index_name(raw_query))
    } else {
        let last = &segments[segments.len() - 1];
        match last.rfind('.') {
            // No extension: implicit directory.
            None => (segments.as_slice(), index_name(raw_query)),
            Some(dot) => {
                let name = format!(
                    "{}{}{}",
                    &last[..dot],
                    query_suffix(raw_query),
                    &last[dot..]
                );
                (&segments[..segments.len() - 1], name)
            }
        }
    };

    if dir_segs.is_empty() {
        filename
    } else {
        format!("{}/{}", dir_segs.join("/"), filename)
    }
}

/// Preserve policy: keep the escaped URL structure, encode only
/// filesystem-unsafe characters, append the query after `%3F`.
fn preserve_path(escaped_path: &str, is_dir: bool, raw_query: Option<&str>) -> String {
    let mut segments: Vec<String> = escaped_path
        .trim_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty())
        .map(encode_for_fs)
        .collect();

    if is_dir || segments.is_empty() {
        let filename = match raw_query {
            Some(q) => format!("index.html%3F{}", encode_for_fs(q)),
            None => "index.html".to_string(),
        };
        return if segments.is_empty() {
            filename
        } else {
            format!("{}/{}", segments.join("/"), filename)
        };
    }

    if let (Some(q), Some(last)) = (raw_query, segments.last_mut()) {
        last.push_str("%3F");
        last.push_str(&encode_for_fs(q));
    }
    segments.join("/")
}

/// Keep only `[A-Za-z0-9_-]`; everything else is dropped.
fn sanitize_component(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Sanitize a single decoded path segment. The extension is split off first
/// and sanitized on its own, because the sanitizer drops dots.
fn sanitize_segment(seg: &str) -> String {
    match seg.rfind('.') {
        None => sanitize_component(seg),
        Some(dot) => {
            let mut base = sanitize_component(&seg[..dot]);
            let ext = sanitize_component(&seg[dot + 1..]);
            if base.is_empty() {
                base = "file".to_string();
            }
            if ext.is_empty() {
                base
            } else {
                format!("{base}.{ext}")
            }
        }
    }
}

/// `index[_querySuffix].html`
fn index_name(raw_query: Option<&str>) -> String {
    format!("index{}.html", query_suffix(raw_query))
}

/// Convert a raw query string into a filesystem-safe `_key_value` suffix, or
/// `""` when there is no query. Separators (`=` `&`) become underscores
/// before sanitization; a query that fails to decode is used raw.
fn query_suffix(raw_query: Option<&str>) -> String {
    let Some(raw) = raw_query else {
        return String::new();
    };
    let decoded = match percent_decode_str(raw).decode_utf8() {
        Ok(d) => d.into_owned(),
        Err(_) => raw.to_string(),
    };
    let sanitized = sanitize_component(&decoded.replace(['=', '&'], "_"));
    if sanitized.is_empty() {
        String::new()
    } else {
        format!("_{sanitized}")
    }
}

const FS_HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encode characters forbidden in Windows file names
/// (`\ : * ? " < > |`) and ASCII control characters. The forward slash is
/// intentionally left alone: callers split on `/` before encoding.
fn encode_for_fs(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'\\' | b':' | b'*' | b'?' | b'"' | b'<' | b'>' | b'|' => {
                out.push(b'%');
                out.push(FS_HEX[(b >> 4) as usize]);
                out.push(FS_HEX[(b & 0x0F) as usize]);
            }
            _ if b < 0x20 => {
                out.push(b'%');
                out.push(FS_HEX[(b >> 4) as usize]);
                out.push(FS_HEX[(b & 0x0F) as usize]);
            }
            _ => out.push(b),
        }
    }
    // Only ASCII was inserted; all other bytes pass through untouched.
    String::from_utf8(out).unwrap_or_else(|e| {
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

/// Relative forward-slash path from `from_dir` to `to_file`. Falls back to
/// `to_file` when no relative path exists.
#[must_use]
pub fn relative_link(from_dir: &str, to_file: &str) -> String {
    match pathdiff::diff_paths(Path::new(to_file), Path::new(from_dir)) {
        Some(rel) => to_posix(&rel),
        None => to_file.to_string(),
    }
}

/// Join a forward-slash logical path onto a root directory.
#[must_use]
pub fn join_local(root: &Path, logical: &str) -> PathBuf {
    let mut joined = root.to_path_buf();
    joined.extend(logical.split('/').filter(|seg| !seg.is_empty()));
    joined
}

/// Render a path with forward slashes regardless of platform.
#[must_use]
pub fn to_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
