//! Streaming HTML link rewriting.
//!
//! Uses lol_html so documents are rewritten in one pass without building a
//! DOM. Navigable links (`a`, `form`), embedded assets (`img`, `script`,
//! `iframe`, `source`, `video`, `audio`, non-canonical `link`), inline
//! `<style>` blocks, and `style` attributes are all covered; `<base>` is
//! never modified.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use lol_html::errors::AttributeNameError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, HtmlRewriter, Settings};
use url::Url;

use crate::config::{CanonicalAction, MirrorConfig};
use crate::path_map::{join_local, relative_link, to_posix, url_to_local_path};
use crate::rewriter::css::rewrite_css_content;
use crate::snapshot_index::SnapshotIndex;
use crate::storage::Storage;
use crate::urls::is_internal_host;

/// Rewrite all references in an HTML document.
///
/// `page_url` is the URL the page was archived under; relative attribute
/// values resolve against it.
pub fn rewrite_html(input: &[u8], page_url: &str, cfg: &MirrorConfig) -> Result<Vec<u8>> {
    let page = Url::parse(page_url).with_context(|| format!("parse page URL {page_url}"))?;

    // Directory that will contain the page file; rewritten links are
    // relative to it.
    let page_file = join_local(&cfg.directory, &url_to_local_path(page_url, cfg.pretty_path));
    let page_dir = page_file.parent().map(to_posix).unwrap_or_default();

    let mut output = Vec::with_capacity(input.len());

    // <style> text arrives in chunks; buffer until the end of the text node
    // so url() references never straddle a chunk boundary.
    let style_buf: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("a", |el| {
                    rewrite_attr(el, "href", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("form", |el| {
                    rewrite_attr(el, "action", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("img", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("script", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("iframe", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("source", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("video", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("audio", |el| {
                    rewrite_attr(el, "src", &page, &page_dir, cfg)?;
                    Ok(())
                }),
                element!("link", |el| {
                    let rel_attr = el.get_attribute("rel").unwrap_or_default();
                    if rel_attr.trim().eq_ignore_ascii_case("canonical") {
                        if cfg.canonical_action == CanonicalAction::Remove {
                            el.remove();
                        }
                    } else {
                        rewrite_attr(el, "href", &page, &page_dir, cfg)?;
                    }
                    Ok(())
                }),
                // Inline style attributes on any element.
                element!("[style]", |el| {
                    if let Some(style) = el.get_attribute("style") {
                        let rewritten = rewrite_css_content(&style, page_url, cfg);
                        if rewritten != style {
                            el.set_attribute("style", &rewritten)?;
                        }
                    }
                    Ok(())
                }),
                text!("style", {
                    let style_buf = Rc::clone(&style_buf);
                    move |chunk| {
                        style_buf.borrow_mut().push_str(chunk.as_str());
                        if chunk.last_in_text_node() {
                            let css = std::mem::take(&mut *style_buf.borrow_mut());
                            let rewritten = rewrite_css_content(&css, page_url, cfg);
                            chunk.replace(&rewritten, ContentType::Html);
                        } else {
                            chunk.remove();
                        }
                        Ok(())
                    }
                }),
            ],
            ..Settings::default()
        },
        |bytes: &[u8]| output.extend_from_slice(bytes),
    );

    rewriter
        .write(input)
        .map_err(|e| anyhow!("html rewrite: {e}"))?;
    rewriter.end().map_err(|e| anyhow!("html rewrite end: {e}"))?;

    Ok(output)
}

/// Rewrite one attribute in place when the value resolves to a same-origin
/// http(s) URL.
fn rewrite_attr(
    el: &mut Element<'_, '_>,
    attr: &str,
    page: &Url,
    page_dir: &str,
    cfg: &MirrorConfig,
) -> Result<(), AttributeNameError> {
    if let Some(rel) = rewritten_attr_value(el.get_attribute(attr), page, page_dir, cfg) {
        el.set_attribute(attr, &rel)?;
    }
    Ok(())
}

/// Compute the replacement for one attribute value, or `None` to leave it
/// unchanged.
///
/// In preserve mode the local filename may contain literal `%` (e.g. `%3F`
/// standing in for the query separator); those are re-encoded to `%25` so a
/// browser decoding the href once lands on the exact on-disk name.
fn rewritten_attr_value(
    value: Option<String>,
    page: &Url,
    page_dir: &str,
    cfg: &MirrorConfig,
) -> Option<String> {
    let raw = value?;
    let val = raw.trim();
    if val.is_empty()
        || val.starts_with('#')
        || val.starts_with("javascript:")
        || val.starts_with("data:")
        || val.starts_with("mailto:")
    {
        return None;
    }

    let resolved = page.join(val).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    if !is_internal_host(resolved.host_str()?, &cfg.bare_host) {
        // External asset download is reserved; references stay as-is.
        return None;
    }

    let target = join_local(
        &cfg.directory,
        &url_to_local_path(resolved.as_str(), cfg.pretty_path),
    );
    let rel = relative_link(page_dir, &to_posix(&target));
    Some(rel.replace('%', "%25"))
}

/// Read an HTML file from storage, rewrite it, and replace it atomically.
pub async fn rewrite_html_file(
    store: &dyn Storage,
    logical_path: &str,
    page_url: &str,
    cfg: &MirrorConfig,
    _idx: &SnapshotIndex,
) -> Result<()> {
    let data = store.get(logical_path).await?;
    let rewritten = rewrite_html(&data, page_url, cfg)?;
    store.put_bytes(logical_path, &rewritten).await
}
