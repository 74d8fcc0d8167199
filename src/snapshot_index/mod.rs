//! Deduplication index over CDX rows.
//!
//! CDX returns one row per capture, so a resource that was archived many
//! times shows up many times. The index keeps exactly one snapshot per
//! logical resource — the one with the greatest (latest) timestamp — at two
//! granularities: by URL path, and by path plus query string. The manifest
//! handed to the downloader is drawn from the finer path+query level, so
//! captures differing only in their query are distinct resources.
//!
//! Registration happens sequentially while CDX results stream in; the first
//! read freezes the index (via `OnceLock`), after which it is safe to share
//! across download workers.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

/// A single archived file selected for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Original URL at archive time.
    pub file_url: String,
    /// 14-digit `YYYYMMDDhhmmss` CDX timestamp. Lexicographic order is
    /// chronological order.
    pub timestamp: String,
    /// Deduplication key: URL path, plus `?query` when present.
    pub file_id: String,
}

/// Lookup tables materialized on the first read.
#[derive(Debug)]
struct BuiltIndex {
    manifest: Vec<Snapshot>,
    lookup_path: HashMap<String, String>,
    lookup_query: HashMap<String, String>,
}

/// Deduplicates CDX rows and answers timestamp lookups for asset URLs.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    by_path: HashMap<String, Snapshot>,
    by_path_and_query: HashMap<String, Snapshot>,
    built: OnceLock<BuiltIndex>,
}

impl SnapshotIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a CDX row, keeping the lexicographically greatest timestamp per
    /// key. Unparsable URLs are silently dropped.
    pub fn register(&mut self, raw_url: &str, timestamp: &str) {
        let Ok(parsed) = Url::parse(raw_url) else {
            return;
        };
        let (path_key, query_key) = resource_keys(&parsed);

        let snap = Snapshot {
            file_url: raw_url.to_string(),
            timestamp: timestamp.to_string(),
            file_id: query_key.clone(),
        };

        store_latest(&mut self.by_path_and_query, query_key, snap.clone());
        store_latest(&mut self.by_path, path_key, snap);
    }

    /// The deduplicated snapshot list, sorted newest-first.
    ///
    /// The first call freezes the index and materializes the lookup tables;
    /// later calls return the same list.
    pub fn manifest(&self) -> &[Snapshot] {
        &self.built().manifest
    }

    /// Best timestamp for an asset URL: the path+query match wins, then the
    /// path-only match, then the caller-provided fallback. An unparsable URL
    /// resolves to the fallback.
    pub fn resolve(&self, asset_url: &str, fallback: &str) -> String {
        let Ok(parsed) = Url::parse(asset_url) else {
            return fallback.to_string();
        };
        let (path_key, query_key) = resource_keys(&parsed);

        let built = self.built();
        if let Some(ts) = built.lookup_query.get(&query_key) {
            return ts.clone();
        }
        if let Some(ts) = built.lookup_path.get(&path_key) {
            return ts.clone();
        }
        fallback.to_string()
    }

    fn built(&self) -> &BuiltIndex {
        self.built.get_or_init(|| {
            let mut manifest: Vec<Snapshot> =
                self.by_path_and_query.values().cloned().collect();
            // Newest first; the file_id tiebreak keeps the order stable
            // across map iteration order.
            manifest.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| a.file_id.cmp(&b.file_id))
            });

            let lookup_path = self
                .by_path
                .iter()
                .map(|(key, snap)| (key.clone(), snap.timestamp.clone()))
                .collect();
            let lookup_query = self
                .by_path_and_query
                .iter()
                .map(|(key, snap)| (key.clone(), snap.timestamp.clone()))
                .collect();

            BuiltIndex {
                manifest,
                lookup_path,
                lookup_query,
            }
        })
    }
}

/// `(path, path?query)` keys for a parsed URL.
fn resource_keys(url: &Url) -> (String, String) {
    let path_key = url.path().to_string();
    let query_key = match url.query() {
        Some(q) if !q.is_empty() => format!("{path_key}?{q}"),
        _ => path_key.clone(),
    };
    (path_key, query_key)
}

fn store_latest(map: &mut HashMap<String, Snapshot>, key: String, snap: Snapshot) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(snap);
        }
        Entry::Occupied(mut slot) if snap.timestamp > slot.get().timestamp => {
            slot.insert(snap);
        }
        Entry::Occupied(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_yields_empty_manifest() {
        let idx = SnapshotIndex::new();
        assert!(idx.manifest().is_empty());
    }

    #[test]
    fn register_adds_entries() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20230101000000");
        idx.register("https://example.com/style.css", "20230101000001");
        assert_eq!(idx.manifest().len(), 2);
    }

    #[test]
    fn duplicate_registration_keeps_latest_timestamp() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20220101000000");
        idx.register("https://example.com/page.html", "20230601000000");

        let manifest = idx.manifest();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].timestamp, "20230601000000");
    }

    #[test]
    fn older_registration_does_not_replace_newer() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20230601000000");
        idx.register("https://example.com/page.html", "20220101000000");

        assert_eq!(idx.manifest()[0].timestamp, "20230601000000");
    }

    #[test]
    fn manifest_sorted_newest_first() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/a.html", "20210101000000");
        idx.register("https://example.com/b.html", "20230101000000");
        idx.register("https://example.com/c.html", "20220101000000");

        let manifest = idx.manifest();
        assert_eq!(manifest.len(), 3);
        for pair in manifest.windows(2) {
            assert!(
                pair[0].timestamp >= pair[1].timestamp,
                "manifest not sorted newest-first: {} < {}",
                pair[0].timestamp,
                pair[1].timestamp
            );
        }
    }

    #[test]
    fn manifest_is_idempotent() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20230101000000");

        let first: Vec<Snapshot> = idx.manifest().to_vec();
        let second: Vec<Snapshot> = idx.manifest().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn query_variants_are_distinct_resources() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/search?q=rust", "20230101000000");
        idx.register("https://example.com/search?q=go", "20230201000000");

        assert_eq!(idx.manifest().len(), 2);
    }

    #[test]
    fn resolve_prefers_exact_query_match() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/search?q=go", "20230601000000");

        assert_eq!(
            idx.resolve("https://example.com/search?q=go", "fallback"),
            "20230601000000"
        );
    }

    #[test]
    fn resolve_falls_back_to_path_match() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20230101000000");

        assert_eq!(
            idx.resolve("https://example.com/page.html?v=2", "fallback"),
            "20230101000000"
        );
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let idx = SnapshotIndex::new();
        assert_eq!(
            idx.resolve("https://example.com/unknown.html", "mydefault"),
            "mydefault"
        );
    }

    #[test]
    fn resolve_builds_lazily_without_manifest_call() {
        let mut idx = SnapshotIndex::new();
        idx.register("https://example.com/page.html", "20230101000000");

        assert_eq!(
            idx.resolve("https://example.com/page.html", "fallback"),
            "20230101000000"
        );
    }

    #[test]
    fn invalid_url_registration_is_ignored() {
        let mut idx = SnapshotIndex::new();
        idx.register("://bad url", "20230101000000");
        assert!(idx.manifest().is_empty());
    }

    #[test]
    fn resolve_with_invalid_url_returns_fallback() {
        let idx = SnapshotIndex::new();
        assert_eq!(idx.resolve("://bad url", "fb"), "fb");
    }
}
