//! Concurrent snapshot download orchestration.
//!
//! Drives the whole pipeline: fetch the CDX index, dedup it into a
//! manifest, then fan the manifest out over a bounded worker pool. Each
//! task downloads one snapshot from the raw-content endpoint, writes it
//! atomically through storage, and optionally dispatches the HTML/CSS
//! rewriter.
//!
//! No ordering is guaranteed across snapshots. Within one snapshot the
//! rewrite always runs after the storage write has completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, warn};
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use crate::cdx;
use crate::config::MirrorConfig;
use crate::path_map::url_to_local_path;
use crate::progress::ProgressReporter;
use crate::rewriter::RewriterKind;
use crate::snapshot_index::{Snapshot, SnapshotIndex};
use crate::storage::Storage;

/// Wayback raw-content endpoint; the `id_` timestamp modifier requests the
/// archived bytes without banner injection.
pub const WAYBACK_WEB_ENDPOINT: &str = "https://web.archive.org/web";

/// Leading bytes read for content sniffing.
const SNIFF_LEN: usize = 512;

/// Per-request timeout for snapshot downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything needed to run the download phase: the frozen snapshot index
/// and the manifest drawn from it.
pub struct DownloadPlan {
    pub index: Arc<SnapshotIndex>,
    /// Unique snapshots, newest first.
    pub manifest: Vec<Snapshot>,
}

/// Outcome of a completed (non-aborted) download phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Snapshots in the manifest.
    pub total: usize,
    /// Snapshots that failed to download.
    pub failed: usize,
}

/// Build the HTTP client used for snapshot downloads.
pub fn download_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .gzip(true)
        .user_agent(concat!("wayback-mirror/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Fetch the CDX index for every variant and dedup it into a download plan.
///
/// `progress` advances once per CDX page and is finished before returning.
pub async fn build_plan(
    cfg: &MirrorConfig,
    progress: &dyn ProgressReporter,
) -> Result<DownloadPlan> {
    let client = cdx::cdx_client().context("build CDX client")?;
    let rows = cdx::fetch_all(
        &client,
        cdx::CDX_SEARCH_ENDPOINT,
        &cfg.variants,
        cfg.exact_url,
        cfg.from_timestamp.as_deref(),
        cfg.to_timestamp.as_deref(),
        cfg.cdx_rate_per_min,
        cfg.cdx_max_retries,
        progress,
    )
    .await
    .context("CDX fetch")?;
    progress.finish();

    let mut index = SnapshotIndex::new();
    for row in &rows {
        index.register(&row.original_url, &row.timestamp);
    }
    let manifest = index.manifest().to_vec();
    debug!(
        "cdx returned {} rows, {} unique snapshots",
        rows.len(),
        manifest.len()
    );

    Ok(DownloadPlan {
        index: Arc::new(index),
        manifest,
    })
}

/// Download every snapshot in the plan through a worker pool of
/// `cfg.threads` tasks.
///
/// With `stop_on_error`, the first task failure aborts all outstanding
/// tasks and is returned. Otherwise failures are counted, logged at debug
/// level, and reported in the returned [`DownloadReport`].
pub async fn download_all(
    cfg: Arc<MirrorConfig>,
    store: Arc<dyn Storage>,
    plan: DownloadPlan,
    progress: Arc<dyn ProgressReporter>,
) -> Result<DownloadReport> {
    let client = download_client().context("build download client")?;
    run_pool(cfg, store, plan, progress, client, WAYBACK_WEB_ENDPOINT).await
}

/// Worker-pool body of [`download_all`], with the endpoint injectable so the
/// whole pipeline can run against a local test server.
async fn run_pool(
    cfg: Arc<MirrorConfig>,
    store: Arc<dyn Storage>,
    plan: DownloadPlan,
    progress: Arc<dyn ProgressReporter>,
    client: reqwest::Client,
    wayback_base: &'static str,
) -> Result<DownloadReport> {
    let total = plan.manifest.len();
    progress.set_len(total as u64);
    if total == 0 {
        progress.finish();
        return Ok(DownloadReport { total, failed: 0 });
    }

    let semaphore = Arc::new(Semaphore::new(cfg.threads));
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut tasks = FuturesUnordered::new();
    let mut abort_handles = Vec::with_capacity(total);

    for snap in plan.manifest {
        let cfg = Arc::clone(&cfg);
        let store = Arc::clone(&store);
        let index = Arc::clone(&plan.index);
        let progress = Arc::clone(&progress);
        let semaphore = Arc::clone(&semaphore);
        let cancelled = Arc::clone(&cancelled);
        let client = client.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            download_one(
                &snap,
                &cfg,
                store.as_ref(),
                &index,
                &client,
                &cancelled,
                progress.as_ref(),
                wayback_base,
            )
            .await
            .with_context(|| format!("download {}", snap.file_url))
        });
        abort_handles.push(handle.abort_handle());
        tasks.push(handle);
    }

    let mut failed = 0usize;
    let mut first_error: Option<anyhow::Error> = None;

    while let Some(joined) = tasks.next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(join_err) if join_err.is_cancelled() => continue,
            Err(join_err) => {
                warn!("download task panicked: {join_err}");
                anyhow!("download task panicked: {join_err}")
            }
        };

        if cfg.stop_on_error {
            if first_error.is_none() {
                cancelled.store(true, Ordering::Relaxed);
                for handle in &abort_handles {
                    handle.abort();
                }
                first_error = Some(err);
            }
        } else {
            failed += 1;
            debug!("download error: {err:#}");
        }
    }
    progress.finish();

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(DownloadReport { total, failed })
}

/// Download a single snapshot and optionally rewrite its references.
#[allow(clippy::too_many_arguments)]
async fn download_one(
    snap: &Snapshot,
    cfg: &MirrorConfig,
    store: &dyn Storage,
    index: &SnapshotIndex,
    client: &reqwest::Client,
    cancelled: &AtomicBool,
    progress: &dyn ProgressReporter,
    wayback_base: &str,
) -> Result<()> {
    let logical_path = url_to_local_path(&snap.file_url, cfg.pretty_path);

    // Idempotent resume: a file that already exists was downloaded by an
    // earlier run.
    if store.exists(&logical_path) {
        progress.inc();
        return Ok(());
    }
    if cancelled.load(Ordering::Relaxed) {
        bail!("cancelled");
    }

    let wayback_url = format!("{wayback_base}/{}id_/{}", snap.timestamp, snap.file_url);
    debug!("GET {wayback_url}");

    let resp = client
        .get(&wayback_url)
        .send()
        .await
        .with_context(|| format!("http get {wayback_url}"))?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        // Captures listed in the index are occasionally gone from the
        // raw-content endpoint; skip them.
        progress.inc();
        return Ok(());
    }
    if status != StatusCode::OK {
        bail!("HTTP {status} for {wayback_url}");
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = resp
        .bytes()
        .await
        .with_context(|| format!("read body of {wayback_url}"))?;
    if cancelled.load(Ordering::Relaxed) {
        bail!("cancelled");
    }

    let sniff = &body[..body.len().min(SNIFF_LEN)];
    let kind = if cfg.rewrite_links {
        RewriterKind::detect(&logical_path, &content_type, sniff)
    } else {
        None
    };

    let mut reader = std::io::Cursor::new(body.as_ref());
    store
        .put(&logical_path, &mut reader)
        .await
        .with_context(|| format!("store {logical_path}"))?;

    if let Some(kind) = kind {
        if let Err(err) = kind
            .rewrite(store, &logical_path, &snap.file_url, cfg, index)
            .await
        {
            // The downloaded file stays as-is when rewriting fails.
            debug!("rewrite {logical_path}: {err:#}");
        }
    }

    progress.inc();
    Ok(())
}

/// Raw-content URL for an asset, resolving the best available timestamp
/// through the snapshot index.
#[must_use]
pub fn wayback_asset_url(asset_url: &str, fallback_ts: &str, index: &SnapshotIndex) -> String {
    let ts = index.resolve(asset_url, fallback_ts);
    format!("{WAYBACK_WEB_ENDPOINT}/{ts}id_/{asset_url}")
}
