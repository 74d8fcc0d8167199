//! Command-line entry point.
//!
//! Exit codes: 0 on success, 1 on validation or runtime errors, 2 on flag
//! parse errors (clap's default).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;

use wayback_mirror::config::{CanonicalAction, MirrorConfig};
use wayback_mirror::downloader;
use wayback_mirror::progress::{ConsoleProgress, ProgressReporter};
use wayback_mirror::storage::{LocalStorage, Storage};

/// Download an offline mirror of a website from the Wayback Machine.
#[derive(Debug, Parser)]
#[command(name = "wayback-mirror", version, about)]
struct Cli {
    /// Domain or URL to archive
    #[arg(value_name = "URL")]
    target: Option<String>,

    /// Domain or URL to archive (takes precedence over the positional)
    #[arg(long = "url", value_name = "URL")]
    url: Option<String>,

    /// Start timestamp (YYYYMMDDhhmmss)
    #[arg(long)]
    from: Option<String>,

    /// End timestamp (YYYYMMDDhhmmss)
    #[arg(long)]
    to: Option<String>,

    /// Concurrent download threads
    #[arg(long, default_value_t = 3)]
    threads: usize,

    /// Output directory (default: websites/<host>)
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Rewrite page links to relative local paths
    #[arg(long)]
    rewrite_links: bool,

    /// Map URLs to sanitized pretty paths instead of preserving URL structure
    #[arg(long)]
    pretty_path: bool,

    /// Canonical tag handling: keep|remove
    #[arg(long, value_name = "ACTION", default_value = "keep")]
    canonical: String,

    /// Download only the exact URL, no wildcard /*
    #[arg(long)]
    exact_url: bool,

    /// Also download off-site (external) assets (reserved)
    #[arg(long)]
    external_assets: bool,

    /// Abort the whole run on the first download error
    #[arg(long)]
    stop_on_error: bool,

    /// CDX request budget, in requests per minute
    #[arg(long = "cdx-rate", value_name = "PER_MIN", default_value_t = 60)]
    cdx_rate: u32,

    /// Maximum retries for throttled or failing CDX responses
    #[arg(long = "cdx-retries", value_name = "N", default_value_t = 5)]
    cdx_retries: u32,

    /// Enable verbose debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut log_builder = env_logger::Builder::from_default_env();
    if cli.debug {
        log_builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = log_builder.try_init();

    // A bad canonical value is a validation error (exit 1), not a flag
    // parse error (exit 2).
    let canonical: CanonicalAction = cli.canonical.parse().map_err(|msg: String| anyhow!(msg))?;

    let url = cli
        .url
        .or(cli.target)
        .ok_or_else(|| anyhow!("URL is required"))?;

    let cfg = MirrorConfig::builder(url)
        .from_timestamp(cli.from)
        .to_timestamp(cli.to)
        .threads(cli.threads)
        .directory(cli.directory)
        .rewrite_links(cli.rewrite_links)
        .pretty_path(cli.pretty_path)
        .canonical_action(canonical)
        .exact_url(cli.exact_url)
        .download_external_assets(cli.external_assets)
        .stop_on_error(cli.stop_on_error)
        .cdx_rate_per_min(cli.cdx_rate)
        .cdx_max_retries(cli.cdx_retries)
        .debug(cli.debug)
        .build()?;

    println!("Fetching snapshot index for {} ...", cfg.base_url);

    let cdx_progress = ConsoleProgress::cdx_spinner();
    let plan = downloader::build_plan(&cfg, &cdx_progress).await?;

    if plan.manifest.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }
    println!("Found {} unique snapshots to download.", plan.manifest.len());

    let store: Arc<dyn Storage> = Arc::new(LocalStorage::new(&cfg.directory));
    let progress: Arc<dyn ProgressReporter> = Arc::new(ConsoleProgress::download_bar());
    let report = downloader::download_all(Arc::new(cfg), store, plan, progress).await?;

    if report.failed > 0 {
        eprintln!("{} resource(s) failed to download", report.failed);
    }
    Ok(())
}
