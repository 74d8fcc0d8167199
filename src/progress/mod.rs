//! Progress reporting abstraction.
//!
//! The pipeline reports progress through the [`ProgressReporter`] trait so
//! the core never touches a terminal directly. The CLI installs an
//! indicatif-backed [`ConsoleProgress`]; tests and embedders use
//! [`NoOpProgress`].

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Reports pipeline progress. Implementations must be internally
/// synchronized; download workers call [`inc`](Self::inc) concurrently.
pub trait ProgressReporter: Send + Sync {
    /// Set the total number of steps, once known.
    fn set_len(&self, total: u64);

    /// Advance by one step.
    fn inc(&self);

    /// Mark the phase as finished.
    fn finish(&self);
}

/// Progress reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn set_len(&self, _total: u64) {}

    #[inline(always)]
    fn inc(&self) {}

    #[inline(always)]
    fn finish(&self) {}
}

/// Terminal progress rendering on stderr.
pub struct ConsoleProgress {
    bar: ProgressBar,
    clear_on_finish: bool,
}

impl ConsoleProgress {
    /// Indeterminate spinner for the CDX index-fetch phase; each `inc` adds
    /// one to the fetched-page counter. Cleared when finished.
    #[must_use]
    pub fn cdx_spinner() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [1/2] Fetching CDX data ({pos} pages)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            clear_on_finish: true,
        }
    }

    /// Determinate bar for the download phase. Left on screen when finished.
    #[must_use]
    pub fn download_bar() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[2/2] Downloading pages [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            clear_on_finish: false,
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn set_len(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn inc(&self) {
        self.bar.inc(1);
    }

    fn finish(&self) {
        if self.clear_on_finish {
            self.bar.finish_and_clear();
        } else {
            self.bar.finish();
        }
    }
}
