//! Progress reporting for a vectorization run.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Observer of pipeline progress. Called concurrently from every worker.
pub trait ProgressReporter: Send + Sync {
    /// Number of pending rows at the start of the run.
    fn on_total_known(&self, total: u64);

    /// One row has all of its chunks embedded and saved.
    fn on_row_completed(&self);

    /// A page of rows was loaded into the work queue.
    fn on_page_loaded(&self, _rows: usize) {}

    /// The run has ended, successfully or not.
    fn finish(&self) {}
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn on_total_known(&self, _total: u64) {}

    fn on_row_completed(&self) {}
}

/// Terminal progress bar, one tick per completed row.
pub struct ConsoleProgress {
    bar: ProgressBar,
    pages: AtomicU64,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            pages: AtomicU64::new(0),
        }
    }

    /// A reporter that draws nothing, for machine-readable output.
    pub fn hidden() -> Self {
        let progress = Self::new();
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress
    }

    /// Current position, i.e. completed rows.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn on_total_known(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_message(format!("{} rows pending", total));
    }

    fn on_row_completed(&self) {
        self.bar.inc(1);
    }

    fn on_page_loaded(&self, rows: usize) {
        let page = self.pages.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar.set_message(format!("page {} ({} rows)", page, rows));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
