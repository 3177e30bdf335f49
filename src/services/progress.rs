//! Progress reporting service
//!
//! This module separates progress reporting concerns from the dispatcher,
//! allowing different frontends to implement their own progress handling.
//! Reporters are only ever called from the task that collects results, one
//! call per completed item.

use crate::{error::RemovalError, models::ModelKind, types::BatchSummary};
use instant::Instant;
use serde::Serialize;

/// Aggregate state of a running batch after one more item completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    /// Items finished so far, successes and failures alike
    pub completed: usize,
    pub total: usize,
    /// Items among `completed` that failed
    pub failed: usize,
    /// Filename of the item that just completed
    pub current_item: String,
    /// Elapsed time since the batch started (milliseconds)
    pub elapsed_ms: u64,
    /// Estimated time remaining (seconds, if available)
    pub eta_seconds: Option<u64>,
}

impl BatchProgress {
    /// Completed fraction in [0, 1], exactly 1.0 once every item finished
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Completed percentage (0-100)
    #[must_use]
    pub fn percentage(&self) -> u8 {
        (self.fraction() * 100.0).round().clamp(0.0, 100.0) as u8
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Trait for reporting batch progress
pub trait ProgressReporter: Send + Sync {
    /// Called once before any item is dispatched
    fn report_batch_started(&self, total: usize, model: ModelKind) {
        let _ = (total, model);
    }

    /// Called exactly once per completed item
    fn report_progress(&self, update: &BatchProgress);

    /// Called for every item that failed, before the matching progress update
    fn report_item_failed(&self, name: &str, error: &RemovalError);

    /// Called once after the last item completed
    fn report_batch_finished(&self, summary: &BatchSummary);
}

/// No-op progress reporter for when progress reporting is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: &BatchProgress) {}

    fn report_item_failed(&self, _name: &str, _error: &RemovalError) {}

    fn report_batch_finished(&self, _summary: &BatchSummary) {}
}

/// Console progress reporter writing through the `log` facade
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show timing and ETA for every item
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Format a simple progress bar
    fn progress_bar(percentage: u8) -> String {
        let filled = (usize::from(percentage.min(100)) * 20) / 100;
        let empty = 20 - filled;
        format!("{}{}", "█".repeat(filled), "░".repeat(empty))
    }

    /// Format ETA in seconds to human-readable string
    fn format_eta(eta_seconds: Option<u64>) -> String {
        match eta_seconds {
            Some(seconds) if seconds < 60 => format!("{}s", seconds),
            Some(seconds) => format!("{}m {}s", seconds / 60, seconds % 60),
            None => "calculating...".to_string(),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_batch_started(&self, total: usize, model: ModelKind) {
        log::info!("📁 Processing {} image(s) with model {}", total, model);
    }

    fn report_progress(&self, update: &BatchProgress) {
        if self.verbose {
            log::info!(
                "[{}] {}/{} {} ({}ms elapsed, ETA {})",
                Self::progress_bar(update.percentage()),
                update.completed,
                update.total,
                update.current_item,
                update.elapsed_ms,
                Self::format_eta(update.eta_seconds)
            );
        } else {
            log::info!(
                "[{}%] {}/{} {}",
                update.percentage(),
                update.completed,
                update.total,
                update.current_item
            );
        }
    }

    fn report_item_failed(&self, name: &str, error: &RemovalError) {
        if error.is_item_error() {
            log::warn!("❌ Error processing {}: {}", name, error);
        } else {
            log::error!("❌ Error processing {}: {}", name, error);
        }
    }

    fn report_batch_finished(&self, summary: &BatchSummary) {
        log::info!(
            "✅ Processed {}/{} image(s) in {}ms",
            summary.processed,
            summary.total,
            summary.elapsed_ms
        );
        if summary.failed > 0 {
            log::warn!("⚠️ {} image(s) failed", summary.failed);
        }
    }
}

/// Builds [`BatchProgress`] values as items complete
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    failed: usize,
    start_time: Instant,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one completion and return the resulting progress
    pub fn record(&mut self, item_name: &str, succeeded: bool) -> BatchProgress {
        self.completed += 1;
        if !succeeded {
            self.failed += 1;
        }

        let elapsed = self.start_time.elapsed();
        let remaining = self.total.saturating_sub(self.completed);
        let eta_seconds = if self.completed > 0 && remaining > 0 {
            let per_item = elapsed.as_secs_f64() / self.completed as f64;
            Some((per_item * remaining as f64).round() as u64)
        } else if remaining == 0 {
            Some(0)
        } else {
            None
        };

        BatchProgress {
            completed: self.completed,
            total: self.total,
            failed: self.failed,
            current_item: item_name.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            eta_seconds,
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Elapsed time since the tracker was created
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
