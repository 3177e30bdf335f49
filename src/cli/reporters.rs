//! Progress reporters used by the command-line frontend

use crate::{
    error::RemovalError,
    models::ModelKind,
    services::progress::{BatchProgress, ConsoleProgressReporter, ProgressReporter},
    types::BatchSummary,
};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Pick the reporter matching the requested output mode
pub(crate) fn create_cli_progress_reporter(json: bool, verbose: u8) -> Box<dyn ProgressReporter> {
    if json {
        Box::new(JsonProgressReporter::new(std::io::stdout()))
    } else if verbose > 0 {
        // Log lines and a redrawn bar do not mix well
        Box::new(ConsoleProgressReporter::new(verbose > 1))
    } else {
        Box::new(IndicatifProgressReporter::new())
    }
}

/// Terminal progress bar
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_batch_started(&self, total: usize, model: ModelKind) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_message(format!("Removing backgrounds with {}", model));
    }

    fn report_progress(&self, update: &BatchProgress) {
        self.bar.set_position(update.completed as u64);
        self.bar.set_message(update.current_item.clone());
    }

    fn report_item_failed(&self, name: &str, error: &RemovalError) {
        self.bar.println(format!("❌ Failed to process {}: {}", name, error));
    }

    fn report_batch_finished(&self, summary: &BatchSummary) {
        self.bar.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            summary.processed, summary.failed
        ));
    }
}

/// One JSON object per line
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent<'a> {
    BatchStarted {
        total: usize,
        model: ModelKind,
    },
    Progress {
        #[serde(flatten)]
        progress: &'a BatchProgress,
        fraction: f64,
    },
    ItemFailed {
        file: &'a str,
        error: String,
    },
    BatchFinished {
        #[serde(flatten)]
        summary: &'a BatchSummary,
        success_rate: f64,
        finished_at: DateTime<Utc>,
    },
}

/// Machine-readable reporter writing JSON lines to `out`
pub(crate) struct JsonProgressReporter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonProgressReporter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &JsonEvent<'_>) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Failed to serialize progress event: {}", e);
                return;
            },
        };

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{}", line).and_then(|()| out.flush()) {
            log::debug!("Failed to write progress event: {}", e);
        }
    }
}

impl<W: Write + Send> ProgressReporter for JsonProgressReporter<W> {
    fn report_batch_started(&self, total: usize, model: ModelKind) {
        self.emit(&JsonEvent::BatchStarted { total, model });
    }

    fn report_progress(&self, update: &BatchProgress) {
        self.emit(&JsonEvent::Progress {
            progress: update,
            fraction: update.fraction(),
        });
    }

    fn report_item_failed(&self, name: &str, error: &RemovalError) {
        self.emit(&JsonEvent::ItemFailed {
            file: name,
            error: error.to_string(),
        });
    }

    fn report_batch_finished(&self, summary: &BatchSummary) {
        self.emit(&JsonEvent::BatchFinished {
            summary,
            success_rate: summary.success_rate(),
            finished_at: Utc::now(),
        });
    }
}
