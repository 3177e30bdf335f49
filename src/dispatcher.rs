//! Bounded-concurrency batch dispatcher
//!
//! Every item runs [`process_image`] on tokio's blocking pool. A semaphore caps
//! how many run at once and results are collected in completion order by the
//! calling task, which is also the only place progress is aggregated.

use crate::{
    config::BatchConfig,
    error::{RemovalError, Result},
    inference::SegmenterFactory,
    models::ModelKind,
    processor::{panic_message, process_image},
    services::progress::{ProgressReporter, ProgressTracker},
    types::{BatchOutcome, FailedItem, ProcessedItem, UploadedImage},
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// What one worker hands back: the input filename and its result
type WorkerOutput = (String, Result<ProcessedItem>);

/// Fans a batch out over the blocking pool
#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<dyn SegmenterFactory>,
    config: Arc<BatchConfig>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("backend", &self.factory.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(factory: Arc<dyn SegmenterFactory>, config: BatchConfig) -> Self {
        Self {
            factory,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every item with `model`, at most `effective_concurrency()` at a time
    ///
    /// Per-item failures are reported through `reporter` and collected in
    /// [`BatchOutcome::failed`]; they never abort the other items. The reporter
    /// receives exactly one progress update per item.
    ///
    /// # Errors
    /// - `EmptyBatch` when `items` is empty
    /// - `Internal` when a worker is cancelled or the worker pool shuts down
    #[instrument(skip_all, fields(items = items.len(), model = %model, backend = self.factory.name()))]
    pub async fn dispatch(
        &self,
        items: Vec<UploadedImage>,
        model: ModelKind,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchOutcome> {
        if items.is_empty() {
            return Err(RemovalError::EmptyBatch);
        }

        let total = items.len();
        let workers = self.config.effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(workers));
        debug!(total, workers, "Dispatching batch");
        reporter.report_batch_started(total, model);

        let mut tasks: JoinSet<Result<WorkerOutput>> = JoinSet::new();
        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let config = Arc::clone(&self.config);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| RemovalError::internal("Worker semaphore closed"))?;

                let name = item.name.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    process_image(&item, model, factory.as_ref(), &config)
                })
                .await;

                // Segmenter panics are caught inside `process_image`; this
                // covers the rest of the worker
                match joined {
                    Ok(result) => Ok((name, result)),
                    Err(e) if e.is_panic() => {
                        let message = panic_message(e.into_panic().as_ref());
                        Ok((
                            name,
                            Err(RemovalError::segmentation(format!(
                                "Worker panicked: {}",
                                message
                            ))),
                        ))
                    },
                    Err(e) => Err(RemovalError::internal(format!(
                        "Worker for {} was cancelled: {}",
                        name, e
                    ))),
                }
            });
        }

        let mut tracker = ProgressTracker::new(total);
        let mut processed = Vec::with_capacity(total);
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (name, result) = joined
                .map_err(|e| RemovalError::internal(format!("Worker task failed: {}", e)))??;

            let progress = match result {
                Ok(item) => {
                    processed.push(item);
                    tracker.record(&name, true)
                },
                Err(error) => {
                    warn!(file = %name, error = %error, "Failed to process image");
                    reporter.report_item_failed(&name, &error);
                    failed.push(FailedItem { name: name.clone(), error });
                    tracker.record(&name, false)
                },
            };
            reporter.report_progress(&progress);
        }

        let outcome = BatchOutcome {
            processed,
            failed,
            total,
            elapsed: tracker.elapsed(),
        };
        reporter.report_batch_finished(&outcome.summary());
        debug!(
            processed = outcome.processed.len(),
            failed = outcome.failed.len(),
            "Batch finished"
        );

        Ok(outcome)
    }
}
