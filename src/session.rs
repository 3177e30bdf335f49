//! Session-scoped result store
//!
//! A [`Session`] keeps the successful results of the runs a user triggered,
//! together with the inputs and model those results belong to. Changing either
//! the file set or the model discards stale results before anything else
//! happens.

use crate::{
    dispatcher::Dispatcher,
    error::Result,
    models::ModelKind,
    services::progress::ProgressReporter,
    types::{BatchOutcome, ProcessedItem, UploadedImage},
};

/// The input set and model of the most recent run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub files: Vec<UploadedImage>,
    pub model: Option<ModelKind>,
}

impl RunState {
    /// Whether `files` and `model` describe the same run as this state
    #[must_use]
    pub fn matches(&self, files: &[UploadedImage], model: ModelKind) -> bool {
        self.model == Some(model) && self.files.as_slice() == files
    }
}

/// Result store plus run state, owned by one frontend
#[derive(Debug, Default)]
pub struct Session {
    results: Vec<ProcessedItem>,
    run_state: RunState,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current inputs, clearing stored results when they changed
    ///
    /// Returns `true` when the store was invalidated.
    pub fn sync_inputs(&mut self, files: &[UploadedImage], model: ModelKind) -> bool {
        if self.run_state.matches(files, model) {
            return false;
        }

        if !self.results.is_empty() {
            log::info!(
                "Inputs or model changed, discarding {} stored result(s)",
                self.results.len()
            );
        }
        self.results.clear();
        self.run_state = RunState {
            files: files.to_vec(),
            model: Some(model),
        };
        true
    }

    /// Run a batch and append its successes to the store
    ///
    /// Unchanged inputs keep the existing results, so a repeated run appends
    /// a second copy after them.
    ///
    /// # Errors
    /// - Any error returned by [`Dispatcher::dispatch`]
    pub async fn process(
        &mut self,
        dispatcher: &Dispatcher,
        files: &[UploadedImage],
        model: ModelKind,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchOutcome> {
        self.sync_inputs(files, model);

        let outcome = dispatcher.dispatch(files.to_vec(), model, reporter).await?;
        self.results.extend(outcome.processed.iter().cloned());

        Ok(outcome)
    }

    /// Empty the store and forget the last run
    pub fn clear(&mut self) {
        self.results.clear();
        self.run_state = RunState::default();
    }

    /// Stored results in completion order
    #[must_use]
    pub fn results(&self) -> &[ProcessedItem] {
        &self.results
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }
}
