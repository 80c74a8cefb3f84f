use super::storage::{self, TRAINING_DATA_PREFIX};
use super::{SequenceOutcome, SessionError, SessionState, TrainingExample};
use crate::config::TrainingConfig;
use crate::features::{self, FeatureVector};
use crate::model::{RatingModel, TrainingSummary};
use adrate_common::{Event, Rating};
use chrono::Local;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the open sequence buffer and the rated corpus, and drives the
/// rating model over them.
///
/// States are `Idle` and `Recording`. Starting a sequence while one is
/// already open fails with [`SessionError::AlreadyRecording`] and leaves the
/// open buffer as it is.
pub struct TrainingSession {
    state: SessionState,
    current: Vec<Event>,
    // Last closed buffer, kept for predictions made right after a rating.
    last: Vec<Event>,
    corpus: Vec<TrainingExample>,
    model: Arc<RatingModel>,
}

impl TrainingSession {
    pub fn new(model: Arc<RatingModel>) -> Self {
        Self {
            state: SessionState::Idle,
            current: Vec::new(),
            last: Vec::new(),
            corpus: Vec::new(),
            model,
        }
    }

    pub fn with_config(config: TrainingConfig) -> Self {
        Self::new(Arc::new(RatingModel::new(config)))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn current_sequence(&self) -> &[Event] {
        &self.current
    }

    pub fn corpus(&self) -> &[TrainingExample] {
        &self.corpus
    }

    pub fn model(&self) -> &Arc<RatingModel> {
        &self.model
    }

    pub fn start_sequence(&mut self) -> Result<(), SessionError> {
        if self.is_recording() {
            return Err(SessionError::AlreadyRecording);
        }
        self.current.clear();
        self.state = SessionState::Recording;
        info!("Started recording sequence {}", self.corpus.len() + 1);
        Ok(())
    }

    /// Append to the open buffer. Ignored while idle.
    pub fn add_action(&mut self, event: Event) {
        if !self.is_recording() {
            debug!("Ignoring {} event while idle", event.kind);
            return;
        }
        debug!("Recorded {} event", event.kind);
        self.current.push(event);
    }

    /// Close the open sequence with `rating`.
    ///
    /// An out-of-range rating is rejected before anything changes: the
    /// session stays in its current state with the buffer intact.
    pub fn end_sequence(&mut self, rating: f64) -> Result<SequenceOutcome, SessionError> {
        let rating = Rating::new(rating)?;
        self.state = SessionState::Idle;

        if self.current.is_empty() {
            info!("Discarded empty sequence");
            return Ok(SequenceOutcome::Discarded);
        }

        let events = mem::take(&mut self.current);
        self.last = events.clone();
        let count = events.len();
        self.corpus.push(TrainingExample::new(events, rating));
        let index = self.corpus.len() - 1;
        info!(
            "Sequence {} saved with {} events, rating {}",
            index + 1,
            count,
            rating
        );
        Ok(SequenceOutcome::Committed {
            index,
            events: count,
        })
    }

    /// Drop the open buffer without committing. Returns the number of
    /// events dropped.
    pub fn abandon_sequence(&mut self) -> usize {
        let dropped = self.current.len();
        self.current.clear();
        self.state = SessionState::Idle;
        if dropped > 0 {
            info!("Abandoned open sequence with {} events", dropped);
        }
        dropped
    }

    /// Extracted features and ratings for every stored example, in corpus order.
    pub fn training_set(&self) -> Vec<(FeatureVector, Rating)> {
        self.corpus
            .iter()
            .map(|example| (example.features(), example.rating()))
            .collect()
    }

    /// Fit the model on the whole corpus. `Ok(None)` means there was nothing
    /// to train on; the model is left untouched in that case.
    pub fn train_model(&self) -> Result<Option<TrainingSummary>, SessionError> {
        if self.corpus.is_empty() {
            info!("No training data available");
            return Ok(None);
        }
        let summary = self.model.fit(&self.training_set())?;
        Ok(Some(summary))
    }

    /// The open buffer, or the last closed sequence when nothing is open.
    pub fn current_or_last(&self) -> &[Event] {
        if self.current.is_empty() {
            &self.last
        } else {
            &self.current
        }
    }

    pub fn current_features(&self) -> FeatureVector {
        features::extract(self.current_or_last())
    }

    pub fn predict_current(&self) -> Result<f64, SessionError> {
        Ok(self.model.predict(&self.current_features())?)
    }

    pub fn save_training_data(&self, path: &Path) -> Result<(), SessionError> {
        storage::write_corpus(path, &self.corpus)?;
        info!(
            "Saved {} training examples to {}",
            self.corpus.len(),
            path.display()
        );
        Ok(())
    }

    /// Save the corpus into `dir` under a timestamped name and return the path.
    pub fn save_training_snapshot(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let path = storage::unique_timestamped_path(dir, TRAINING_DATA_PREFIX, Local::now());
        self.save_training_data(&path)?;
        Ok(path)
    }

    /// Replace the corpus with the one stored at `path`. On failure the
    /// in-memory corpus is unchanged.
    pub fn load_training_data(&mut self, path: &Path) -> Result<usize, SessionError> {
        let examples = storage::read_corpus(path)?;
        self.corpus = examples;
        info!(
            "Loaded {} training examples from {}",
            self.corpus.len(),
            path.display()
        );
        Ok(self.corpus.len())
    }
}
