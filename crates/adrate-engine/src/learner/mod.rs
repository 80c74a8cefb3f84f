//! Sequence capture and the rated training corpus.
//!
//! [`TrainingSession`] owns sequence boundaries and the corpus of
//! [`TrainingExample`]s; [`ActionRecorder`] gates the inbound event stream
//! into it and keeps the flat audit log.

pub mod recorder;
pub mod session;
pub mod storage;

use crate::features::{self, FeatureVector};
use crate::model::ModelError;
use crate::persistence::PersistenceError;
use adrate_common::{Event, Rating, RatingError};
use thiserror::Error;

pub use recorder::ActionRecorder;
pub use session::TrainingSession;
pub use storage::CorpusDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error("A sequence is already being recorded")]
    AlreadyRecording,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A closed, rated sequence. Never mutated once created.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    sequence: Vec<Event>,
    rating: Rating,
}

impl TrainingExample {
    pub(crate) fn new(sequence: Vec<Event>, rating: Rating) -> Self {
        Self { sequence, rating }
    }

    pub fn sequence(&self) -> &[Event] {
        &self.sequence
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn features(&self) -> FeatureVector {
        features::extract(&self.sequence)
    }
}

/// What `end_sequence` did with the open buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Stored as corpus entry `index`.
    Committed { index: usize, events: usize },
    /// The buffer was empty; nothing was stored.
    Discarded,
}
