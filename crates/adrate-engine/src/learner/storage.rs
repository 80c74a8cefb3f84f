use super::TrainingExample;
use crate::persistence::{self, PersistenceError};
use adrate_common::{Event, Rating};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CORPUS_VERSION: u32 = 1;
pub const TRAINING_DATA_PREFIX: &str = "training_data";
pub const ACTION_LOG_PREFIX: &str = "actions";

fn default_version() -> u32 {
    CORPUS_VERSION
}

/// On-disk corpus: two parallel lists, `sequences[i]` rated `ratings[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    pub sequences: Vec<Vec<Event>>,
    pub ratings: Vec<f64>,
}

impl CorpusDocument {
    pub fn from_examples(examples: &[TrainingExample]) -> Self {
        Self {
            version: CORPUS_VERSION,
            sequences: examples.iter().map(|e| e.sequence().to_vec()).collect(),
            ratings: examples.iter().map(|e| e.rating().value()).collect(),
        }
    }

    /// Validate the document and turn it into corpus entries. `path` is only
    /// used for error reporting.
    pub fn into_examples(self, path: &Path) -> Result<Vec<TrainingExample>, PersistenceError> {
        if self.version != CORPUS_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: self.version,
                expected: CORPUS_VERSION,
            });
        }
        if self.sequences.len() != self.ratings.len() {
            return Err(PersistenceError::malformed(
                path,
                format!(
                    "{} sequences but {} ratings",
                    self.sequences.len(),
                    self.ratings.len()
                ),
            ));
        }

        self.sequences
            .into_iter()
            .zip(self.ratings)
            .enumerate()
            .map(|(i, (sequence, rating))| {
                if sequence.is_empty() {
                    return Err(PersistenceError::malformed(
                        path,
                        format!("sequence {i} is empty"),
                    ));
                }
                let rating = Rating::new(rating).map_err(|e| {
                    PersistenceError::malformed(path, format!("rating {i}: {e}"))
                })?;
                Ok(TrainingExample::new(sequence, rating))
            })
            .collect()
    }
}

pub fn write_corpus(path: &Path, examples: &[TrainingExample]) -> Result<(), PersistenceError> {
    persistence::write_json_atomic(path, &CorpusDocument::from_examples(examples))
}

pub fn read_corpus(path: &Path) -> Result<Vec<TrainingExample>, PersistenceError> {
    let document: CorpusDocument = persistence::read_json(path)?;
    document.into_examples(path)
}

/// `<prefix>_YYYYmmdd_HHMMSS.json`
pub fn timestamped_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}.json", stamp(prefix, at))
}

fn stamp(prefix: &str, at: DateTime<Local>) -> String {
    format!("{prefix}_{}", at.format("%Y%m%d_%H%M%S"))
}

/// A path in `dir` for a new `<prefix>` file stamped `at` that names no
/// existing file. Writes within the same second get `_1`, `_2`, ... suffixes.
pub fn unique_timestamped_path(dir: &Path, prefix: &str, at: DateTime<Local>) -> PathBuf {
    let mut path = dir.join(timestamped_name(prefix, at));
    let stem = stamp(prefix, at);
    let mut n = 1u32;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.json"));
        n += 1;
    }
    path
}

/// Write the flat action log into `dir` under a timestamped name.
pub fn write_action_log(dir: &Path, events: &[Event]) -> Result<PathBuf, PersistenceError> {
    let path = unique_timestamped_path(dir, ACTION_LOG_PREFIX, Local::now());
    persistence::write_json_atomic(&path, &events)?;
    Ok(path)
}

pub fn read_action_log(path: &Path) -> Result<Vec<Event>, PersistenceError> {
    persistence::read_json(path)
}
