use super::TrainingSession;
use super::storage;
use crate::persistence::PersistenceError;
use adrate_common::Event;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::info;

/// Gate in front of the session plus a flat, append-only audit log of every
/// offered event.
pub struct ActionRecorder {
    recording: bool,
    log: Vec<Event>,
    log_dir: PathBuf,
}

impl ActionRecorder {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            recording: false,
            log: Vec::new(),
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn start(&mut self) {
        self.recording = true;
        info!("Action recording started");
    }

    pub fn stop(&mut self) {
        self.recording = false;
        info!("Action recording stopped");
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Log `event` and, while recording, forward it to `session`.
    /// Returns whether it was forwarded.
    pub fn offer(&mut self, event: Event, session: &mut TrainingSession) -> bool {
        let forwarded = self.recording;
        if forwarded {
            session.add_action(event.clone());
        }
        self.log.push(event);
        forwarded
    }

    pub fn log(&self) -> &[Event] {
        &self.log
    }

    /// Write the log to `log_dir` and clear it. Nothing is written for an
    /// empty log. On failure the log is kept.
    pub fn flush(&mut self) -> Result<Option<PathBuf>, PersistenceError> {
        if self.log.is_empty() {
            return Ok(None);
        }
        let path = storage::write_action_log(&self.log_dir, &self.log)?;
        let written = mem::take(&mut self.log).len();
        info!("Flushed {} actions to {}", written, path.display());
        Ok(Some(path))
    }
}
