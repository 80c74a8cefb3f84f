//! `WebAgent`: a browser backend wired to the training session.
//!
//! Every browser primitive that succeeds is turned into an [`Event`] and
//! offered to the [`ActionRecorder`], which forwards it to the session while a
//! training sequence is open.

use crate::backend::{Backend, BackendError, NavigationResult, ScrollDirection};
use crate::config::AdrateConfig;
use crate::features;
use crate::learner::{ActionRecorder, SequenceOutcome, SessionError, TrainingSession};
use crate::model::{ModelError, RatingModel, TrainingSummary};
use crate::persistence::PersistenceError;
use adrate_common::{AdReport, Event};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Training worker failed: {0}")]
    Worker(String),
}

impl AgentError {
    /// True when the failure means no model is available yet.
    pub fn is_not_fitted(&self) -> bool {
        matches!(
            self,
            AgentError::Model(ModelError::NotFitted)
                | AgentError::Session(SessionError::Model(ModelError::NotFitted))
        )
    }
}

/// A prediction for the page currently loaded, with the ads it was based on.
#[derive(Debug, Clone)]
pub struct PagePrediction {
    pub prediction: f64,
    pub ads: AdReport,
}

pub struct WebAgent<B: Backend> {
    backend: B,
    session: TrainingSession,
    recorder: ActionRecorder,
    config: AdrateConfig,
}

impl<B: Backend> WebAgent<B> {
    pub fn new(backend: B, config: AdrateConfig) -> Self {
        let model = Arc::new(RatingModel::new(config.training.clone()));
        Self {
            backend,
            session: TrainingSession::new(model),
            recorder: ActionRecorder::new(config.storage.log_dir.clone()),
            config,
        }
    }

    pub fn config(&self) -> &AdrateConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn session(&self) -> &TrainingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TrainingSession {
        &mut self.session
    }

    pub fn recorder(&self) -> &ActionRecorder {
        &self.recorder
    }

    pub async fn launch(&mut self) -> Result<(), AgentError> {
        self.backend.launch().await?;
        info!("Browser backend launched");
        Ok(())
    }

    fn record(&mut self, event: Event) {
        self.recorder.offer(event, &mut self.session);
    }

    pub async fn navigate(&mut self, url: &str) -> Result<NavigationResult, AgentError> {
        let result = self.backend.navigate(url).await?;
        self.record(Event::navigate(url));
        info!("Navigated to {}", url);
        Ok(result)
    }

    pub async fn click(&mut self, x: i64, y: i64) -> Result<(), AgentError> {
        self.backend.click(x, y).await?;
        self.record(Event::click(x, y));
        info!("Clicked at coordinates ({}, {})", x, y);
        Ok(())
    }

    pub async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: u32,
    ) -> Result<(), AgentError> {
        self.backend.scroll(direction, amount).await?;
        self.record(Event::scroll(direction.as_str(), i64::from(amount)));
        info!("Scrolled {} by {} pixels", direction, amount);
        Ok(())
    }

    /// Inspect the page for ads. `Ok` with an empty report means none were
    /// found; `Err` means detection itself failed. When ads are found their
    /// summary is recorded as an `ad_detected` event.
    pub async fn detect_ad_content(&mut self) -> Result<AdReport, AgentError> {
        let report = self.backend.detect_ads().await?;
        match report.metadata() {
            Some(metadata) => {
                info!("Detected {} ads", report.count());
                self.record(metadata.to_event());
            }
            None => info!("No ads found"),
        }
        Ok(report)
    }

    pub async fn page_text(&mut self) -> Result<String, AgentError> {
        Ok(self.backend.page_text().await?)
    }

    pub async fn screenshot(&mut self) -> Result<Vec<u8>, AgentError> {
        Ok(self.backend.screenshot().await?)
    }

    pub fn start_training_sequence(&mut self) -> Result<(), AgentError> {
        self.session.start_sequence()?;
        self.recorder.start();
        Ok(())
    }

    /// Close the open sequence with `rating`. With `training.auto_train`, a
    /// committed sequence immediately refits the model.
    pub async fn end_training_sequence(
        &mut self,
        rating: f64,
    ) -> Result<SequenceOutcome, AgentError> {
        let outcome = self.session.end_sequence(rating)?;
        self.recorder.stop();

        if self.config.training.auto_train && matches!(outcome, SequenceOutcome::Committed { .. }) {
            self.train_model().await?;
        }
        Ok(outcome)
    }

    /// Close the open sequence with `rating` (or discard it when `None`) and
    /// open the next one.
    ///
    /// The next sequence is opened even when the auto-train fit fails, and
    /// that failure is returned afterwards. A rejected rating leaves the
    /// current sequence open.
    pub async fn next_training_sequence(
        &mut self,
        rating: Option<f64>,
    ) -> Result<SequenceOutcome, AgentError> {
        let ended = match rating {
            Some(rating) => self.end_training_sequence(rating).await,
            None => {
                self.session.abandon_sequence();
                self.recorder.stop();
                Ok(SequenceOutcome::Discarded)
            }
        };
        if !self.session.is_recording() {
            self.start_training_sequence()?;
        }
        ended
    }

    /// Fit the model on the corpus on a blocking worker. `Ok(None)` when the
    /// corpus is empty.
    pub async fn train_model(&self) -> Result<Option<TrainingSummary>, AgentError> {
        let examples = self.session.training_set();
        if examples.is_empty() {
            info!("No training data available");
            return Ok(None);
        }

        let model = Arc::clone(self.session.model());
        let summary = tokio::task::spawn_blocking(move || model.fit(&examples))
            .await
            .map_err(|e| AgentError::Worker(e.to_string()))??;
        Ok(Some(summary))
    }

    /// Predict the rating of the open (or last) sequence.
    pub fn predict_rating(&self) -> Result<f64, AgentError> {
        Ok(self.session.predict_current()?)
    }

    /// Detect ads on the current page and predict a rating from the open (or
    /// last) sequence together with those ads.
    pub async fn predict_page(&mut self) -> Result<PagePrediction, AgentError> {
        let ads = self.detect_ad_content().await?;

        let mut events = self.session.current_or_last().to_vec();
        if !self.session.is_recording() {
            events.extend(ads.metadata().map(|m| m.to_event()));
        }
        let prediction = self.session.model().predict(&features::extract(&events))?;
        Ok(PagePrediction { prediction, ads })
    }

    /// Write the corpus to the training data directory under a timestamped name.
    pub fn save_training_data(&self) -> Result<PathBuf, AgentError> {
        Ok(self
            .session
            .save_training_snapshot(&self.config.storage.training_data_dir)?)
    }

    pub fn load_training_data(&mut self, path: &std::path::Path) -> Result<usize, AgentError> {
        Ok(self.session.load_training_data(path)?)
    }

    pub fn save_model(&self) -> Result<(), AgentError> {
        self.session.model().save(&self.config.storage.model_dir)?;
        Ok(())
    }

    pub fn load_model(&self) -> Result<(), AgentError> {
        self.session.model().load(&self.config.storage.model_dir)?;
        Ok(())
    }

    /// Stop recording, drop any open sequence, flush the action log and close
    /// the backend. The backend is closed even when the flush fails. Returns
    /// the action log path, if one was written.
    pub async fn close(&mut self) -> Result<Option<PathBuf>, AgentError> {
        self.recorder.stop();
        self.session.abandon_sequence();

        let flushed = self.recorder.flush();
        if let Err(e) = &flushed {
            warn!("Failed to flush action log: {}", e);
        }
        self.backend.close().await?;
        info!("Browser closed");
        Ok(flushed?)
    }
}
