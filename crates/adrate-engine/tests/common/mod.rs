#![allow(dead_code)]

use adrate_engine::ads::{AdElement, AdKind, AdPosition, AdReport};
use adrate_engine::backend::{Backend, BackendError, NavigationResult, ScrollDirection};
use adrate_engine::config::AdrateConfig;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Calls seen by a [`MockBackend`], shared so tests can inspect them after
/// the backend has moved into an agent.
#[derive(Debug, Default)]
pub struct Calls {
    pub launched: bool,
    pub closed: bool,
    pub navigations: Vec<String>,
    pub clicks: Vec<(i64, i64)>,
    pub scrolls: Vec<(ScrollDirection, u32)>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub calls: Arc<Mutex<Calls>>,
    pub ads: AdReport,
    pub fail_detection: bool,
    pub fail_navigation: bool,
}

impl MockBackend {
    pub fn with_ads(ads: AdReport) -> Self {
        Self {
            ads,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().launched = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().closed = true;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        if self.fail_navigation {
            return Err(BackendError::Navigation(format!("cannot reach {url}")));
        }
        self.calls.lock().unwrap().navigations.push(url.to_string());
        Ok(NavigationResult {
            url: url.to_string(),
            title: "Test Page".into(),
        })
    }

    async fn click(&mut self, x: i64, y: i64) -> Result<(), BackendError> {
        self.calls.lock().unwrap().clicks.push((x, y));
        Ok(())
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), BackendError> {
        self.calls.lock().unwrap().scrolls.push((direction, amount));
        Ok(())
    }

    async fn detect_ads(&mut self) -> Result<AdReport, BackendError> {
        if self.fail_detection {
            return Err(BackendError::AdDetection("script failed".into()));
        }
        Ok(self.ads.clone())
    }
}

pub fn sample_ads() -> AdReport {
    AdReport {
        ads: vec![
            AdElement {
                position: AdPosition { x: 10.0, y: 250.0 },
                kind: AdKind::Image,
                text_length: 12,
            },
            AdElement {
                position: AdPosition { x: 10.0, y: 900.0 },
                kind: AdKind::Text,
                text_length: 30,
            },
        ],
    }
}

/// Config with all storage under `root` and a short training schedule.
pub fn test_config(root: &Path) -> AdrateConfig {
    let mut config = AdrateConfig::default();
    config.storage.training_data_dir = root.join("training_data");
    config.storage.model_dir = root.join("models");
    config.storage.log_dir = root.join("logs");
    config.training.epochs = 5;
    config
}
