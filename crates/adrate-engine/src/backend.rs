use adrate_common::AdReport;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub use adrate_common::BackendError;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }

    /// Vertical pixel delta for `amount`.
    pub fn delta(self, amount: u32) -> i64 {
        match self {
            ScrollDirection::Up => -i64::from(amount),
            ScrollDirection::Down => i64::from(amount),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            other => Err(format!("unknown scroll direction '{other}' (expected up or down)")),
        }
    }
}

/// Browser control surface the agent drives. Implementations only perform
/// the primitive; recording is the agent's job.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start browser, connect to remote, etc.)
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the backend and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Click whatever element sits at viewport coordinates `(x, y)`.
    async fn click(&mut self, x: i64, y: i64) -> Result<(), BackendError>;

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), BackendError>;

    /// Inspect the current page for ads. An empty report means none were found.
    async fn detect_ads(&mut self) -> Result<AdReport, BackendError>;

    async fn page_text(&mut self) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("page_text".into()))
    }

    /// Capture a PNG screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotSupported("screenshot".into()))
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::NotSupported("execute_script".into()))
    }
}
