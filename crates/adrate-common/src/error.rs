/// Failures reported by a browser backend.
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("No element at ({x}, {y})")]
    NoElementAt { x: i64, y: i64 },

    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Ad detection failed: {0}")]
    AdDetection(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not ready")]
    NotReady,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other: {0}")]
    Other(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl BackendError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Navigation(_) => "NAVIGATION_ERROR",
            BackendError::NoElementAt { .. } => "ELEMENT_NOT_FOUND",
            BackendError::Script(_) => "SCRIPT_ERROR",
            BackendError::AdDetection(_) => "AD_DETECTION_FAILED",
            BackendError::ConnectionLost => "CONNECTION_LOST",
            BackendError::NotReady => "NOT_READY",
            BackendError::Io(_) => "IO_ERROR",
            BackendError::Serialization(_) => "SERIALIZATION_ERROR",
            BackendError::Other(_) => "UNKNOWN_ERROR",
            BackendError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectionLost | BackendError::NotReady
        )
    }
}
