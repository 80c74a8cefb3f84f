use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed document {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Unsupported format version {found} in {} (expected {expected})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Tensor store error on {}: {message}", path.display())]
    Tensors { path: PathBuf, message: String },

    #[error(
        "Failed to replace {} ({source}) and to restore it from {} ({restore})",
        path.display(),
        previous.display()
    )]
    RestoreFailed {
        path: PathBuf,
        previous: PathBuf,
        #[source]
        source: std::io::Error,
        restore: std::io::Error,
    },
}

impl PersistenceError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        PersistenceError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PersistenceError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// `path` with `.suffix` appended to its final component.
pub(crate) fn sibling(path: &Path, suffix: &str) -> Result<PathBuf, PersistenceError> {
    let name = path
        .file_name()
        .ok_or_else(|| PersistenceError::malformed(path, "path has no final component"))?;
    let mut name = name.to_os_string();
    name.push(".");
    name.push(suffix);
    Ok(path.with_file_name(name))
}

/// Serialize `value` as pretty JSON and move it into place with a rename,
/// so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }

    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

    let tmp = sibling(path, "tmp")?;
    fs::write(&tmp, bytes).map_err(|e| PersistenceError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PersistenceError::io(path, e));
    }
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let content = fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_slice(&content).map_err(|source| PersistenceError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}
