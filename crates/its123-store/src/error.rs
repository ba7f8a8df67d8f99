//! Error types for storage backends
//!
//! These never cross the [`PersistentStore`](crate::PersistentStore)
//! boundary. The store logs them and reports a miss instead.

use std::path::PathBuf;

/// Backend failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend rejected the operation (quota, disabled, ...)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// IO error on a file-backed store
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_mentions_path() {
        let err = StoreError::io_error(
            "/tmp/its123.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/its123.json"));
    }
}
