use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveDiffError {
    /// A comparison root is missing, not a directory, or unreadable.
    #[error("Cannot access root {path}: {reason}")]
    Access { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    /// A background run finished without delivering a result.
    #[error("Comparison cancelled")]
    Cancelled,
}

impl DriveDiffError {
    pub fn access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Access {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error aborted a run before any work was scheduled.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Access { .. } | Self::Config(_) | Self::Pool(_))
    }
}

pub type Result<T> = std::result::Result<T, DriveDiffError>;

/// Classification of a single-file failure recorded in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FileErrorKind {
    PermissionDenied,
    NotFound,
    Other,
}

impl From<&std::io::Error> for FileErrorKind {
    fn from(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DriveDiffError::access("/nope", "missing").is_fatal());
        assert!(DriveDiffError::Config("bad".to_string()).is_fatal());
        assert!(!DriveDiffError::Cancelled.is_fatal());
    }

    #[test]
    fn test_io_kind_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(FileErrorKind::from(&err), FileErrorKind::PermissionDenied);
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(FileErrorKind::from(&err), FileErrorKind::NotFound);
    }
}
