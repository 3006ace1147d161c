//! Error type shared by every stage of a training run
//!
//! Errors fall into three kinds: precondition violations (bad shapes, zero
//! sampling steps, grid/channel mismatches, invalid configuration), I/O
//! failures (checkpoints, logs, image export, data decoding) and numeric
//! failures (a non-finite loss). All of them are fatal to a run.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of a [`TrainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Io,
    Numeric,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image failure on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("serialization failure on {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt checkpoint at {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("numeric failure: {0}")]
    Numeric(String),
}

impl TrainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrainError::Precondition(_) | TrainError::Config(_) => ErrorKind::Precondition,
            TrainError::Io { .. }
            | TrainError::Image { .. }
            | TrainError::Serialization { .. }
            | TrainError::CorruptCheckpoint { .. } => ErrorKind::Io,
            TrainError::Numeric(_) => ErrorKind::Numeric,
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        TrainError::Precondition(message.into())
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        TrainError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn image(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        TrainError::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn serialization(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        TrainError::Serialization {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        TrainError::CorruptCheckpoint {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            TrainError::precondition("zero step").kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            TrainError::Config("bad gamma".into()).kind(),
            ErrorKind::Precondition
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(TrainError::io("loss.txt", io).kind(), ErrorKind::Io);
        assert_eq!(TrainError::corrupt("model", "bad digest").kind(), ErrorKind::Io);
        assert_eq!(TrainError::Numeric("nan".into()).kind(), ErrorKind::Numeric);
    }

    #[test]
    fn test_display_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TrainError::io("model/checkpoint.json", io);
        let text = err.to_string();
        assert!(text.contains("model/checkpoint.json"));
        assert!(text.contains("denied"));
    }
}
