use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportError {
    #[error("failed to parse config {path}: {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("dataset name '{0}' is used by more than one config")]
    DuplicateDataset(String),

    #[error("dataset '{0}' has no target bucket")]
    EmptyTargetBucket(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("datasets not loaded: {0}")]
    DatasetsNotLoaded(String),

    #[error("users not loaded: {0}")]
    UsersNotLoaded(String),

    #[error("resource '{0}' is declared more than once")]
    ResourceConflict(String),

    #[error("bucket '{0}' already has a notification configuration")]
    NotificationAlreadyDeclared(String),

    #[error("missing environment variable: {0}")]
    MissingEnvironment(String),

    #[error("invalid environment variable: {0}")]
    InvalidEnvironment(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ExportError {
    pub(crate) fn config_parse(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        ExportError::ConfigParse {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ExportError {
    fn from(err: serde_yaml::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}
