use std::path::PathBuf;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors that can occur while loading the CIFAR-10 dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("dataset file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("malformed CIFAR batch {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to save model: {0}")]
    ModelSave(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while uploading artifacts to object storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write object {key}: {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },

    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("missing credentials: {0}")]
    Credentials(String),
}

/// Errors that can occur during a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("visualization error: {0}")]
    Viz(String),

    #[error("training produced a non-finite loss at epoch {epoch}, step {step}")]
    NonFiniteLoss { epoch: usize, step: usize },

    #[error("classification mode '{mode}' requires a pretrained experiment")]
    MissingPretrained { mode: String },
}
