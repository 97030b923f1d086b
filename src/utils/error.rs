//! Error Handling Module
//!
//! Defines the error type shared by every stage of the MedNIST pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for MedNIST pipeline operations
#[derive(Error, Debug)]
pub enum MedNistError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset scanning or indexing
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A transform received data it cannot handle
    #[error("Transform error in {step}: {message}")]
    Transform { step: &'static str, message: String },

    /// Error with model construction or checkpoints
    #[error("Model error: {0}")]
    Model(String),

    /// Error during the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network fetch failed
    #[error("Download error: {0}")]
    Download(String),

    /// Downloaded archive does not match the expected digest
    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for MedNistError {
    fn from(err: serde_json::Error) -> Self {
        MedNistError::Serialization(err.to_string())
    }
}

impl From<walkdir::Error> for MedNistError {
    fn from(err: walkdir::Error) -> Self {
        MedNistError::Dataset(err.to_string())
    }
}

/// Convenience Result type for MedNIST operations
pub type Result<T> = std::result::Result<T, MedNistError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| MedNistError::Dataset(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| MedNistError::Dataset(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| MedNistError::Dataset(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| MedNistError::Dataset(f()))
    }
}
