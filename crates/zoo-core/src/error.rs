//! Error types for model resolution and checkpoint management

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Family;

/// Result type alias using the zoo Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by the resolver, reconciler and checkpoint store
#[derive(Error, Debug)]
pub enum Error {
    // Resolution errors
    #[error("Invalid model family: {family} (expected one of: classification, segmentation)")]
    InvalidFamily { family: String },

    #[error("Unknown {family} architecture: {name}")]
    UnknownArchitecture { family: Family, name: String },

    #[error("No vanilla constructor found for model name: {name}")]
    NoVanillaConstructor { name: String },

    #[error("Architecture {name} passed catalog validation but has no constructor registered")]
    DispatchGap { name: String },

    #[error("No pretrained weights for {architecture} (source: {})", .weights.as_deref().unwrap_or("none"))]
    PretrainedUnavailable {
        architecture: String,
        weights: Option<String>,
    },

    #[error("Cannot replace head {module} of {architecture}: {reason}")]
    HeadMismatch {
        architecture: String,
        module: String,
        reason: String,
    },

    // State dict errors
    #[error("Parameter sets differ: missing {missing:?}, unexpected {unexpected:?}")]
    ParameterSetMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error(
        "Error loading state dict: missing {missing:?}, unexpected {unexpected:?}, shape mismatch {mismatched:?}"
    )]
    StateDictLoad {
        missing: Vec<String>,
        unexpected: Vec<String>,
        mismatched: Vec<String>,
    },

    #[error("Invalid tensor: {reason}")]
    InvalidTensor { reason: String },

    // Checkpoint errors
    #[error("No checkpoint found at {}", .path.display())]
    CheckpointNotFound { path: PathBuf },

    #[error("Checkpoint corrupted: {} - {reason}", .path.display())]
    CheckpointCorrupted { path: PathBuf, reason: String },

    #[error("Unsupported checkpoint version {version} in {}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error indicates an incompatibility the caller
    /// cannot recover from without changing architecture, weights or config
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ParameterSetMismatch { .. }
                | Error::DispatchGap { .. }
                | Error::CheckpointCorrupted { .. }
                | Error::InvalidConfig { .. }
        )
    }

    /// Returns true if this error was raised while validating a request,
    /// before anything was constructed
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidFamily { .. }
                | Error::UnknownArchitecture { .. }
                | Error::NoVanillaConstructor { .. }
                | Error::InvalidConfig { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
