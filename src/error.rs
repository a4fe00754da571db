//! Error types for the chronoprobe harness.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the chronoprobe harness.
///
/// Configuration errors (`Config`, `Scenario`, `Suite`) abort a campaign
/// before any interaction runs. Backend errors are captured into the failing
/// record by the orchestrator and never propagate past it.
#[derive(Error, Debug)]
pub enum Error {
    /// Campaign/clock configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown scenario name
    #[error("Unknown scenario: {name}")]
    Scenario { name: String },

    /// Unknown detector suite name
    #[error("Unknown detector suite: {name}")]
    Suite { name: String },

    /// Detector construction or evaluation errors
    #[error("Detector error: {detector}: {message}")]
    Detector { detector: String, message: String },

    /// Backend invocation errors
    #[error("Backend error: {backend}: {message}")]
    Backend { backend: String, message: String },

    /// Model registry errors
    #[error("Registry error: {0}")]
    Registry(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an unknown-scenario error.
    pub fn scenario(name: impl Into<String>) -> Self {
        Self::Scenario { name: name.into() }
    }

    /// Create an unknown-suite error.
    pub fn suite(name: impl Into<String>) -> Self {
        Self::Suite { name: name.into() }
    }

    /// Create a detector error.
    pub fn detector(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Detector {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Box::new(err))
    }
}
