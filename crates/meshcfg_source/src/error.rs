//! Error types for meshcfg sources

use std::io;
use thiserror::Error;

/// Source error type
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Informer unavailable for {gvk}: {message}")]
    InformerUnavailable { gvk: String, message: String },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid content in {path}: {message}")]
    InvalidContent { path: String, message: String },
}

impl SourceError {
    /// Create an extraction error.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create an informer-unavailable error (e.g. the CRD is not installed).
    pub fn informer_unavailable(gvk: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InformerUnavailable {
            gvk: gvk.into(),
            message: msg.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SourceError>;
