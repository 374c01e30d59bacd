//! Error types for the composer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("song has no sections to generate against")]
    EmptyTimeline,
    #[error("scale {0} has no notes")]
    EmptyScale(String),
    #[error("invalid pattern library: {0}")]
    InvalidPatternLibrary(String),
    #[error("invalid vocal profile table: {0}")]
    InvalidProfile(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("MIDI error: {0}")]
    Midi(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompositionError>;
