//! Error types for anki-tts

use crate::speech::BackendTier;
use std::io;
use thiserror::Error;

/// Main error type for anki-tts
#[derive(Error, Debug)]
pub enum AnkiTtsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("AnkiConnect error: {0}")]
    AnkiConnect(String),

    /// Dependency missing or permanently broken; the tier is skipped until reset
    #[error("{tier} unavailable: {reason}")]
    BackendUnavailable { tier: BackendTier, reason: String },

    /// Dependency not there yet (e.g. model still downloading); retried next call
    #[error("{tier} not ready: {reason}")]
    BackendNotReady { tier: BackendTier, reason: String },

    /// Failure while producing an utterance
    #[error("{tier} failed: {reason}")]
    BackendFailure { tier: BackendTier, reason: String },

    /// The utterance was superseded while it was being rendered
    #[error("Utterance superseded")]
    Cancelled,

    #[error("Failed to start playback: {0}")]
    PlaybackSpawn(String),

    #[error("{0}")]
    Other(String),
}

impl AnkiTtsError {
    /// Short reason string suitable for a status notification
    pub fn reason(&self) -> String {
        match self {
            AnkiTtsError::BackendUnavailable { reason, .. }
            | AnkiTtsError::BackendNotReady { reason, .. }
            | AnkiTtsError::BackendFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for anki-tts operations
pub type Result<T> = std::result::Result<T, AnkiTtsError>;

impl From<String> for AnkiTtsError {
    fn from(s: String) -> Self {
        AnkiTtsError::Other(s)
    }
}

impl From<&str> for AnkiTtsError {
    fn from(s: &str) -> Self {
        AnkiTtsError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for AnkiTtsError {
    fn from(e: serde_json::Error) -> Self {
        AnkiTtsError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for AnkiTtsError {
    fn from(e: reqwest::Error) -> Self {
        AnkiTtsError::Http(e.to_string())
    }
}
