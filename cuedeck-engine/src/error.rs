//! Error types for cuedeck-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Runner failures never surface as faults in the control
//! task; they are converted to terminal-state transitions plus an event,
//! and only the originating operation sees the error value.

use thiserror::Error;

/// Main error type for cuedeck-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Player/extractor executable missing or unusable for this launch
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// No supported player backend is installed
    #[error("No playback backend available: {0}")]
    BackendUnavailable(String),

    /// Operation not supported by the current backend or cue kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Runner observed process death before a natural end-of-media signal
    #[error("Process exited unexpectedly: {0}")]
    ProcessExited(String),

    /// Preview frame extraction failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Invalid trim points or other timing parameters
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Deck already hosts a running cue
    #[error("Deck {0} is already running")]
    AlreadyRunning(cuedeck_common::events::DeckId),

    /// Scene or cue not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using cuedeck-engine Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure should leave the cue loaded and surfaced to the
    /// operator rather than tearing anything else down.
    pub fn is_playback_failure(&self) -> bool {
        matches!(
            self,
            Error::Spawn(_) | Error::BackendUnavailable(_) | Error::ProcessExited(_)
        )
    }
}
