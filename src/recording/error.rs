/**
 * ============================================================================
 * RECORDING ERRORS
 * ============================================================================
 *
 * ConfigError       - bad/unknown preference values, rejected before any
 *                     resource is acquired
 * CaptureStartError - the capture service refused to open or start
 * GeometryError     - best-effort window resize failed (never fatal)
 * SinkError         - output file could not be opened/written/finalized
 * SessionError      - what controller operations return
 *
 * ============================================================================
 */

use serde::Serialize;
use std::io;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid frame rate {0} (allowed: 60, 30, 25, 24, 15)")]
    InvalidFrameRate(i64),

    #[error("Invalid window dimensions: {width:?} x {height:?}")]
    InvalidDimensions { width: String, height: String },

    #[error("Unknown audio format '{0}', preferences may be corrupt")]
    UnknownAudioFormat(String),

    #[error("Invalid audio quality {0} kbps")]
    InvalidAudioQuality(u32),

    #[error("Unknown video format '{0}', preferences may be corrupt")]
    UnknownVideoFormat(String),

    #[error("Unknown encoder '{0}', preferences may be corrupt")]
    UnknownEncoder(String),

    #[error("No save directory configured")]
    MissingSaveDirectory,

    #[error("Already recording")]
    AlreadyRecording,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to start capture: {0}")]
pub struct CaptureStartError(pub String);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Application '{0}' not found")]
    ApplicationNotFound(String),

    #[error("No windows found for '{0}'")]
    WindowNotFound(String),

    #[error("Failed to set window {attribute}: {reason}")]
    AttributeFailed {
        attribute: &'static str,
        reason: String,
    },

    #[error("Window management unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to open sink {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to write sample: {0}")]
    Write(String),

    #[error("Failed to finalize {path}: {reason}")]
    Finalize { path: String, reason: String },

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("Failed to read preferences: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse preferences: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown preference key '{0}'")]
    UnknownKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    CaptureStart(#[from] CaptureStartError),

    #[error("Sink Error: {0}")]
    Sink(#[from] SinkError),

    #[error("Start aborted by stop")]
    Aborted,
}

impl SessionError {
    pub fn is_config(&self) -> bool {
        matches!(self, SessionError::Config(_))
    }
}

// Allow serializing errors to send to the UI
impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}
