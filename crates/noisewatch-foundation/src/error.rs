use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Failed to open stream: {reason}")]
    StreamOpen { reason: String },

    #[error("Stream read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("No audio data for {duration:?}")]
    NoDataTimeout { duration: Duration },

    #[error("Buffer overflow, dropped {count} samples")]
    BufferOverflow { count: usize },

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl AudioError {
    /// Mid-stream failures surface to the caller and sampling may go on.
    /// Everything else means the source never became (or no longer is)
    /// usable, and there is no retry path.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AudioError::ReadFailed { .. }
                | AudioError::NoDataTimeout { .. }
                | AudioError::BufferOverflow { .. }
        )
    }
}
