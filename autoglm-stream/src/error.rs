use thiserror::Error;

/// Video capture and relay errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Device unreachable or capture server failed to come up
    #[error("Failed to start capture: {0}")]
    CaptureStart(String),

    #[error("Initialization data not ready for device {device_id} after {attempts} attempts")]
    InitTimeout { device_id: String, attempts: u32 },

    /// Video socket closed or failed mid-stream
    #[error("Stream error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl StreamError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CaptureStart(_) => "capture_start",
            Self::InitTimeout { .. } => "stream_init_timeout",
            Self::Transport(_) => "stream_transport",
            Self::Io(_) => "io",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
