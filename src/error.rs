use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Microphone permission denied or no input device present.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid frame count: {samples} samples do not divide into {channels} channels")]
    InvalidFrameCount { samples: usize, channels: u16 },

    #[error("audio error: {0}")]
    Audio(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl TutorError {
    /// Whether this error ends a live session, as opposed to costing one audio chunk.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MalformedInput(_) | Self::InvalidFrameCount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
