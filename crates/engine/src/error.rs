/// Error kinds surfaced by the engine's mutators.
///
/// The audio thread never propagates these upward: a failed voice build produces silence for that
/// cell, and a failed recorder write flips the recorder off. These are for control-thread callers.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("recording is already active")]
    AlreadyRecording,

    #[error("recording is not active")]
    NotRecording,

    #[error("failed to decode audio: {message}")]
    DecodeError { message: String },

    #[error("io error: {message}")]
    IoError { message: String },

    #[error("capacity exhausted: {message}")]
    CapacityExhausted { message: String },

    #[error("reader observed a torn seqlock read and must retry")]
    RaceRetry,

    #[error("audio backend error: {message}")]
    AudioBackend { message: String },
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::IoError {
            message: value.to_string(),
        }
    }
}

impl From<hound::Error> for Error {
    fn from(value: hound::Error) -> Self {
        Error::IoError {
            message: value.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
