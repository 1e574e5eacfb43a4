use ft_clock::{FtDuration, Timestamp};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Frame '{0}' does not exist")]
    UnknownFrame(String),

    #[error("Frames '{from}' and '{to}' are not connected in the transform tree")]
    DisconnectedFrames { from: String, to: String },

    #[error("No transform for frame '{frame}' at time {time}: {reason}")]
    NoDataAtTime {
        frame: String,
        time: Timestamp,
        reason: String,
    },

    #[error("Setting '{parent}' as parent of '{child}' would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("Invalid transform for frame '{child}': {reason}")]
    InvalidTransform { child: String, reason: String },

    #[error("Latest transform for frame '{frame}' is {age} old, more than the allowed {max_staleness}")]
    Stale {
        frame: String,
        age: FtDuration,
        max_staleness: FtDuration,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type TransformResult<T> = Result<T, TransformError>;
