use thiserror::Error;

/// Result type alias using daylog's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by daylog operations.
///
/// The scheduler loop swallows `Capture` and `Analysis` for a single tick;
/// every other operation propagates its error directly to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Screen acquisition failed (permission denied, display unavailable).
    #[error("capture failed: {0}")]
    Capture(String),

    /// The vision call failed or its response could not be read.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Another capture (scheduled or triggered) is currently executing.
    #[error("a capture is already in progress")]
    CaptureInProgress,

    /// Row read/write failure in the record/settings store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Synthesis was requested for a day with no records.
    #[error("no records for today")]
    NoRecords,

    /// The text synthesis call failed; no file was written.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
