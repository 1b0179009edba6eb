//! Error types shared by every mediabridge crate.
//!
//! Engine-level failures (`UnitFailure`, `ProcessExit`) are always surfaced to
//! the caller of the run that produced them. Bridge-level failures
//! (`Remote`, `BridgeClosed`, `BridgeCapacity`) only ever affect the single
//! call they belong to.

/// Unified error type for the converter, its execution units, and the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The format key has no registered engine.
    #[error("Unsupported media format: \"{format}\"")]
    UnsupportedFormat { format: String },

    /// The execution unit reported an explicit error or faulted.
    #[error("Unit failure: {0}")]
    UnitFailure(String),

    /// The engine exited with a non-zero status before signalling success.
    #[error("Process Exit: {code}")]
    ProcessExit { code: i32 },

    /// The remote side received an operation name it does not know.
    #[error("Invalid API method: \"{0}\"")]
    InvalidOperation(String),

    /// A bridge message arrived from an origin other than the configured one.
    #[error("origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    /// The remote converter rejected the call.
    #[error("{0}")]
    Remote(String),

    /// The bridge port closed before a response arrived.
    #[error("bridge closed")]
    BridgeClosed,

    /// Too many bridge requests are already in flight.
    #[error("bridge capacity exceeded: {limit} requests in flight")]
    BridgeCapacity { limit: usize },

    /// A run succeeded but produced no output buffer.
    #[error("engine produced no output for {0}")]
    MissingOutput(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be turned into a usable registry.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an [`Error::UnsupportedFormat`] for the given key.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create an [`Error::UnitFailure`].
    pub fn unit_failure(msg: impl Into<String>) -> Self {
        Self::UnitFailure(msg.into())
    }

    /// Create an [`Error::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an [`Error::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
