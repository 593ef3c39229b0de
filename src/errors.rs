use thiserror::Error;

/// Typed error hierarchy for newsbrief.
///
/// Used at module boundaries (source fetches, summarizer calls, store
/// writes, config validation). Internal/leaf functions can continue using
/// `anyhow::Result` — the `Internal` variant allows seamless conversion via
/// the `?` operator.
///
/// An empty message window or an empty summarizer result is NOT an error
/// and never appears here; those are explicit `Option`/outcome values.
#[derive(Debug, Error)]
pub enum BriefError {
    /// Missing or invalid configuration. Fatal at startup only.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The message source or the summarization service is unreachable or
    /// returned a non-success status. Recovered at the worker-loop level
    /// via backoff, never fatal.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// Disk/storage I/O failure. Fails the current cycle; the process
    /// continues.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A persisted collection could not be read or parsed. Degraded to
    /// "treat as empty" by the store, surfaced here only from sweeps.
    #[error("Corrupt state in {path}: {message}")]
    CorruptState { path: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using BriefError.
pub type BriefResult<T> = std::result::Result<T, BriefError>;

impl BriefError {
    pub fn transport(message: impl Into<String>) -> Self {
        BriefError::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the worker loop should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BriefError::Transport { retryable: true, .. })
    }
}
