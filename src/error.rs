use thiserror::Error;

/// The primary error type for the `glucolink` library.
///
/// `IllegalLength` and `IllegalContent` are recoverable at the point of
/// packet interpretation: the session uses them as discriminators to try
/// the next candidate packet kind for its current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("illegal length: need at least {expected} bytes, got {actual}")]
    IllegalLength { expected: usize, actual: usize },

    #[error("illegal content: {0}")]
    IllegalContent(String),

    #[error("max retries reached on current state")]
    RetriesExhausted,
}
