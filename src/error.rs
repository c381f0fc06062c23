//! Error types shared across the crate.

use thiserror::Error;

/// Result type alias for model, codec, and training operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds reported to the immediate caller.
///
/// All of these are deterministic structural failures. None of them is
/// recoverable by retrying, and a partial or guessed read would desynchronize
/// the encoder and decoder sides of a compression stream, so nothing here is
/// ever silently patched over.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte buffer is too short to fill a single window.
    #[error("insufficient data: {len} bytes cannot fill a {window}-byte window")]
    InsufficientData { len: usize, window: usize },

    /// A tensor does not match the shape declared by the hidden size.
    #[error("shape mismatch for {tensor}: expected {expected}, got {got}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: String,
        got: String,
    },

    /// A fixed-value header field failed its check on import.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The blob ends before the header-declared arrays do.
    #[error("truncated file: need {required} bytes, got {provided}")]
    TruncatedFile { required: usize, provided: usize },

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
