//! Codec errors.

use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("PDF write error: {0}")]
    Write(String),
    #[error("Document has no pages")]
    NoPages,
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
