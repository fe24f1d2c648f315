// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Typed failures of the captioning core. Everything above the
// domain layer wraps these in anyhow with extra context.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptionError {
    /// Token has no index and the `<unk>` fallback was not requested
    #[error("token '{0}' is not in the vocabulary")]
    UnknownToken(String),

    #[error("index {index} is outside the vocabulary (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Decode lengths and caption rows disagree, so packing would misalign
    #[error("batch has {captions} caption rows but {lengths} decode lengths")]
    LengthMismatch { captions: usize, lengths: usize },

    #[error("decode lengths must be non-increasing, found {previous} then {next} at row {row}")]
    UnsortedLengths { row: usize, previous: usize, next: usize },

    #[error("caption row {row} has {len} entries but its decode length needs {needed}")]
    ShortCaptionRow { row: usize, len: usize, needed: usize },

    #[error("invalid sample '{image}': {reason}")]
    InvalidSample { image: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CaptionError>;
