use thiserror::Error;

pub type Result<T> = std::result::Result<T, MosaicError>;

/// Hard failures surfaced by the mosaic core.
///
/// A collection deadline elapsing is not represented here: the collector reports it as a
/// partial result (see [`crate::collector::Finish::DeadlineElapsed`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MosaicError {
    /// Degenerate image or non-positive tile geometry.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A single source image could not be retrieved or decoded.
    #[error("failed to decode source '{source_id}': {reason}")]
    DecodeFailure { source_id: String, reason: String },

    /// Nearest-color query against an empty working set.
    #[error("no colors available in the working set")]
    NotFound,
}

impl MosaicError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn decode_failure(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeFailure {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}
