//! Error types for the document engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    /// An offset/length pair fell outside the valid bounds of a text.
    ///
    /// Always a caller bug: the selection used to compute the edit was
    /// inconsistent with the model. Never clamped, since silent clamping
    /// would desynchronize selection prediction.
    #[error("range out of bounds: offset {offset} + length {length} over text of length {text_len}")]
    Range {
        offset: usize,
        length: usize,
        text_len: usize,
    },

    /// A block index fell outside the valid bounds of the block sequence.
    #[error("block index {index} out of range (sequence length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// An invalid split/merge/remove target, or an operation that would
    /// leave the document with zero blocks.
    #[error("invalid structural operation: {0}")]
    Structural(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("failed to decode stored update: {0}")]
    Decode(String),

    #[error("failed to apply update: {0}")]
    Apply(String),
}
