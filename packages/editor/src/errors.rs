//! Error types for the editing layer.

use blockpad_document::{BlockId, DocumentError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// An event was routed to a block id that has no live view, e.g. a
    /// stale handle kept across a structural change.
    #[error("no view for block {0}")]
    UnknownBlock(BlockId),
}
