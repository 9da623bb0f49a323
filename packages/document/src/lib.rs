//! Shared document model for a block-structured collaborative editor.
//!
//! The document is an ordered sequence of blocks; each block owns one
//! run-formatted text. Both levels are replicated CRDT structures, so
//! edits from any number of agents converge without coordination. The
//! crate exposes:
//!
//! - [`Session`]: document lifecycle, transactions, persistence, and
//!   update exchange with other replicas.
//! - [`BlockList`] / [`Block`]: the structural level, with stable ids and
//!   ordered change snapshots.
//! - [`TextModel`] / [`Run`] / [`DetachedText`]: the text level, with
//!   positional edits, run projection, and clone-then-integrate support
//!   for block splitting.
//!
//! Rendering, selection, and input handling live in the editor crate;
//! nothing here knows about surfaces.

mod blocks;
mod errors;
mod session;
mod text;

pub use blocks::{Block, BlockId, BlockList, BlockSnapshot, BlockSubscription};
pub use errors::DocumentError;
pub use session::{DirPersistence, MemoryPersistence, Persistence, Session, Transaction};
pub use text::{
    flatten_runs, locate_run, Attributes, DetachedText, Run, RunPosition, TextChange, TextModel,
    TextSubscription,
};
