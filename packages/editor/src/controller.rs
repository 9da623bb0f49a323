//! Structural block operations: split, merge, remove.
//!
//! Every operation validates its target before touching the model and runs
//! inside a single transaction, so observers never see an intermediate
//! state (a merge, for instance, never exposes the duplicated content
//! between append and remove). A document always keeps at least one block.

use std::sync::Arc;

use tracing::debug;

use blockpad_document::{Block, DocumentError, Session};

use crate::errors::EditorError;
use crate::selection::SelectionRange;

pub struct BlockController {
    session: Arc<Session>,
}

impl BlockController {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Split the block at `index` around `range`, returning the new block
    /// holding everything after the selection (a collapsed range splits at
    /// its offset; a non-collapsed one drops the selected text).
    ///
    /// Atomically: detach the block's text, trim the detached copy to the
    /// tail and the original to the head, and integrate the tail as a new
    /// block immediately after. The caller focuses the returned block at 0.
    pub fn split(&self, index: usize, range: SelectionRange) -> Result<Block, EditorError> {
        self.session.transact(|txn| {
            let blocks = self.session.blocks();
            let count = blocks.len(txn);
            if index >= count {
                return Err(structural(format!(
                    "split target {index} out of range ({count} blocks)"
                )));
            }
            let block = blocks.get(txn, index)?;
            let text_len = block.content.len(txn);
            if range.offset + range.length > text_len {
                return Err(DocumentError::Range {
                    offset: range.offset,
                    length: range.length,
                    text_len,
                }
                .into());
            }

            let mut tail = block.content.detach(txn);
            tail.delete(0, range.offset + range.length)?;
            block.content.delete(txn, range.offset, text_len - range.offset)?;
            let new_block = blocks.insert_at(txn, index + 1, tail)?;
            debug!(index, offset = range.offset, new = %new_block.id, "block split");
            Ok(new_block)
        })
    }

    /// Merge the block at `index` into its predecessor, carrying every run
    /// (attributes included) over to the predecessor's end, then removing
    /// the block. Returns the predecessor and the caret offset at its
    /// former end, where focus belongs afterwards.
    pub fn merge(&self, index: usize) -> Result<(Block, usize), EditorError> {
        self.session.transact(|txn| {
            let blocks = self.session.blocks();
            let count = blocks.len(txn);
            if index >= count {
                return Err(structural(format!(
                    "merge target {index} out of range ({count} blocks)"
                )));
            }
            if index == 0 {
                return Err(structural("first block has no predecessor to merge into"));
            }

            let predecessor = blocks.get(txn, index - 1)?;
            let block = blocks.get(txn, index)?;
            let caret = predecessor.content.len(txn);
            let mut pos = caret;
            for run in block.content.to_runs(txn) {
                predecessor
                    .content
                    .insert(txn, pos, &run.insert, Some(&run.attributes))?;
                pos += run.insert.len();
            }
            blocks.remove_at(txn, index)?;
            debug!(index, into = %predecessor.id, caret, "block merged");
            Ok((predecessor, caret))
        })
    }

    /// Remove the block at `index` outright. Refused when it is the last
    /// block left.
    pub fn remove(&self, index: usize) -> Result<(), EditorError> {
        self.session.transact(|txn| {
            let blocks = self.session.blocks();
            let count = blocks.len(txn);
            if index >= count {
                return Err(structural(format!(
                    "remove target {index} out of range ({count} blocks)"
                )));
            }
            if count == 1 {
                return Err(structural("a document always keeps at least one block"));
            }
            blocks.remove_at(txn, index)?;
            debug!(index, "block removed");
            Ok(())
        })
    }
}

fn structural(message: impl Into<String>) -> EditorError {
    EditorError::Document(DocumentError::Structural(message.into()))
}
