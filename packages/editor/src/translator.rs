//! Native-event to model-operation translation.
//!
//! Text-mutating inputs are applied here, each inside a single transaction,
//! with the predicted post-edit selection written into the tracker before
//! the render that follows. Structural keys are classified into a
//! [`KeyOutcome`] and executed by the editor coordinator, which knows the
//! block's neighbors.
//!
//! The host is expected to suppress its default handling for every event
//! it reports here; the model is the only writer, and the caret is restored
//! from the tracker's prediction, never read back from the host.

use std::sync::Arc;

use tracing::debug;

use blockpad_document::{Block, Session};

use crate::errors::EditorError;
use crate::selection::{SelectionRange, SelectionTracker};

/// Classification of a native text-mutation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    Insert(String),
    DeleteBackward,
    DeleteByCut,
    /// A mutation kind this core does not react to, carried for logging.
    Other(String),
}

/// Keys with editor-level meaning. Everything else stays with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKey {
    Enter,
    Backspace,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    SelectAll,
}

/// What a key press asks the coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Split the block at the tracked selection.
    Split,
    /// Merge the block into its predecessor (Backspace at the very start).
    MergeIntoPredecessor,
    /// Move focus to the predecessor block, caret at its end.
    FocusPredecessor,
    /// Move focus to the successor block, caret at 0.
    FocusSuccessor,
    /// Reserved key; default behavior is prevented and nothing happens.
    Suppressed,
    /// The host's default caret movement is allowed; the selection cache
    /// must be recomputed after it lands.
    NativeCaretMove,
    /// Nothing for the key itself; any mutation it causes arrives as a
    /// separate [`TextInput`].
    Ignored,
}

pub struct EditTranslator {
    session: Arc<Session>,
}

impl EditTranslator {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Apply a text-mutation event to `block`, guided by the tracked
    /// selection. Captures the selection before mutating, mutates inside
    /// one transaction, and predicts the post-edit caret via `set_range`
    /// before the notification-driven render runs.
    pub fn handle_input(
        &self,
        block: &Block,
        tracker: &SelectionTracker,
        input: TextInput,
    ) -> Result<(), EditorError> {
        tracker.handle_before_input();
        let range = tracker.current().unwrap_or_default();

        match input {
            TextInput::Insert(data) => {
                if data.is_empty() {
                    return Ok(());
                }
                debug!(offset = range.offset, length = range.length, data = %data, "insert");
                self.session.transact(|txn| {
                    if range.length > 0 {
                        block.content.delete(txn, range.offset, range.length)?;
                    }
                    block.content.insert(txn, range.offset, &data, None)?;
                    tracker.set_range(Some(range.offset + data.len()), Some(0));
                    Ok(())
                })
            }
            TextInput::DeleteBackward => {
                if range.length > 0 {
                    debug!(offset = range.offset, length = range.length, "delete selection");
                    self.session.transact(|txn| {
                        block.content.delete(txn, range.offset, range.length)?;
                        tracker.set_range(Some(range.offset), Some(0));
                        Ok(())
                    })
                } else if range.offset > 0 {
                    // One character back; offsets are known to sit on
                    // character boundaries, so step to the previous one.
                    let start = self.session.read(|txn| {
                        previous_boundary(&block.content.get_string(txn), range.offset)
                    });
                    self.session.transact(|txn| {
                        block.content.delete(txn, start, range.offset - start)?;
                        tracker.set_range(Some(start), Some(0));
                        Ok(())
                    })
                } else {
                    // Start of block: structural, handled at key level.
                    Ok(())
                }
            }
            TextInput::DeleteByCut => {
                if range.length == 0 {
                    return Ok(());
                }
                debug!(offset = range.offset, length = range.length, "cut");
                self.session.transact(|txn| {
                    block.content.delete(txn, range.offset, range.length)?;
                    tracker.set_range(Some(range.offset), Some(0));
                    Ok(())
                })
            }
            TextInput::Other(kind) => {
                debug!(kind = %kind, "ignoring unhandled input event");
                Ok(())
            }
        }
    }

    /// Apply a paste. `clipboard` is the plain-text payload, `None` when
    /// the clipboard has no text entry (in which case nothing happens).
    pub fn handle_paste(
        &self,
        block: &Block,
        tracker: &SelectionTracker,
        clipboard: Option<&str>,
    ) -> Result<(), EditorError> {
        let Some(text) = clipboard else {
            return Ok(());
        };
        tracker.handle_before_input();
        let range = tracker.current().unwrap_or_default();
        debug!(offset = range.offset, length = range.length, len = text.len(), "paste");
        self.session.transact(|txn| {
            if range.length > 0 {
                block.content.delete(txn, range.offset, range.length)?;
            }
            block.content.insert(txn, range.offset, text, None)?;
            tracker.set_range(Some(range.offset + text.len()), Some(0));
            Ok::<_, EditorError>(())
        })?;
        // Paste can pull native focus away (clipboard UI); re-acquire it at
        // the predicted caret.
        tracker.focus();
        Ok(())
    }

    /// Classify a key press given the tracked selection and the block's
    /// current text length. Pure; the coordinator executes the outcome.
    pub fn translate_key(
        &self,
        key: EditorKey,
        range: SelectionRange,
        text_len: usize,
    ) -> KeyOutcome {
        match key {
            EditorKey::Enter => KeyOutcome::Split,
            EditorKey::Backspace if range.offset == 0 && range.length == 0 => {
                KeyOutcome::MergeIntoPredecessor
            }
            EditorKey::Backspace => KeyOutcome::Ignored,
            EditorKey::Tab => KeyOutcome::Suppressed,
            EditorKey::ArrowUp if range.offset == 0 => KeyOutcome::FocusPredecessor,
            EditorKey::ArrowDown if range.offset == text_len => KeyOutcome::FocusSuccessor,
            EditorKey::ArrowUp
            | EditorKey::ArrowDown
            | EditorKey::ArrowLeft
            | EditorKey::ArrowRight
            | EditorKey::SelectAll => KeyOutcome::NativeCaretMove,
        }
    }
}

/// Largest character boundary strictly below `offset`.
fn previous_boundary(text: &str, offset: usize) -> usize {
    let mut start = offset - 1;
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    start
}
