//! Block sequence model.
//!
//! A document is an ordered, uniquely-keyed sequence of blocks; each block
//! wraps one [`TextModel`]. The sequence itself is a shared CRDT array, so
//! remote structural changes (blocks inserted or removed by other agents)
//! arrive through the same observer channel as local ones.
//!
//! Every block carries a stable [`BlockId`] assigned at creation and never
//! reused. Ids are the sole correlation key between a block and its
//! rendered surface instance; they are never derived from content. Blocks
//! created by remote agents are assigned an id when they are first seen.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yrs::types::text::TextPrelim;
use yrs::types::Change;
use yrs::{Array, ArrayRef, Observable, Origin, Out, ReadTxn, Subscription, Text};

use crate::errors::DocumentError;
use crate::session::Transaction;
use crate::text::{runs_in, DetachedText, Run, TextModel};

/// Stable, opaque block key. Assigned at block creation, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(Uuid);

impl BlockId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One document block: a stable id plus its text content.
///
/// A block's content is exclusively owned by that block; a block is never
/// shared between two document positions.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub content: TextModel,
}

/// Point-in-time projection of one block, delivered to sequence observers.
///
/// Carries the run projection so observers can render without opening a
/// transaction of their own (observer callbacks run while the notifying
/// transaction is still committing).
#[derive(Debug, Clone)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub content: TextModel,
    pub runs: Vec<Run>,
}

/// Guard for a block-sequence observer; dropping it unsubscribes.
pub struct BlockSubscription {
    _sub: Subscription,
}

/// The ordered block sequence of one document.
pub struct BlockList {
    array: ArrayRef,
    ids: Arc<Mutex<Vec<BlockId>>>,
    _splice_sub: Subscription,
}

impl BlockList {
    /// Wrap the document's shared block array.
    ///
    /// Registers the id-splice observer before any subscriber can attach,
    /// so snapshots always see ids consistent with the array.
    pub(crate) fn new(array: ArrayRef, local_origin: Origin) -> Self {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let splice_ids = Arc::clone(&ids);
        let splice_sub = array.observe(move |txn, event| {
            // Local transactions splice ids at the call site.
            if txn.origin() == Some(&local_origin) {
                return;
            }
            let mut ids = splice_ids.lock().unwrap();
            let mut pos = 0usize;
            for change in event.delta(txn) {
                match change {
                    Change::Retain(n) => pos += *n as usize,
                    Change::Added(items) => {
                        for _ in items {
                            ids.insert(pos, BlockId::new());
                            pos += 1;
                        }
                    }
                    Change::Removed(n) => {
                        for _ in 0..*n {
                            if pos < ids.len() {
                                ids.remove(pos);
                            }
                        }
                    }
                }
            }
        });
        Self {
            array,
            ids,
            _splice_sub: splice_sub,
        }
    }

    /// Number of blocks. Always at least one once a session has synced.
    pub fn len(&self, txn: &Transaction) -> usize {
        self.array.len(txn.read()) as usize
    }

    pub fn is_empty(&self, txn: &Transaction) -> bool {
        self.len(txn) == 0
    }

    /// Fetch the block at `index`.
    pub fn get(&self, txn: &Transaction, index: usize) -> Result<Block, DocumentError> {
        let len = self.len(txn);
        if index >= len {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }
        let content = match self.array.get(txn.read(), index as u32) {
            Some(Out::YText(text)) => TextModel::new(text),
            _ => {
                return Err(DocumentError::Decode(format!(
                    "block {index} is not a text structure"
                )))
            }
        };
        let id = self.ids.lock().unwrap()[index].clone();
        Ok(Block { id, content })
    }

    /// Integrate `content` as a new block at `index`, assigning its id.
    ///
    /// Fails with `IndexOutOfRange` unless `index` is in `[0, len]`.
    pub fn insert_at(
        &self,
        txn: &mut Transaction,
        index: usize,
        content: DetachedText,
    ) -> Result<Block, DocumentError> {
        let len = self.len(txn);
        if index > len {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }
        let id = BlockId::new();
        {
            let mut ids = self.ids.lock().unwrap();
            // Ids are never reused; a duplicate is a programming error.
            assert!(!ids.contains(&id), "duplicate block id {id}");
            ids.insert(index, id.clone());
        }
        let text = self.array.insert(txn.write(), index as u32, TextPrelim::new(""));
        let mut pos = 0u32;
        for run in content.runs() {
            // Explicit attributes on every run: a plain run must not
            // inherit formatting from the run integrated before it.
            text.insert_with_attributes(
                txn.write(),
                pos,
                &run.insert,
                run.attributes.to_store_attrs(),
            );
            pos += run.insert.len() as u32;
        }
        Ok(Block {
            id,
            content: TextModel::new(text),
        })
    }

    /// Remove the block at `index`.
    ///
    /// Fails with `IndexOutOfRange` unless `index` is in `[0, len)`.
    pub fn remove_at(&self, txn: &mut Transaction, index: usize) -> Result<(), DocumentError> {
        let len = self.len(txn);
        if index >= len {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }
        self.ids.lock().unwrap().remove(index);
        self.array.remove(txn.write(), index as u32);
        Ok(())
    }

    /// Current position of a block id, if it is still in the sequence.
    pub fn index_of(&self, id: &BlockId) -> Option<usize> {
        self.ids.lock().unwrap().iter().position(|other| other == id)
    }

    /// Ordered projection of every block.
    pub fn snapshot(&self, txn: &Transaction) -> Vec<BlockSnapshot> {
        let ids = self.ids.lock().unwrap().clone();
        snapshot_in(&self.array, &ids, txn.read())
    }

    /// Observe structural changes. The callback fires synchronously once
    /// per transaction that changed the sequence, with an ordered snapshot;
    /// dropping the returned guard unsubscribes.
    ///
    /// Callbacks run while the transaction is committing: they must not
    /// open a new transaction on the same session.
    pub fn subscribe<F>(&self, f: F) -> BlockSubscription
    where
        F: Fn(&[BlockSnapshot]) + Send + Sync + 'static,
    {
        let array = self.array.clone();
        let ids = Arc::clone(&self.ids);
        let sub = self.array.observe(move |txn, _event| {
            let ids = ids.lock().unwrap().clone();
            let snapshot = snapshot_in(&array, &ids, txn);
            f(&snapshot);
        });
        BlockSubscription { _sub: sub }
    }
}

fn snapshot_in<T: ReadTxn>(array: &ArrayRef, ids: &[BlockId], txn: &T) -> Vec<BlockSnapshot> {
    let mut blocks = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        if let Some(Out::YText(text)) = array.get(txn, index as u32) {
            blocks.push(BlockSnapshot {
                id: id.clone(),
                runs: runs_in(&text, txn),
                content: TextModel::new(text),
            });
        }
    }
    blocks
}
