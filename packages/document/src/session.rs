//! Document session lifecycle.
//!
//! A [`Session`] owns one replicated document: the shared block array and
//! the text structure inside each block. It is created with
//! [`Session::open`], which loads whatever the persistence adapter has for
//! the document's well-known name and then guarantees the ground-truth
//! invariant: a document always has at least one block.
//!
//! There are no implicit globals; every component that needs model access
//! is handed the session explicitly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, Origin, ReadTxn, StateVector, Transact, TransactionMut, Update};

use crate::blocks::BlockList;
use crate::errors::DocumentError;
use crate::text::DetachedText;

/// Origin tag for transactions issued through this session, used to tell
/// local structural changes apart from remote ones.
const LOCAL_ORIGIN: &str = "blockpad-local";

/// Name of the shared array holding the document's blocks.
const BLOCKS: &str = "blocks";

/// Scoped transaction over a session's document.
///
/// All model reads and writes go through one of these; observers are
/// notified exactly once per top-level transaction, after every primitive
/// operation inside it has completed.
pub struct Transaction<'doc> {
    inner: TransactionMut<'doc>,
}

impl<'doc> Transaction<'doc> {
    pub(crate) fn read(&self) -> &TransactionMut<'doc> {
        &self.inner
    }

    pub(crate) fn write(&mut self) -> &mut TransactionMut<'doc> {
        &mut self.inner
    }
}

/// Durable storage for a document's encoded state, addressed by name.
///
/// The format of the blob is the replicated store's concern; adapters only
/// move bytes.
pub trait Persistence: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, DocumentError>;
    fn save(&self, name: &str, state: &[u8]) -> Result<(), DocumentError>;
}

/// File-per-document persistence under a root directory.
pub struct DirPersistence {
    root: PathBuf,
}

impl DirPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.bin"))
    }
}

impl Persistence for DirPersistence {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, DocumentError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn save(&self, name: &str, state: &[u8]) -> Result<(), DocumentError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_for(name), state)?;
        Ok(())
    }
}

/// In-memory persistence for tests and throwaway documents.
#[derive(Default)]
pub struct MemoryPersistence {
    states: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, DocumentError> {
        Ok(self.states.lock().unwrap().get(name).cloned())
    }

    fn save(&self, name: &str, state: &[u8]) -> Result<(), DocumentError> {
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), state.to_vec());
        Ok(())
    }
}

/// One open document: the replicated store handle, its block sequence and
/// the persistence binding.
pub struct Session {
    doc: Doc,
    blocks: BlockList,
    store: Arc<dyn Persistence>,
    name: String,
    origin: Origin,
}

impl Session {
    /// Open the document stored under `name`, loading persisted state if
    /// any. Once the state is in memory the session is "synced": if the
    /// document is empty, exactly one empty block is seeded.
    pub fn open(store: Arc<dyn Persistence>, name: &str) -> Result<Arc<Self>, DocumentError> {
        let doc = Doc::new();
        let origin = Origin::from(LOCAL_ORIGIN);
        let array = doc.get_or_insert_array(BLOCKS);
        let blocks = BlockList::new(array, origin.clone());

        if let Some(state) = store.load(name)? {
            let update =
                Update::decode_v1(&state).map_err(|e| DocumentError::Decode(e.to_string()))?;
            let mut txn = doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| DocumentError::Apply(e.to_string()))?;
        }

        let session = Self {
            doc,
            blocks,
            store,
            name: name.to_string(),
            origin,
        };

        let seeded = session.transact(|txn| {
            if session.blocks.is_empty(txn) {
                session
                    .blocks
                    .insert_at(txn, 0, DetachedText::new())
                    .map(|_| true)
            } else {
                Ok(false)
            }
        })?;
        if seeded {
            debug!(name, "seeded empty document with one block");
        }

        Ok(Arc::new(session))
    }

    /// The document's block sequence.
    pub fn blocks(&self) -> &BlockList {
        &self.blocks
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` inside a single mutating transaction. Observers fire once,
    /// synchronously, when the transaction commits; the resulting state is
    /// then flushed to the persistence adapter.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Transaction) -> R) -> R {
        let result = {
            let mut txn = Transaction {
                inner: self.doc.transact_mut_with(self.origin.clone()),
            };
            f(&mut txn)
        };
        if let Err(err) = self.flush() {
            warn!(name = %self.name, error = %err, "failed to persist document state");
        }
        result
    }

    /// Run `f` with read-only access to the document.
    pub fn read<R>(&self, f: impl FnOnce(&Transaction) -> R) -> R {
        let txn = Transaction {
            inner: self.doc.transact_mut(),
        };
        f(&txn)
    }

    /// Persist the current state through the adapter.
    pub fn flush(&self) -> Result<(), DocumentError> {
        let state = self.encode_state();
        self.store.save(&self.name, &state)
    }

    /// Flush and end the session.
    pub fn close(&self) -> Result<(), DocumentError> {
        self.flush()
    }

    /// Encode the full document state as a v1 update.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Current state vector (for delta sync).
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the changes another replica is missing, given its state
    /// vector.
    pub fn encode_delta(&self, state_vector: &[u8]) -> Result<Vec<u8>, DocumentError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| DocumentError::Decode(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update produced by another replica. Observers see it as an
    /// ordinary change notification, interleaved with local transactions
    /// on the same thread.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), DocumentError> {
        let update =
            Update::decode_v1(update).map_err(|e| DocumentError::Decode(e.to_string()))?;
        {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| DocumentError::Apply(e.to_string()))?;
        }
        self.flush()
    }
}
