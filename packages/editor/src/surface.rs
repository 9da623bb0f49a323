//! Host editing-surface abstraction.
//!
//! One surface instance exists per rendered block. The core never touches
//! host node trees; everything goes through markup strings and linear
//! character offsets. Hosts implement [`EditingSurface`] over whatever
//! editable region they render, [`SurfaceFactory`] to create one per block,
//! and [`FrameScheduler`] over their paint tick.
//!
//! The `Recording*` types are the in-crate headless implementations used by
//! tests, examples, and hosts without a real surface.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use blockpad_document::BlockId;

use crate::selection::SelectionRange;

/// An editable region rendering one block.
///
/// Markup is owned by the reconciler: the surface stores whatever was last
/// written and reports it back verbatim for diffing. Selection is reported
/// and placed in plain-text character offsets over the flattened runs,
/// never in markup-node terms.
pub trait EditingSurface: Send + Sync {
    /// The markup currently rendered, byte-for-byte as last written.
    fn rendered_markup(&self) -> String;

    /// Replace the rendered content. May disturb the native caret; callers
    /// restore it afterwards.
    fn write_markup(&self, markup: &str);

    /// Read the native selection as a linear range, if one exists.
    fn read_selection(&self) -> Option<SelectionRange>;

    /// Place the native caret, collapsed, at a linear offset.
    fn place_caret(&self, offset: usize);

    /// Acquire native focus.
    fn focus(&self);

    fn has_focus(&self) -> bool;
}

/// Creates one surface per block, keyed by the block's stable id.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, id: &BlockId) -> Arc<dyn EditingSurface>;
}

/// Host paint-tick abstraction. Deferred work runs on the next tick, after
/// the host has finished its default event processing and rendering.
pub trait FrameScheduler: Send + Sync {
    fn defer(&self, work: Box<dyn FnOnce() + Send>);
}

#[derive(Default)]
struct SurfaceState {
    markup: String,
    selection: Option<SelectionRange>,
    writes: usize,
}

/// Headless surface that records writes and models native caret behavior:
/// a content rewrite discards the native selection, and focus is exclusive
/// across all surfaces created by the same factory.
pub struct RecordingSurface {
    id: BlockId,
    focused: Arc<Mutex<Option<BlockId>>>,
    state: Mutex<SurfaceState>,
}

impl RecordingSurface {
    fn new(id: BlockId, focused: Arc<Mutex<Option<BlockId>>>) -> Self {
        Self {
            id,
            focused,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    /// Simulate the user moving the native selection (click, drag, arrows).
    pub fn set_selection(&self, offset: usize, length: usize) {
        self.state.lock().unwrap().selection = Some(SelectionRange { offset, length });
    }

    /// The native selection as last placed or simulated.
    pub fn selection(&self) -> Option<SelectionRange> {
        self.state.lock().unwrap().selection
    }

    pub fn markup(&self) -> String {
        self.state.lock().unwrap().markup.clone()
    }

    /// Number of `write_markup` calls so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

impl EditingSurface for RecordingSurface {
    fn rendered_markup(&self) -> String {
        self.state.lock().unwrap().markup.clone()
    }

    fn write_markup(&self, markup: &str) {
        let mut state = self.state.lock().unwrap();
        state.markup = markup.to_string();
        state.writes += 1;
        // A content rewrite invalidates the native caret.
        state.selection = None;
    }

    fn read_selection(&self) -> Option<SelectionRange> {
        self.state.lock().unwrap().selection
    }

    fn place_caret(&self, offset: usize) {
        self.state.lock().unwrap().selection = Some(SelectionRange { offset, length: 0 });
    }

    fn focus(&self) {
        *self.focused.lock().unwrap() = Some(self.id.clone());
    }

    fn has_focus(&self) -> bool {
        self.focused.lock().unwrap().as_ref() == Some(&self.id)
    }
}

/// Factory for [`RecordingSurface`]s sharing one exclusive-focus registry.
#[derive(Default)]
pub struct RecordingSurfaceFactory {
    focused: Arc<Mutex<Option<BlockId>>>,
    surfaces: Mutex<Vec<(BlockId, Arc<RecordingSurface>)>>,
}

impl RecordingSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the surface created for a block id.
    pub fn surface(&self, id: &BlockId) -> Option<Arc<RecordingSurface>> {
        self.surfaces
            .lock()
            .unwrap()
            .iter()
            .find(|(other, _)| other == id)
            .map(|(_, surface)| Arc::clone(surface))
    }

    /// The block whose surface currently holds focus.
    pub fn focused(&self) -> Option<BlockId> {
        self.focused.lock().unwrap().clone()
    }
}

impl SurfaceFactory for RecordingSurfaceFactory {
    fn create(&self, id: &BlockId) -> Arc<dyn EditingSurface> {
        let surface = Arc::new(RecordingSurface::new(id.clone(), Arc::clone(&self.focused)));
        self.surfaces
            .lock()
            .unwrap()
            .push((id.clone(), Arc::clone(&surface)));
        surface
    }
}

/// Scheduler that queues deferred work until [`run_pending`] is called,
/// standing in for the host's next paint tick.
///
/// [`run_pending`]: ManualScheduler::run_pending
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run everything deferred so far, in order. Returns how many items ran.
    pub fn run_pending(&self) -> usize {
        let pending: Vec<_> = self.queue.lock().unwrap().drain(..).collect();
        let count = pending.len();
        for work in pending {
            work();
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl FrameScheduler for ManualScheduler {
    fn defer(&self, work: Box<dyn FnOnce() + Send>) {
        self.queue.lock().unwrap().push_back(work);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> BlockId {
        // Ids only matter for equality here; borrow one from a throwaway
        // document.
        let store = Arc::new(blockpad_document::MemoryPersistence::new());
        let session = blockpad_document::Session::open(store, "scratch").unwrap();
        session.read(|txn| session.blocks().get(txn, 0).unwrap().id)
    }

    #[test]
    fn test_focus_is_exclusive_per_factory() {
        let factory = RecordingSurfaceFactory::new();
        let (a, b) = (id(), id());
        let surface_a = factory.create(&a);
        let surface_b = factory.create(&b);

        surface_a.focus();
        assert!(surface_a.has_focus());
        assert!(!surface_b.has_focus());

        surface_b.focus();
        assert!(!surface_a.has_focus());
        assert!(surface_b.has_focus());
        assert_eq!(factory.focused(), Some(b));
    }

    #[test]
    fn test_write_discards_native_selection() {
        let factory = RecordingSurfaceFactory::new();
        let surface = factory.create(&id());

        surface.place_caret(3);
        assert_eq!(
            surface.read_selection(),
            Some(SelectionRange { offset: 3, length: 0 })
        );

        surface.write_markup("rewritten");
        assert_eq!(surface.read_selection(), None);
    }

    #[test]
    fn test_manual_scheduler_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let log = Arc::clone(&log);
            scheduler.defer(Box::new(move || log.lock().unwrap().push(label)));
        }
        assert_eq!(scheduler.pending_count(), 2);
        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(scheduler.run_pending(), 0);
    }
}
