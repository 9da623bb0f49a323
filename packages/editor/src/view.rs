//! View coordination: one surface per block, routed events, structural
//! outcomes.
//!
//! [`Editor`] owns the live set of [`BlockView`]s, keyed by block id. It
//! subscribes to the block sequence, recreates the view list whenever the
//! structure changes (views whose ids survive keep their surface, tracker,
//! and caret), routes native events to the right view's tracker and
//! translator, and executes structural key outcomes through the
//! controller. Focus transfer after a split or merge is deferred to the
//! next frame tick so the target surface exists before it is focused.

use std::sync::{Arc, Mutex};

use tracing::debug;

use blockpad_document::{
    Block, BlockId, BlockSnapshot, BlockSubscription, Session, TextSubscription,
};

use crate::controller::BlockController;
use crate::errors::EditorError;
use crate::reconciler::RenderReconciler;
use crate::selection::SelectionTracker;
use crate::surface::{EditingSurface, FrameScheduler, SurfaceFactory};
use crate::translator::{EditTranslator, EditorKey, KeyOutcome, TextInput};

/// One rendered block: its model handle, surface, tracker, and the text
/// observer keeping the surface reconciled.
pub struct BlockView {
    block: Block,
    surface: Arc<dyn EditingSurface>,
    tracker: Arc<SelectionTracker>,
    _text_sub: TextSubscription,
}

impl BlockView {
    pub fn id(&self) -> &BlockId {
        &self.block.id
    }

    pub fn surface(&self) -> &Arc<dyn EditingSurface> {
        &self.surface
    }

    pub fn tracker(&self) -> &Arc<SelectionTracker> {
        &self.tracker
    }
}

/// Document-level coordinator binding the model to a set of surfaces.
pub struct Editor {
    session: Arc<Session>,
    translator: EditTranslator,
    controller: BlockController,
    factory: Arc<dyn SurfaceFactory>,
    scheduler: Arc<dyn FrameScheduler>,
    views: Arc<Mutex<Vec<BlockView>>>,
    // Snapshot delivered by the structural observer, consumed by
    // sync_views. Observer callbacks cannot open transactions, so view
    // reconstruction is decoupled from the notification itself.
    pending: Arc<Mutex<Option<Vec<BlockSnapshot>>>>,
    _blocks_sub: BlockSubscription,
}

impl Editor {
    pub fn new(
        session: Arc<Session>,
        factory: Arc<dyn SurfaceFactory>,
        scheduler: Arc<dyn FrameScheduler>,
    ) -> Self {
        let pending: Arc<Mutex<Option<Vec<BlockSnapshot>>>> = Arc::new(Mutex::new(None));
        let blocks_sub = {
            let pending = Arc::clone(&pending);
            session.blocks().subscribe(move |snapshot| {
                *pending.lock().unwrap() = Some(snapshot.to_vec());
            })
        };
        let editor = Self {
            translator: EditTranslator::new(Arc::clone(&session)),
            controller: BlockController::new(Arc::clone(&session)),
            session,
            factory,
            scheduler,
            views: Arc::new(Mutex::new(Vec::new())),
            pending,
            _blocks_sub: blocks_sub,
        };
        editor.sync_views();
        editor
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Current block ids in document order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.views
            .lock()
            .unwrap()
            .iter()
            .map(|view| view.block.id.clone())
            .collect()
    }

    pub fn view_count(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    /// Rebuild the view list from the latest structural snapshot. Views
    /// whose block id survives are kept as-is; new blocks get a fresh
    /// surface from the factory; views for removed blocks are dropped,
    /// which also drops their observers.
    ///
    /// Called internally after every structural operation; hosts call it
    /// after applying a remote update.
    pub fn sync_views(&self) {
        let snapshot = self.pending.lock().unwrap().take().unwrap_or_else(|| {
            self.session
                .read(|txn| self.session.blocks().snapshot(txn))
        });

        let mut views = self.views.lock().unwrap();
        let mut retained: Vec<Option<BlockView>> =
            std::mem::take(&mut *views).into_iter().map(Some).collect();
        for snap in snapshot {
            let kept = retained
                .iter_mut()
                .find(|slot| {
                    slot.as_ref()
                        .is_some_and(|view| view.block.id == snap.id)
                })
                .and_then(Option::take);
            views.push(kept.unwrap_or_else(|| self.create_view(snap)));
        }
        debug!(count = views.len(), "views synced");
    }

    fn create_view(&self, snap: BlockSnapshot) -> BlockView {
        let surface = self.factory.create(&snap.id);
        let tracker = Arc::new(SelectionTracker::new(
            Arc::clone(&surface),
            Arc::clone(&self.scheduler),
        ));
        let reconciler = RenderReconciler::new();
        reconciler.reconcile(surface.as_ref(), &tracker, &snap.runs);

        let text_sub = {
            let surface = Arc::clone(&surface);
            let tracker = Arc::clone(&tracker);
            snap.content.observe(move |change| {
                reconciler.reconcile(surface.as_ref(), &tracker, &change.runs);
            })
        };
        BlockView {
            block: Block {
                id: snap.id,
                content: snap.content,
            },
            surface,
            tracker,
            _text_sub: text_sub,
        }
    }

    pub fn handle_focus(&self, id: &BlockId) -> Result<(), EditorError> {
        self.with_view(id, |view| view.tracker.handle_focus())
    }

    pub fn handle_blur(&self, id: &BlockId) -> Result<(), EditorError> {
        self.with_view(id, |view| view.tracker.handle_blur())
    }

    pub fn handle_pointer_down(&self, id: &BlockId) -> Result<(), EditorError> {
        self.with_view(id, |view| view.tracker.handle_pointer_down())
    }

    pub fn handle_pointer_up(&self, id: &BlockId) -> Result<(), EditorError> {
        self.with_view(id, |view| view.tracker.handle_pointer_up())
    }

    /// Route a text-mutation event to the block's translator.
    pub fn handle_input(&self, id: &BlockId, input: TextInput) -> Result<(), EditorError> {
        let (_, block, tracker) = self.view_parts(id)?;
        self.translator.handle_input(&block, &tracker, input)
    }

    /// Route a paste to the block's translator.
    pub fn handle_paste(&self, id: &BlockId, clipboard: Option<&str>) -> Result<(), EditorError> {
        let (_, block, tracker) = self.view_parts(id)?;
        self.translator.handle_paste(&block, &tracker, clipboard)
    }

    /// Handle a key press on a block's surface: recompute the selection,
    /// classify the key, and execute the outcome.
    pub fn handle_key(&self, id: &BlockId, key: EditorKey) -> Result<(), EditorError> {
        let (index, block, tracker) = self.view_parts(id)?;
        tracker.handle_key_down(key);
        let range = tracker.current().unwrap_or_default();
        let text_len = self.session.read(|txn| block.content.len(txn));

        match self.translator.translate_key(key, range, text_len) {
            KeyOutcome::Split => {
                let new_block = self.controller.split(index, range)?;
                self.sync_views();
                self.defer_focus(new_block.id, 0);
            }
            KeyOutcome::MergeIntoPredecessor => {
                if index == 0 {
                    // Nothing precedes the first block; the event is
                    // consumed so the host does not delete into nowhere.
                    return Ok(());
                }
                let (predecessor, caret) = self.controller.merge(index)?;
                self.sync_views();
                self.defer_focus(predecessor.id, caret);
            }
            KeyOutcome::FocusPredecessor => {
                if index > 0 {
                    let (target, content) = {
                        let views = self.views.lock().unwrap();
                        let view = &views[index - 1];
                        (view.block.id.clone(), view.block.content.clone())
                    };
                    let end = self.session.read(|txn| content.len(txn));
                    self.focus_view(&target, end)?;
                }
            }
            KeyOutcome::FocusSuccessor => {
                let target = {
                    let views = self.views.lock().unwrap();
                    views.get(index + 1).map(|view| view.block.id.clone())
                };
                if let Some(target) = target {
                    self.focus_view(&target, 0)?;
                }
            }
            KeyOutcome::Suppressed | KeyOutcome::Ignored => {}
            KeyOutcome::NativeCaretMove => {
                // The host's default caret movement runs after this
                // handler; pick the new position up on the next tick.
                tracker.schedule_recompute();
            }
        }
        Ok(())
    }

    /// Focus the view for `id`, caret collapsed at `offset`; any other
    /// tracked view loses its cache (its surface lost native focus).
    pub fn focus_view(&self, id: &BlockId, offset: usize) -> Result<(), EditorError> {
        let views = self.views.lock().unwrap();
        let mut found = false;
        for view in views.iter() {
            if &view.block.id == id {
                view.tracker.set_range(Some(offset), Some(0));
                view.tracker.focus();
                found = true;
            } else if view.tracker.is_tracked() {
                view.tracker.handle_blur();
            }
        }
        if found {
            Ok(())
        } else {
            Err(EditorError::UnknownBlock(id.clone()))
        }
    }

    fn defer_focus(&self, id: BlockId, offset: usize) {
        let views = Arc::clone(&self.views);
        self.scheduler.defer(Box::new(move || {
            let views = views.lock().unwrap();
            for view in views.iter() {
                if view.block.id == id {
                    view.tracker.set_range(Some(offset), Some(0));
                    view.tracker.focus();
                } else if view.tracker.is_tracked() {
                    view.tracker.handle_blur();
                }
            }
        }));
    }

    fn with_view(
        &self,
        id: &BlockId,
        f: impl FnOnce(&BlockView),
    ) -> Result<(), EditorError> {
        let views = self.views.lock().unwrap();
        let view = views
            .iter()
            .find(|view| &view.block.id == id)
            .ok_or_else(|| EditorError::UnknownBlock(id.clone()))?;
        f(view);
        Ok(())
    }

    fn view_parts(
        &self,
        id: &BlockId,
    ) -> Result<(usize, Block, Arc<SelectionTracker>), EditorError> {
        let views = self.views.lock().unwrap();
        let index = views
            .iter()
            .position(|view| &view.block.id == id)
            .ok_or_else(|| EditorError::UnknownBlock(id.clone()))?;
        let view = &views[index];
        Ok((index, view.block.clone(), Arc::clone(&view.tracker)))
    }
}
