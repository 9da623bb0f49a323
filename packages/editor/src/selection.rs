//! Selection tracking.
//!
//! One tracker per surface instance. It caches the current linear selection
//! as a small state machine, because native selection reads are only valid
//! at the moment they are made: by the time an edit is translated, the host
//! may already have mutated its own state. The cache is recomputed on every
//! user-visible caret move and discarded when the surface loses focus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::surface::{EditingSurface, FrameScheduler};
use crate::translator::EditorKey;

/// A linear selection over one block's flattened plain text. `length == 0`
/// is a collapsed caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub offset: usize,
    pub length: usize,
}

impl SelectionRange {
    pub fn caret(offset: usize) -> Self {
        Self { offset, length: 0 }
    }

    pub fn is_collapsed(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unfocused,
    Tracked(SelectionRange),
}

/// Per-surface selection state machine.
///
/// States: `Unfocused` and `Tracked(range)`. Events recompute the cache
/// from the native selection either synchronously (focus, navigation
/// key-down, before-input, pointer-up) or deferred to the next frame tick
/// (pointer-down, post-default caret movement). At most one deferral is
/// outstanding; a later-scheduled recomputation supersedes any pending one.
pub struct SelectionTracker {
    surface: Arc<dyn EditingSurface>,
    scheduler: Arc<dyn FrameScheduler>,
    state: Arc<Mutex<State>>,
    // Bumped by every recomputation; a deferred recompute only applies if
    // nothing newer was scheduled in the meantime.
    generation: Arc<AtomicU64>,
}

impl SelectionTracker {
    pub fn new(surface: Arc<dyn EditingSurface>, scheduler: Arc<dyn FrameScheduler>) -> Self {
        Self {
            surface,
            scheduler,
            state: Arc::new(Mutex::new(State::Unfocused)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The cached selection, if the surface is focused.
    pub fn current(&self) -> Option<SelectionRange> {
        match *self.state.lock().unwrap() {
            State::Unfocused => None,
            State::Tracked(range) => Some(range),
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Tracked(_))
    }

    /// The surface gained native focus: compute the cache from the native
    /// caret.
    pub fn handle_focus(&self) {
        self.recompute_now();
    }

    /// The surface lost native focus: the cache cannot outlive it.
    pub fn handle_blur(&self) {
        *self.state.lock().unwrap() = State::Unfocused;
        trace!("selection untracked on blur");
    }

    /// Pointer pressed: the native selection is not final until the host
    /// finishes processing the click, so defer the read to the next tick.
    pub fn handle_pointer_down(&self) {
        self.schedule_recompute();
    }

    /// Pointer released: read immediately, superseding any pending
    /// pointer-down deferral.
    pub fn handle_pointer_up(&self) {
        self.recompute_now();
    }

    /// Key pressed. The selection must be known before any edit the key
    /// implies is translated, so recompute synchronously; Tab is suppressed
    /// entirely and never moves the caret.
    pub fn handle_key_down(&self, key: EditorKey) {
        if key != EditorKey::Tab {
            self.recompute_now();
        }
    }

    /// A native text mutation is about to be reported: capture where it
    /// will happen first.
    pub fn handle_before_input(&self) {
        self.recompute_now();
    }

    /// Defer a recomputation to the next frame tick. Last scheduled wins:
    /// any recomputation in between invalidates this one.
    pub fn schedule_recompute(&self) {
        let scheduled = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let surface = Arc::clone(&self.surface);
        self.scheduler.defer(Box::new(move || {
            if generation.load(Ordering::SeqCst) == scheduled {
                recompute(surface.as_ref(), &state);
            }
        }));
    }

    /// Merge a predicted post-edit selection into the cache, seeding a
    /// collapsed origin if nothing is tracked yet. Used after programmatic
    /// edits, where the native caret is not trusted.
    pub fn set_range(&self, offset: Option<usize>, length: Option<usize>) {
        let mut state = self.state.lock().unwrap();
        let mut range = match *state {
            State::Tracked(range) => range,
            State::Unfocused => SelectionRange::default(),
        };
        if let Some(offset) = offset {
            range.offset = offset;
        }
        if let Some(length) = length {
            range.length = length;
        }
        trace!(offset = range.offset, length = range.length, "selection set");
        *state = State::Tracked(range);
    }

    /// Re-acquire native focus and place the caret, collapsed, at the
    /// cached offset (0 if nothing is tracked).
    pub fn focus(&self) {
        let offset = self.current().map(|range| range.offset).unwrap_or(0);
        self.surface.focus();
        self.surface.place_caret(offset);
        // Invalidate any pending deferral; the caret is now authoritative.
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = State::Tracked(SelectionRange::caret(offset));
    }

    fn recompute_now(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        recompute(self.surface.as_ref(), &self.state);
    }
}

fn recompute(surface: &dyn EditingSurface, state: &Mutex<State>) {
    let next = match surface.read_selection() {
        Some(range) => State::Tracked(range),
        // A focused surface with no native selection tracks a collapsed
        // origin; an unfocused one tracks nothing.
        None if surface.has_focus() => State::Tracked(SelectionRange::default()),
        None => State::Unfocused,
    };
    trace!(?next, "selection recomputed");
    *state.lock().unwrap() = next;
}
