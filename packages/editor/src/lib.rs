//! Editing layer for the block document model.
//!
//! Binds a [`blockpad_document::Session`] to host editing surfaces:
//!
//! - [`SelectionTracker`]: per-surface selection cache, recomputed on
//!   user-visible caret moves, discarded on blur.
//! - [`EditTranslator`]: native input events to model operations, one
//!   transaction per logical action, predicted caret written before render.
//! - [`RenderReconciler`]: runs to markup, diffed byte-for-byte against the
//!   surface, caret restored after real writes.
//! - [`BlockController`]: split, merge, remove.
//! - [`Editor`]: the coordinator holding one [`BlockView`] per block.
//!
//! Hosts implement [`EditingSurface`], [`SurfaceFactory`], and
//! [`FrameScheduler`]; the `Recording*`/`ManualScheduler` implementations
//! serve tests and headless use.

mod controller;
mod errors;
mod reconciler;
mod selection;
mod surface;
mod translator;
mod view;

pub use controller::BlockController;
pub use errors::EditorError;
pub use reconciler::{markup_for_runs, RenderReconciler};
pub use selection::{SelectionRange, SelectionTracker};
pub use surface::{
    EditingSurface, FrameScheduler, ManualScheduler, RecordingSurface, RecordingSurfaceFactory,
    SurfaceFactory,
};
pub use translator::{EditTranslator, EditorKey, KeyOutcome, TextInput};
pub use view::{BlockView, Editor};
