//! End-to-end editing scenarios driven through recorded surfaces.
//!
//! The harness simulates what a host would do: place the native selection,
//! report focus/key/input events to the editor, and run the frame tick
//! after structural changes.

use std::sync::Arc;

use blockpad_document::{BlockId, MemoryPersistence, Persistence, Session};
use blockpad_editor::{
    Editor, EditorKey, EditingSurface, ManualScheduler, RecordingSurface, RecordingSurfaceFactory,
    SelectionRange, TextInput,
};

struct EditorHarness {
    session: Arc<Session>,
    editor: Editor,
    factory: Arc<RecordingSurfaceFactory>,
    scheduler: Arc<ManualScheduler>,
}

impl EditorHarness {
    fn open() -> Self {
        Self::open_on(Arc::new(MemoryPersistence::new()), "note")
    }

    fn open_on(store: Arc<dyn Persistence>, name: &str) -> Self {
        let session = Session::open(store, name).unwrap();
        let factory = Arc::new(RecordingSurfaceFactory::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let editor = Editor::new(session.clone(), factory.clone(), scheduler.clone());
        Self {
            session,
            editor,
            factory,
            scheduler,
        }
    }

    fn block_id(&self, index: usize) -> BlockId {
        self.editor.block_ids().remove(index)
    }

    fn surface(&self, index: usize) -> Arc<RecordingSurface> {
        self.factory.surface(&self.block_id(index)).unwrap()
    }

    /// Simulate the user clicking into a block at a given caret offset.
    fn click_at(&self, index: usize, offset: usize) {
        let id = self.block_id(index);
        let surface = self.surface(index);
        surface.focus();
        surface.set_selection(offset, 0);
        self.editor.handle_focus(&id).unwrap();
    }

    /// Simulate the user dragging a selection within a block.
    fn select(&self, index: usize, offset: usize, length: usize) {
        let id = self.block_id(index);
        let surface = self.surface(index);
        surface.focus();
        surface.set_selection(offset, length);
        self.editor.handle_focus(&id).unwrap();
    }

    /// Type a string into the focused block, one character per input event.
    fn type_str(&self, index: usize, text: &str) {
        let id = self.block_id(index);
        for ch in text.chars() {
            self.editor
                .handle_input(&id, TextInput::Insert(ch.to_string()))
                .unwrap();
        }
    }

    fn press(&self, index: usize, key: EditorKey) {
        let id = self.block_id(index);
        self.editor.handle_key(&id, key).unwrap();
    }

    fn plain_blocks(&self) -> Vec<String> {
        self.session.read(|txn| {
            self.session
                .blocks()
                .snapshot(txn)
                .iter()
                .map(|block| blockpad_document::flatten_runs(&block.runs))
                .collect()
        })
    }

    fn focused_index(&self) -> Option<usize> {
        let focused = self.factory.focused()?;
        self.editor.block_ids().iter().position(|id| *id == focused)
    }
}

#[test]
fn test_empty_document_seeds_one_block() {
    let h = EditorHarness::open();
    assert_eq!(h.plain_blocks(), vec![""]);
    assert_eq!(h.editor.view_count(), 1);
}

#[test]
fn test_typing_enter_typing_yields_two_blocks() {
    let h = EditorHarness::open();

    h.click_at(0, 0);
    h.type_str(0, "Hi");
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();

    // Second block exists and is focused at offset 0 right after the split.
    assert_eq!(h.editor.view_count(), 2);
    assert_eq!(h.focused_index(), Some(1));
    assert_eq!(h.surface(1).selection(), Some(SelectionRange::caret(0)));

    h.type_str(1, "there");
    assert_eq!(h.plain_blocks(), vec!["Hi", "there"]);
    assert_eq!(h.surface(0).markup(), "Hi");
    assert_eq!(h.surface(1).markup(), "there");
}

#[test]
fn test_backspace_at_block_start_merges_into_predecessor() {
    let h = EditorHarness::open();

    h.click_at(0, 0);
    h.type_str(0, "Hello");
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();
    h.type_str(1, "World");
    assert_eq!(h.plain_blocks(), vec!["Hello", "World"]);

    h.click_at(1, 0);
    h.press(1, EditorKey::Backspace);
    h.scheduler.run_pending();

    assert_eq!(h.plain_blocks(), vec!["HelloWorld"]);
    assert_eq!(h.editor.view_count(), 1);
    assert_eq!(h.focused_index(), Some(0));
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(5)));
    assert_eq!(h.surface(0).markup(), "HelloWorld");
}

#[test]
fn test_backspace_at_start_of_first_block_is_consumed() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "keep");

    h.click_at(0, 0);
    h.press(0, EditorKey::Backspace);

    assert_eq!(h.plain_blocks(), vec!["keep"]);
    assert_eq!(h.editor.view_count(), 1);
}

#[test]
fn test_split_then_merge_restores_block_count_and_text() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "alphabet");

    h.click_at(0, 5);
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();
    assert_eq!(h.plain_blocks(), vec!["alpha", "bet"]);

    h.click_at(1, 0);
    h.press(1, EditorKey::Backspace);
    h.scheduler.run_pending();
    assert_eq!(h.plain_blocks(), vec!["alphabet"]);
    assert_eq!(h.editor.view_count(), 1);
}

#[test]
fn test_enter_with_selection_drops_selected_text() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "head-DROP-tail");

    h.select(0, 4, 6);
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();

    assert_eq!(h.plain_blocks(), vec!["head", "tail"]);
    assert_eq!(h.focused_index(), Some(1));
    assert_eq!(h.surface(1).selection(), Some(SelectionRange::caret(0)));
}

#[test]
fn test_arrow_up_at_start_focuses_predecessor_end() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "first");
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();
    h.type_str(1, "second");

    h.click_at(1, 0);
    h.press(1, EditorKey::ArrowUp);

    assert_eq!(h.focused_index(), Some(0));
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(5)));
}

#[test]
fn test_arrow_down_at_end_focuses_successor_start() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "first");
    h.press(0, EditorKey::Enter);
    h.scheduler.run_pending();
    h.type_str(1, "second");

    h.click_at(0, 5);
    h.press(0, EditorKey::ArrowDown);

    assert_eq!(h.focused_index(), Some(1));
    assert_eq!(h.surface(1).selection(), Some(SelectionRange::caret(0)));
}

#[test]
fn test_arrow_at_boundary_of_edge_block_does_nothing() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "only");

    h.click_at(0, 0);
    h.press(0, EditorKey::ArrowUp);
    assert_eq!(h.focused_index(), Some(0));

    h.click_at(0, 4);
    h.press(0, EditorKey::ArrowDown);
    assert_eq!(h.focused_index(), Some(0));
}

#[test]
fn test_tab_is_suppressed() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "abc");

    h.click_at(0, 1);
    let before = h.surface(0).write_count();
    h.press(0, EditorKey::Tab);
    h.scheduler.run_pending();

    assert_eq!(h.plain_blocks(), vec!["abc"]);
    assert_eq!(h.surface(0).write_count(), before);
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(1)));
}

#[test]
fn test_paste_replaces_selection() {
    let h = EditorHarness::open();
    h.click_at(0, 0);
    h.type_str(0, "start END");

    h.select(0, 6, 3);
    h.editor
        .handle_paste(&h.block_id(0), Some("finish"))
        .unwrap();

    assert_eq!(h.plain_blocks(), vec!["start finish"]);
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(12)));
}

#[test]
fn test_remote_edit_restores_caret_to_cached_offset() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
    let h = EditorHarness::open_on(store.clone(), "note");

    h.click_at(0, 0);
    h.type_str(0, "Hello");
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(5)));

    // A second replica of the same persisted document prepends text.
    let remote = Session::open(store, "note").unwrap();
    remote
        .transact(|txn| {
            let block = remote.blocks().get(txn, 0)?;
            block.content.insert(txn, 0, "Remote ", None)
        })
        .unwrap();
    h.session
        .apply_update(&remote.encode_delta(&h.session.state_vector()).unwrap())
        .unwrap();
    h.editor.sync_views();

    // The surface re-rendered with the merged text, and the caret went
    // back to the cached offset: no remapping across the remote insert.
    assert_eq!(h.plain_blocks(), vec!["Remote Hello"]);
    assert_eq!(h.surface(0).markup(), "Remote Hello");
    assert_eq!(h.surface(0).selection(), Some(SelectionRange::caret(5)));
}

#[test]
fn test_remote_block_insert_creates_a_view() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
    let h = EditorHarness::open_on(store.clone(), "note");
    h.click_at(0, 0);
    h.type_str(0, "local");

    let remote = Session::open(store, "note").unwrap();
    remote
        .transact(|txn| {
            let blocks = remote.blocks();
            let len = blocks.len(txn);
            let block = blocks.insert_at(txn, len, Default::default())?;
            block.content.insert(txn, 0, "remote", None)
        })
        .unwrap();
    h.session
        .apply_update(&remote.encode_delta(&h.session.state_vector()).unwrap())
        .unwrap();
    h.editor.sync_views();

    assert_eq!(h.plain_blocks(), vec!["local", "remote"]);
    assert_eq!(h.editor.view_count(), 2);
    assert_eq!(h.surface(1).markup(), "remote");
}

#[test]
fn test_reopened_document_renders_persisted_content() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
    {
        let h = EditorHarness::open_on(store.clone(), "note");
        h.click_at(0, 0);
        h.type_str(0, "durable");
        h.session.close().unwrap();
    }

    let h = EditorHarness::open_on(store, "note");
    assert_eq!(h.plain_blocks(), vec!["durable"]);
    assert_eq!(h.surface(0).markup(), "durable");
}

#[test]
fn test_typing_writes_once_per_character() {
    let h = EditorHarness::open();
    h.click_at(0, 0);

    h.type_str(0, "abc");
    // One reconciliation write per transaction: three characters, three
    // writes, none for the unchanged initial render.
    assert_eq!(h.surface(0).write_count(), 3);
}
