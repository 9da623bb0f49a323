//! Headless editing demo: types into a document, splits and merges blocks,
//! and prints the rendered markup, with tracing enabled.
//!
//! Run with: cargo run -p blockpad-editor --example typing

use std::sync::Arc;

use blockpad_document::{MemoryPersistence, Session};
use blockpad_editor::{
    EditingSurface, Editor, EditorKey, ManualScheduler, RecordingSurfaceFactory, TextInput,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let store = Arc::new(MemoryPersistence::new());
    let session = Session::open(store, "demo")?;
    let factory = Arc::new(RecordingSurfaceFactory::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let editor = Editor::new(session.clone(), factory.clone(), scheduler.clone());

    // Click into the seeded block and type a sentence.
    let first = editor.block_ids().remove(0);
    let surface = factory.surface(&first).expect("surface for first block");
    surface.focus();
    surface.set_selection(0, 0);
    editor.handle_focus(&first)?;
    for ch in "Hello, blockpad!".chars() {
        editor.handle_input(&first, TextInput::Insert(ch.to_string()))?;
    }

    // Split after "Hello," and type into the new block.
    surface.set_selection(6, 0);
    editor.handle_key(&first, EditorKey::Enter)?;
    scheduler.run_pending();

    let second = editor.block_ids().remove(1);
    for ch in " second block".chars() {
        editor.handle_input(&second, TextInput::Insert(ch.to_string()))?;
    }

    for (index, id) in editor.block_ids().iter().enumerate() {
        let markup = factory.surface(id).expect("surface").markup();
        println!("block {index}: {markup:?}");
    }

    // Merge the second block back and show the result.
    let second_surface = factory.surface(&second).expect("surface");
    second_surface.set_selection(0, 0);
    editor.handle_key(&second, EditorKey::Backspace)?;
    scheduler.run_pending();

    let merged = factory
        .surface(&editor.block_ids().remove(0))
        .expect("surface")
        .markup();
    println!("merged: {merged:?}");

    session.close()?;
    Ok(())
}
