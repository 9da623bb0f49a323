//! Run-to-markup projection and surface reconciliation.
//!
//! The reconciler is the single synchronization point between the model and
//! a rendered surface: local edits, remote edits, and undo arrive as the
//! same change notification and take the same path. It projects the runs to
//! markup, compares byte-for-byte with what the surface currently shows,
//! writes only when different, and then restores the cached caret, since a
//! content rewrite destroys native selection state.
//!
//! Caret restore uses the tracker's cached offset as-is. A remote edit that
//! changes the text length before the caret is not remapped; the caret
//! stays at the cached offset. Known limitation, kept deliberately: no
//! remapping policy is defined for concurrent remote edits.

use tracing::debug;

use blockpad_document::Run;

use crate::selection::SelectionTracker;
use crate::surface::EditingSurface;

/// Project a run sequence into markup: escaped text wrapped per attribute.
pub fn markup_for_runs(runs: &[Run]) -> String {
    let mut out = String::new();
    for run in runs {
        let mut piece = escape(&run.insert);
        let attrs = &run.attributes;
        if attrs.code {
            piece = format!("<code>{piece}</code>");
        }
        if attrs.underline {
            piece = format!("<u>{piece}</u>");
        }
        if attrs.italic {
            piece = format!("<em>{piece}</em>");
        }
        if attrs.bold {
            piece = format!("<strong>{piece}</strong>");
        }
        if let Some(url) = &attrs.url {
            piece = format!("<a href=\"{}\">{piece}</a>", escape(url));
        }
        out.push_str(&piece);
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Keeps one surface consistent with its block's run projection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderReconciler;

impl RenderReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Re-project `runs` onto `surface`. Returns whether a write happened.
    ///
    /// Skipping the write when the markup is unchanged is what keeps the
    /// caret alive across unrelated re-renders; after a real write the
    /// cached caret is restored, but only while the tracker is tracking
    /// (an unfocused surface must not steal focus on a remote edit).
    pub fn reconcile(
        &self,
        surface: &dyn EditingSurface,
        tracker: &SelectionTracker,
        runs: &[Run],
    ) -> bool {
        let markup = markup_for_runs(runs);
        if surface.rendered_markup() == markup {
            return false;
        }
        debug!(len = markup.len(), "markup rewritten");
        surface.write_markup(&markup);
        if tracker.is_tracked() {
            tracker.focus();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionRange;
    use crate::surface::{ManualScheduler, RecordingSurfaceFactory, SurfaceFactory};
    use blockpad_document::{Attributes, MemoryPersistence, Session};
    use std::sync::Arc;

    fn attrs(f: impl FnOnce(&mut Attributes)) -> Attributes {
        let mut attrs = Attributes::default();
        f(&mut attrs);
        attrs
    }

    #[test]
    fn test_markup_escapes_reserved_characters() {
        let runs = vec![Run::plain(r#"a < b & "c" > 'd'"#)];
        assert_eq!(
            markup_for_runs(&runs),
            "a &lt; b &amp; &quot;c&quot; &gt; &#39;d&#39;"
        );
    }

    #[test]
    fn test_markup_wraps_attributes() {
        let runs = vec![
            Run::plain("plain "),
            Run::new("bold", attrs(|a| a.bold = true)),
            Run::new(" and ", Attributes::default()),
            Run::new(
                "both",
                attrs(|a| {
                    a.bold = true;
                    a.italic = true;
                }),
            ),
            Run::new("mono", attrs(|a| a.code = true)),
            Run::new(
                "link",
                attrs(|a| a.url = Some("https://example.com/?a=1&b=2".into())),
            ),
        ];
        assert_eq!(
            markup_for_runs(&runs),
            "plain <strong>bold</strong> and <strong><em>both</em></strong>\
             <code>mono</code><a href=\"https://example.com/?a=1&amp;b=2\">link</a>"
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryPersistence::new());
        let session = Session::open(store, "note").unwrap();
        let id = session.read(|txn| session.blocks().get(txn, 0).unwrap().id);

        let factory = RecordingSurfaceFactory::new();
        let surface = factory.create(&id);
        let recording = factory.surface(&id).unwrap();
        let tracker = SelectionTracker::new(surface, Arc::new(ManualScheduler::new()));

        let runs = vec![Run::plain("hello")];
        let reconciler = RenderReconciler::new();
        assert!(reconciler.reconcile(recording.as_ref(), &tracker, &runs));
        assert!(!reconciler.reconcile(recording.as_ref(), &tracker, &runs));
        assert_eq!(recording.write_count(), 1);
        assert_eq!(recording.markup(), "hello");
    }

    #[test]
    fn test_reconcile_restores_cached_caret_after_write() {
        let store = Arc::new(MemoryPersistence::new());
        let session = Session::open(store, "note").unwrap();
        let id = session.read(|txn| session.blocks().get(txn, 0).unwrap().id);

        let factory = RecordingSurfaceFactory::new();
        let surface = factory.create(&id);
        let recording = factory.surface(&id).unwrap();
        let tracker = SelectionTracker::new(surface, Arc::new(ManualScheduler::new()));

        recording.focus();
        tracker.set_range(Some(3), Some(0));
        RenderReconciler::new().reconcile(recording.as_ref(), &tracker, &[Run::plain("abcdef")]);

        // The write cleared the native selection; focus() put it back.
        assert_eq!(recording.selection(), Some(SelectionRange::caret(3)));
    }

    #[test]
    fn test_reconcile_does_not_steal_focus_when_untracked() {
        let store = Arc::new(MemoryPersistence::new());
        let session = Session::open(store, "note").unwrap();
        let id = session.read(|txn| session.blocks().get(txn, 0).unwrap().id);

        let factory = RecordingSurfaceFactory::new();
        let surface = factory.create(&id);
        let recording = factory.surface(&id).unwrap();
        let tracker = SelectionTracker::new(surface, Arc::new(ManualScheduler::new()));

        assert!(RenderReconciler::new().reconcile(
            recording.as_ref(),
            &tracker,
            &[Run::plain("remote")]
        ));
        assert!(!recording.has_focus());
    }
}
