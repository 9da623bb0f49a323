//! Run-formatted text model.
//!
//! A block's text is a shared CRDT structure owned by the [`Session`]'s
//! document. This module wraps it behind a small contract: positional
//! insert/delete, projection to formatting [`Run`]s, detachment (cloning
//! into an unintegrated value) and per-transaction change notification.
//!
//! Offsets are indices into the flattened plain text, in the document
//! store's native units. An offset outside the text, or one that lands
//! inside a character, is a caller bug and fails with
//! [`DocumentError::Range`]; it is never clamped.
//!
//! [`Session`]: crate::session::Session

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use yrs::types::text::YChange;
use yrs::types::Attrs;
use yrs::{Any, GetString, Observable, Out, ReadTxn, Subscription, Text, TextRef};

use crate::errors::DocumentError;
use crate::session::Transaction;

/// Formatting attributes carried by a run of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default)]
    pub url: Option<String>,
}

impl Attributes {
    /// True when no formatting is set.
    pub fn is_plain(&self) -> bool {
        *self == Attributes::default()
    }

    pub(crate) fn to_store_attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        if self.bold {
            attrs.insert(Arc::from("bold"), Any::from(true));
        }
        if self.italic {
            attrs.insert(Arc::from("italic"), Any::from(true));
        }
        if self.underline {
            attrs.insert(Arc::from("underline"), Any::from(true));
        }
        if self.code {
            attrs.insert(Arc::from("code"), Any::from(true));
        }
        if let Some(url) = &self.url {
            attrs.insert(Arc::from("url"), Any::from(url.as_str()));
        }
        attrs
    }

    pub(crate) fn from_store_attrs(attrs: &Attrs) -> Self {
        let flag = |key: &str| matches!(attrs.get(key), Some(Any::Bool(true)));
        let url = match attrs.get("url") {
            Some(Any::String(s)) => Some(s.to_string()),
            _ => None,
        };
        Self {
            bold: flag("bold"),
            italic: flag("italic"),
            underline: flag("underline"),
            code: flag("code"),
            url,
        }
    }
}

/// A maximal span of characters sharing identical attributes.
///
/// Invariant maintained by every projection in this crate: consecutive
/// runs never share identical attribute sets, and no run is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub insert: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Run {
    pub fn new(insert: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            insert: insert.into(),
            attributes,
        }
    }

    pub fn plain(insert: impl Into<String>) -> Self {
        Self::new(insert, Attributes::default())
    }
}

/// Location of a linear offset inside a run sequence: which run, and how
/// far into that run's `insert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPosition {
    pub run: usize,
    pub offset: usize,
}

/// Map a linear offset over the flattened run sequence to a run-local
/// position. An offset on the boundary between two runs maps to the start
/// of the later one; the end of the text maps to `(runs.len(), 0)`.
///
/// Hosts use this to translate the linear selection contract into whatever
/// node structure their rendered markup has.
pub fn locate_run(runs: &[Run], offset: usize) -> Option<RunPosition> {
    let mut pos = 0;
    for (index, run) in runs.iter().enumerate() {
        let run_len = run.insert.len();
        if offset < pos + run_len {
            return Some(RunPosition {
                run: index,
                offset: offset - pos,
            });
        }
        pos += run_len;
    }
    (offset == pos).then_some(RunPosition {
        run: runs.len(),
        offset: 0,
    })
}

/// Concatenate the runs' inserts into the block's plain text.
pub fn flatten_runs(runs: &[Run]) -> String {
    runs.iter().map(|run| run.insert.as_str()).collect()
}

/// Merge adjacent runs with identical attributes and drop empty ones.
pub(crate) fn coalesce_runs(runs: Vec<Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.insert.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.attributes == run.attributes => {
                last.insert.push_str(&run.insert);
            }
            _ => out.push(run),
        }
    }
    out
}

/// Change notification payload: the full post-transaction run projection.
#[derive(Debug, Clone)]
pub struct TextChange {
    pub runs: Vec<Run>,
}

/// Guard for a text observer; dropping it unsubscribes.
pub struct TextSubscription {
    _sub: Subscription,
}

/// Handle to one block's shared text structure.
///
/// All mutation goes through an explicit [`Transaction`]; observers fire
/// once per top-level transaction, after every primitive operation in it
/// has completed.
#[derive(Debug, Clone)]
pub struct TextModel {
    text: TextRef,
}

impl TextModel {
    pub(crate) fn new(text: TextRef) -> Self {
        Self { text }
    }

    /// Plain-text length.
    pub fn len(&self, txn: &Transaction) -> usize {
        self.text.len(txn.read()) as usize
    }

    pub fn is_empty(&self, txn: &Transaction) -> bool {
        self.len(txn) == 0
    }

    /// The flattened plain text.
    pub fn get_string(&self, txn: &Transaction) -> String {
        self.text.get_string(txn.read())
    }

    /// Project the text into its run sequence.
    pub fn to_runs(&self, txn: &Transaction) -> Vec<Run> {
        runs_in(&self.text, txn.read())
    }

    /// Insert `chunk` at `offset`. With `attributes` the chunk carries
    /// exactly that formatting (an empty set forces plain text); without,
    /// it inherits the formatting active at the insertion point, which is
    /// what typing inside a formatted span should do.
    pub fn insert(
        &self,
        txn: &mut Transaction,
        offset: usize,
        chunk: &str,
        attributes: Option<&Attributes>,
    ) -> Result<(), DocumentError> {
        self.check_range(txn, offset, 0)?;
        if chunk.is_empty() {
            return Ok(());
        }
        match attributes {
            Some(attrs) => {
                self.text.insert_with_attributes(
                    txn.write(),
                    offset as u32,
                    chunk,
                    attrs.to_store_attrs(),
                );
            }
            None => self.text.insert(txn.write(), offset as u32, chunk),
        }
        Ok(())
    }

    /// Delete `length` units starting at `offset`.
    pub fn delete(
        &self,
        txn: &mut Transaction,
        offset: usize,
        length: usize,
    ) -> Result<(), DocumentError> {
        self.check_range(txn, offset, length)?;
        if length == 0 {
            return Ok(());
        }
        self.text
            .remove_range(txn.write(), offset as u32, length as u32);
        Ok(())
    }

    /// Clone the content into an unintegrated text value with independent
    /// identity. The detached value is edited freely and later integrated
    /// as a new block via [`BlockList::insert_at`].
    ///
    /// [`BlockList::insert_at`]: crate::blocks::BlockList::insert_at
    pub fn detach(&self, txn: &Transaction) -> DetachedText {
        DetachedText::from_runs(self.to_runs(txn))
    }

    /// Observe changes. The callback fires exactly once per transaction
    /// that touched this text, with the post-transaction runs; dropping
    /// the returned guard unsubscribes.
    ///
    /// Callbacks run while the transaction is committing: they must not
    /// open a new transaction on the same session.
    pub fn observe<F>(&self, f: F) -> TextSubscription
    where
        F: Fn(&TextChange) + Send + Sync + 'static,
    {
        let text = self.text.clone();
        let sub = self.text.observe(move |txn, _event| {
            let change = TextChange {
                runs: runs_in(&text, txn),
            };
            f(&change);
        });
        TextSubscription { _sub: sub }
    }

    fn check_range(
        &self,
        txn: &Transaction,
        offset: usize,
        length: usize,
    ) -> Result<(), DocumentError> {
        let content = self.get_string(txn);
        let text_len = content.len();
        let out_of_bounds = offset + length > text_len;
        let off_boundary = !out_of_bounds
            && (!content.is_char_boundary(offset) || !content.is_char_boundary(offset + length));
        if out_of_bounds || off_boundary {
            return Err(DocumentError::Range {
                offset,
                length,
                text_len,
            });
        }
        Ok(())
    }
}

/// An unintegrated text value: identical content to its source, but an
/// independent identity. Produced by [`TextModel::detach`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetachedText {
    runs: Vec<Run>,
}

impl DetachedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_runs(runs: Vec<Run>) -> Self {
        Self {
            runs: coalesce_runs(runs),
        }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.iter().map(|run| run.insert.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn plain(&self) -> String {
        flatten_runs(&self.runs)
    }

    /// Delete `length` units starting at `offset`.
    pub fn delete(&mut self, offset: usize, length: usize) -> Result<(), DocumentError> {
        let total = self.len();
        if offset + length > total
            || !self.is_boundary(offset)
            || !self.is_boundary(offset + length)
        {
            return Err(DocumentError::Range {
                offset,
                length,
                text_len: total,
            });
        }
        if length == 0 {
            return Ok(());
        }
        let mut kept = Vec::with_capacity(self.runs.len());
        let mut pos = 0;
        for run in self.runs.drain(..) {
            let run_len = run.insert.len();
            let cut_start = offset.saturating_sub(pos).min(run_len);
            let cut_end = (offset + length).saturating_sub(pos).min(run_len);
            if cut_start < cut_end {
                let mut remaining = String::with_capacity(run_len - (cut_end - cut_start));
                remaining.push_str(&run.insert[..cut_start]);
                remaining.push_str(&run.insert[cut_end..]);
                if !remaining.is_empty() {
                    kept.push(Run::new(remaining, run.attributes));
                }
            } else {
                kept.push(run);
            }
            pos += run_len;
        }
        self.runs = coalesce_runs(kept);
        Ok(())
    }

    fn is_boundary(&self, offset: usize) -> bool {
        match locate_run(&self.runs, offset) {
            Some(pos) if pos.run < self.runs.len() => {
                self.runs[pos.run].insert.is_char_boundary(pos.offset)
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// Project a shared text into coalesced runs under any read transaction.
pub(crate) fn runs_in<T: ReadTxn>(text: &TextRef, txn: &T) -> Vec<Run> {
    let mut runs = Vec::new();
    for diff in text.diff(txn, YChange::identity) {
        if let Out::Any(Any::String(chunk)) = diff.insert {
            let attributes = diff
                .attributes
                .as_deref()
                .map(Attributes::from_store_attrs)
                .unwrap_or_default();
            runs.push(Run::new(chunk.to_string(), attributes));
        }
    }
    coalesce_runs(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> Attributes {
        Attributes {
            bold: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_coalesce_merges_equal_attributes() {
        let runs = coalesce_runs(vec![
            Run::plain("Hel"),
            Run::plain("lo "),
            Run::new("world", bold()),
            Run::new("", bold()),
            Run::new("!", bold()),
        ]);

        assert_eq!(
            runs,
            vec![Run::plain("Hello "), Run::new("world!", bold())]
        );

        // Invariant: no two consecutive runs share attributes.
        for pair in runs.windows(2) {
            assert_ne!(pair[0].attributes, pair[1].attributes);
        }
    }

    #[test]
    fn test_locate_run_positions() {
        let runs = vec![Run::plain("abc"), Run::new("def", bold())];

        assert_eq!(locate_run(&runs, 0), Some(RunPosition { run: 0, offset: 0 }));
        assert_eq!(locate_run(&runs, 2), Some(RunPosition { run: 0, offset: 2 }));
        // Boundary between runs maps to the start of the later run.
        assert_eq!(locate_run(&runs, 3), Some(RunPosition { run: 1, offset: 0 }));
        assert_eq!(locate_run(&runs, 6), Some(RunPosition { run: 2, offset: 0 }));
        assert_eq!(locate_run(&runs, 7), None);
    }

    #[test]
    fn test_detached_delete_across_runs() {
        let mut text = DetachedText::from_runs(vec![
            Run::plain("Hello "),
            Run::new("brave ", bold()),
            Run::plain("world"),
        ]);

        // Remove "o brave w": spans all three runs.
        text.delete(4, 9).unwrap();
        assert_eq!(text.plain(), "Hellorld");
        assert_eq!(text.runs(), &[Run::plain("Hellorld")]);
    }

    #[test]
    fn test_detached_delete_preserves_tail_attributes() {
        let mut text =
            DetachedText::from_runs(vec![Run::plain("ab"), Run::new("cd", bold())]);

        text.delete(0, 3).unwrap();
        assert_eq!(text.runs(), &[Run::new("d", bold())]);
    }

    #[test]
    fn test_detached_delete_out_of_range() {
        let mut text = DetachedText::from_runs(vec![Run::plain("abc")]);

        let err = text.delete(2, 5).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Range {
                offset: 2,
                length: 5,
                text_len: 3
            }
        ));
        // The failed call left the content untouched.
        assert_eq!(text.plain(), "abc");
    }

    #[test]
    fn test_attributes_serialization_round_trip() {
        let run = Run::new(
            "click me",
            Attributes {
                bold: true,
                url: Some("https://example.com".to_string()),
                ..Default::default()
            },
        );

        let json = serde_json::to_string(&run).unwrap();
        let deserialized: Run = serde_json::from_str(&json).unwrap();

        assert_eq!(run, deserialized);
    }

    #[test]
    fn test_store_attrs_round_trip() {
        let attrs = Attributes {
            italic: true,
            code: true,
            url: Some("https://example.com".to_string()),
            ..Default::default()
        };

        let restored = Attributes::from_store_attrs(&attrs.to_store_attrs());
        assert_eq!(attrs, restored);
    }
}
