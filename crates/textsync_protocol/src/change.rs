//! Change sets over plain text.
//!
//! A [`ChangeSet`] describes one editing transaction as a sequence of spans
//! that walk the *whole* base document: retained spans are copied, deleted
//! spans are dropped, inserted text is spliced in. Offsets and lengths count
//! `char`s (Unicode scalar values), never bytes.
//!
//! Besides applying to a document, change sets support the two operations the
//! reconciliation layer is built from:
//!
//! - [`ChangeSet::compose`]: `b` after `a` as a single change set.
//! - [`ChangeSet::map`]: rebase a change set over a concurrent one that starts
//!   from the same document.
//!
//! # Invariants
//!
//! - Spans are normalized: no empty spans, adjacent spans of one kind are
//!   merged, and an insertion adjacent to a deletion is stored first.
//! - `len_before()` equals the length of every document the set applies to.

use crate::error::{ProtocolError, ProtocolResult};

/// One span of a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Keep the next `n` characters.
    Retain(usize),
    /// Remove the next `n` characters.
    Delete(usize),
    /// Insert text at the current position.
    Insert(String),
}

impl Span {
    /// Number of characters this span covers (inserted characters for inserts).
    pub fn len(&self) -> usize {
        match self {
            Span::Retain(n) | Span::Delete(n) => *n,
            Span::Insert(text) => char_len(text),
        }
    }

    /// Returns true for a zero-length span.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable, normalized sequence of spans produced by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    spans: Vec<Span>,
    len_before: usize,
    len_after: usize,
}

impl ChangeSet {
    /// A change set that keeps a document of `len` characters as is.
    pub fn identity(len: usize) -> Self {
        let mut builder = ChangeSetBuilder::new();
        builder.retain(len);
        builder.finish()
    }

    /// Replaces `delete` characters at `at` with `text` in a document of `doc_len` characters.
    pub fn replace(doc_len: usize, at: usize, delete: usize, text: &str) -> ProtocolResult<Self> {
        let end = at.checked_add(delete).filter(|end| *end <= doc_len).ok_or_else(|| {
            ProtocolError::malformed(format!(
                "span {at}+{delete} out of bounds for document of length {doc_len}"
            ))
        })?;

        let mut builder = ChangeSetBuilder::new();
        builder
            .retain(at)
            .delete(delete)
            .insert(text)
            .retain(doc_len - end);
        Ok(builder.finish())
    }

    /// Inserts `text` at `at`.
    pub fn insert(doc_len: usize, at: usize, text: &str) -> ProtocolResult<Self> {
        Self::replace(doc_len, at, 0, text)
    }

    /// Deletes `count` characters starting at `at`.
    pub fn delete(doc_len: usize, at: usize, count: usize) -> ProtocolResult<Self> {
        Self::replace(doc_len, at, count, "")
    }

    /// Builds a normalized change set from arbitrary spans.
    pub fn from_spans(spans: impl IntoIterator<Item = Span>) -> Self {
        let mut builder = ChangeSetBuilder::new();
        for span in spans {
            builder.push(span);
        }
        builder.finish()
    }

    /// The normalized spans.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Length of the document this set applies to.
    pub fn len_before(&self) -> usize {
        self.len_before
    }

    /// Length of the document this set produces.
    pub fn len_after(&self) -> usize {
        self.len_after
    }

    /// Returns true if applying this set leaves every document unchanged.
    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|span| matches!(span, Span::Retain(_)))
    }

    /// Applies the change set to `doc`.
    ///
    /// Fails without touching anything when the spans do not cover `doc`
    /// exactly, i.e. they address positions outside the document.
    pub fn apply(&self, doc: &str) -> ProtocolResult<String> {
        let doc_len = char_len(doc);
        if doc_len != self.len_before {
            return Err(ProtocolError::LengthMismatch {
                expected: self.len_before,
                actual: doc_len,
            });
        }

        let mut out = String::with_capacity(doc.len());
        let mut chars = doc.chars();
        for span in &self.spans {
            match span {
                Span::Retain(n) => out.extend(chars.by_ref().take(*n)),
                Span::Delete(n) => {
                    chars.by_ref().take(*n).for_each(drop);
                }
                Span::Insert(text) => out.push_str(text),
            }
        }
        Ok(out)
    }

    /// Composes `self` with `other`, which must start from the document `self` produces.
    pub fn compose(&self, other: &ChangeSet) -> ProtocolResult<ChangeSet> {
        if self.len_after != other.len_before {
            return Err(ProtocolError::LengthMismatch {
                expected: self.len_after,
                actual: other.len_before,
            });
        }

        let mut out = ChangeSetBuilder::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);

        loop {
            match (&a.current, &b.current) {
                (None, None) => break,
                (Some(Span::Delete(n)), _) => {
                    out.delete(*n);
                    a.advance();
                }
                (_, Some(Span::Insert(text))) => {
                    out.insert(text);
                    b.advance();
                }
                (None, _) | (_, None) => {
                    return Err(ProtocolError::malformed("composed change sets do not line up"));
                }
                (Some(Span::Retain(x)), Some(Span::Retain(y))) => {
                    let n = (*x).min(*y);
                    out.retain(n);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Retain(x)), Some(Span::Delete(y))) => {
                    let n = (*x).min(*y);
                    out.delete(n);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Insert(text)), Some(Span::Retain(y))) => {
                    let n = char_len(text).min(*y);
                    let kept: String = text.chars().take(n).collect();
                    out.insert(&kept);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Insert(text)), Some(Span::Delete(y))) => {
                    // Inserted by `self`, removed again by `other`.
                    let n = char_len(text).min(*y);
                    a.consume(n);
                    b.consume(n);
                }
            }
        }

        Ok(out.finish())
    }

    /// Rebases `self` over `other`; both must start from the same document.
    ///
    /// The result applies to the document `other` produces. Where both sets
    /// insert at the same position, `before` puts the insertion of `self`
    /// first; otherwise the insertion of `other` comes first.
    pub fn map(&self, other: &ChangeSet, before: bool) -> ProtocolResult<ChangeSet> {
        if self.len_before != other.len_before {
            return Err(ProtocolError::LengthMismatch {
                expected: other.len_before,
                actual: self.len_before,
            });
        }

        let mut out = ChangeSetBuilder::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);

        loop {
            match (&a.current, &b.current) {
                (None, None) => break,
                (
                    Some(Span::Insert(text)),
                    None | Some(Span::Retain(_)) | Some(Span::Delete(_)),
                ) => {
                    out.insert(text);
                    a.advance();
                }
                (Some(Span::Insert(text)), Some(Span::Insert(_))) if before => {
                    out.insert(text);
                    a.advance();
                }
                (_, Some(Span::Insert(text))) => {
                    out.retain(char_len(text));
                    b.advance();
                }
                (None, _) | (_, None) => {
                    return Err(ProtocolError::malformed("mapped change sets do not line up"));
                }
                (Some(Span::Retain(x)), Some(Span::Retain(y))) => {
                    let n = (*x).min(*y);
                    out.retain(n);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Delete(x)), Some(Span::Delete(y))) => {
                    let n = (*x).min(*y);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Delete(x)), Some(Span::Retain(y))) => {
                    let n = (*x).min(*y);
                    out.delete(n);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Span::Retain(x)), Some(Span::Delete(y))) => {
                    let n = (*x).min(*y);
                    a.consume(n);
                    b.consume(n);
                }
            }
        }

        Ok(out.finish())
    }
}

/// Incremental, normalizing constructor for [`ChangeSet`].
///
/// ```
/// use textsync_protocol::ChangeSetBuilder;
///
/// let mut builder = ChangeSetBuilder::new();
/// builder.retain(8).insert(" ").retain(4);
/// let changes = builder.finish();
///
/// assert_eq!(changes.apply("int main(){}").unwrap(), "int main() {}");
/// ```
#[derive(Debug, Default)]
pub struct ChangeSetBuilder {
    spans: Vec<Span>,
    len_before: usize,
    len_after: usize,
}

impl ChangeSetBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the next `n` characters.
    pub fn retain(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.len_before = self.len_before.saturating_add(n);
        self.len_after = self.len_after.saturating_add(n);
        match self.spans.last_mut() {
            Some(Span::Retain(last)) => *last = last.saturating_add(n),
            _ => self.spans.push(Span::Retain(n)),
        }
        self
    }

    /// Removes the next `n` characters.
    pub fn delete(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.len_before = self.len_before.saturating_add(n);
        match self.spans.last_mut() {
            Some(Span::Delete(last)) => *last = last.saturating_add(n),
            _ => self.spans.push(Span::Delete(n)),
        }
        self
    }

    /// Inserts `text` at the current position.
    pub fn insert(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        self.len_after = self.len_after.saturating_add(char_len(text));

        let n = self.spans.len();
        if matches!(self.spans.last(), Some(Span::Insert(_))) {
            if let Some(Span::Insert(last)) = self.spans.last_mut() {
                last.push_str(text);
            }
        } else if matches!(self.spans.last(), Some(Span::Delete(_))) {
            // Insertions sit before an adjacent deletion.
            match self.spans.get_mut(n.wrapping_sub(2)) {
                Some(Span::Insert(prev)) => prev.push_str(text),
                _ => self.spans.insert(n - 1, Span::Insert(text.to_owned())),
            }
        } else {
            self.spans.push(Span::Insert(text.to_owned()));
        }
        self
    }

    /// Appends an arbitrary span.
    pub fn push(&mut self, span: Span) -> &mut Self {
        match span {
            Span::Retain(n) => self.retain(n),
            Span::Delete(n) => self.delete(n),
            Span::Insert(text) => self.insert(&text),
        }
    }

    /// Returns the finished change set and resets the builder.
    pub fn finish(&mut self) -> ChangeSet {
        let builder = std::mem::take(self);
        ChangeSet {
            spans: builder.spans,
            len_before: builder.len_before,
            len_after: builder.len_after,
        }
    }
}

/// Walks the spans of a change set, splitting them as they are consumed.
struct Cursor<'a> {
    rest: std::slice::Iter<'a, Span>,
    current: Option<Span>,
}

impl<'a> Cursor<'a> {
    fn new(changes: &'a ChangeSet) -> Self {
        let mut rest = changes.spans.iter();
        let current = rest.next().cloned();
        Self { rest, current }
    }

    fn advance(&mut self) {
        self.current = self.rest.next().cloned();
    }

    /// Consumes `n` characters of the current span, keeping any remainder.
    fn consume(&mut self, n: usize) {
        match self.current.take() {
            Some(Span::Retain(len)) if len > n => self.current = Some(Span::Retain(len - n)),
            Some(Span::Delete(len)) if len > n => self.current = Some(Span::Delete(len - n)),
            Some(Span::Insert(text)) if char_len(&text) > n => {
                self.current = Some(Span::Insert(text.chars().skip(n).collect()));
            }
            _ => self.advance(),
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
