//! Change Log Bridge: the transmissible form of updates.
//!
//! A change set travels as a JSON-compatible list of sections:
//!
//! - a bare integer `n` keeps the next `n` characters,
//! - an array `[del, line0, line1, ...]` deletes `del` characters and inserts
//!   the lines joined with `\n` (`[del]` alone is a pure deletion).
//!
//! ```text
//! [8, [0, " "], 4]          insert " " at offset 8 of a 12 character document
//! [1, [3, "a", "b"]]        replace 3 characters after offset 1 with "a\nb"
//! ```
//!
//! Decoding is structural only. Whether the spans fit a document is checked
//! when the change set is applied.

use serde::{Deserialize, Serialize};

use crate::change::{ChangeSet, ChangeSetBuilder, Span};
use crate::error::{ProtocolError, ProtocolResult};
use crate::update::{ClientId, Update};

/// One section of a wire change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireSection {
    /// Number of retained characters.
    Retain(i64),
    /// `[deleteLen, line0, line1, ...]`.
    Replace(Vec<WireItem>),
}

/// An element of a replace section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireItem {
    /// Delete length (first element only).
    Length(i64),
    /// One inserted line.
    Line(String),
}

/// Wire form of a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireChangeSet(pub Vec<WireSection>);

impl WireChangeSet {
    /// Encodes a change set. Never fails.
    pub fn from_change_set(changes: &ChangeSet) -> Self {
        let mut sections = Vec::with_capacity(changes.spans().len());
        let mut inserted: Option<&str> = None;

        for span in changes.spans() {
            match span {
                Span::Retain(n) => {
                    if let Some(text) = inserted.take() {
                        sections.push(replace_section(0, text));
                    }
                    sections.push(WireSection::Retain(*n as i64));
                }
                Span::Insert(text) => inserted = Some(text),
                Span::Delete(n) => {
                    sections.push(replace_section(*n, inserted.take().unwrap_or("")));
                }
            }
        }
        if let Some(text) = inserted {
            sections.push(replace_section(0, text));
        }

        Self(sections)
    }

    /// Decodes into a change set.
    pub fn to_change_set(&self) -> ProtocolResult<ChangeSet> {
        let mut builder = ChangeSetBuilder::new();
        let mut before = 0usize;
        let mut after = 0usize;

        for (index, section) in self.0.iter().enumerate() {
            match section {
                WireSection::Retain(n) => {
                    let n = length(*n, index)?;
                    before = grow(before, n, index)?;
                    after = grow(after, n, index)?;
                    builder.retain(n);
                }
                WireSection::Replace(items) => {
                    let (first, lines) = items.split_first().ok_or_else(|| {
                        ProtocolError::malformed(format!("empty replace section at {index}"))
                    })?;
                    let delete = match first {
                        WireItem::Length(n) => length(*n, index)?,
                        WireItem::Line(_) => {
                            return Err(ProtocolError::malformed(format!(
                                "replace section at {index} does not start with a length"
                            )))
                        }
                    };

                    let mut text = Vec::with_capacity(lines.len());
                    for item in lines {
                        match item {
                            WireItem::Line(line) => text.push(line.as_str()),
                            WireItem::Length(_) => {
                                return Err(ProtocolError::malformed(format!(
                                    "non-text line in replace section at {index}"
                                )))
                            }
                        }
                    }

                    before = grow(before, delete, index)?;
                    if !text.is_empty() {
                        let text = text.join("\n");
                        after = grow(after, text.chars().count(), index)?;
                        builder.insert(&text);
                    }
                    builder.delete(delete);
                }
            }
        }

        Ok(builder.finish())
    }
}

fn grow(total: usize, n: usize, index: usize) -> ProtocolResult<usize> {
    total
        .checked_add(n)
        .ok_or_else(|| ProtocolError::malformed(format!("length overflow at section {index}")))
}

fn replace_section(delete: usize, text: &str) -> WireSection {
    let mut items = vec![WireItem::Length(delete as i64)];
    if !text.is_empty() {
        items.extend(text.split('\n').map(|line| WireItem::Line(line.to_owned())));
    }
    WireSection::Replace(items)
}

fn length(n: i64, index: usize) -> ProtocolResult<usize> {
    usize::try_from(n)
        .map_err(|_| ProtocolError::malformed(format!("negative length {n} at section {index}")))
}

/// Wire form of an [`Update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUpdate {
    /// Originating client.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    /// Encoded changes.
    pub changes: WireChangeSet,
}

/// Converts a local update into its wire form.
pub fn serialize(update: &Update) -> WireUpdate {
    WireUpdate {
        client_id: update.client_id.clone(),
        changes: WireChangeSet::from_change_set(&update.changes),
    }
}

/// Converts a wire update back into a local update.
///
/// Fails with [`ProtocolError::MalformedChangeSet`] when the sections do not
/// describe a valid span sequence.
pub fn deserialize(wire: &WireUpdate) -> ProtocolResult<Update> {
    Ok(Update {
        client_id: wire.client_id.clone(),
        changes: wire.changes.to_change_set()?,
    })
}

/// Serializes a batch of updates.
pub fn serialize_all(updates: &[Update]) -> Vec<WireUpdate> {
    updates.iter().map(serialize).collect()
}

/// Deserializes a batch, failing on the first malformed entry.
pub fn deserialize_all(updates: &[WireUpdate]) -> ProtocolResult<Vec<Update>> {
    updates.iter().map(deserialize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wire(json: &str) -> WireChangeSet {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn json_shape() {
        let changes = ChangeSet::insert(12, 8, " ").unwrap();
        let json = serde_json::to_string(&WireChangeSet::from_change_set(&changes)).unwrap();
        assert_eq!(json, r#"[8,[0," "],4]"#);

        let changes = ChangeSet::replace(5, 1, 3, "a\nb").unwrap();
        let json = serde_json::to_string(&WireChangeSet::from_change_set(&changes)).unwrap();
        assert_eq!(json, r#"[1,[3,"a","b"],1]"#);

        let changes = ChangeSet::delete(4, 0, 4).unwrap();
        let json = serde_json::to_string(&WireChangeSet::from_change_set(&changes)).unwrap();
        assert_eq!(json, "[[4]]");
    }

    #[test]
    fn update_json_uses_client_id_key() {
        let update = Update::new("c1".into(), ChangeSet::insert(0, 0, "hi").unwrap());
        let json = serde_json::to_string(&serialize(&update)).unwrap();
        assert_eq!(json, r#"{"clientID":"c1","changes":[[0,"hi"]]}"#);
    }

    #[test]
    fn decodes_newlines() {
        let changes = wire(r#"[[0, "one", "", "two"], 3]"#).to_change_set().unwrap();
        assert_eq!(changes.apply("abc").unwrap(), "one\n\ntwoabc");
    }

    #[test]
    fn rejects_malformed_sections() {
        for json in [
            "[[]]",
            r#"[["x"]]"#,
            r#"[[1, "a", 2]]"#,
            "[-1]",
            "[[-3]]",
            "[9223372036854775807,9223372036854775807,9223372036854775807]",
            "[[9223372036854775807],[9223372036854775807],[9223372036854775807]]",
            r#"[9223372036854775807,9223372036854775807,[0,"a"],9223372036854775807]"#,
        ] {
            let err = wire(json).to_change_set().unwrap_err();
            assert!(
                matches!(err, ProtocolError::MalformedChangeSet { .. }),
                "{json}: {err}"
            );
        }
    }

    #[test]
    fn corrupt_encoding_fails_to_parse() {
        assert!(serde_json::from_str::<WireChangeSet>(r#"[1.5]"#).is_err());
        assert!(serde_json::from_str::<WireChangeSet>(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn batch_fails_on_first_bad_entry() {
        let good = serialize(&Update::new("a".into(), ChangeSet::identity(2)));
        let bad = WireUpdate {
            client_id: "b".into(),
            changes: wire("[[]]"),
        };
        assert!(deserialize_all(&[good.clone(), bad]).is_err());
        assert_eq!(deserialize_all(&[good]).unwrap().len(), 1);
    }

    fn span_strategy() -> impl Strategy<Value = Span> {
        prop_oneof![
            (0usize..5).prop_map(Span::Retain),
            (0usize..5).prop_map(Span::Delete),
            "[a-c\n]{0,4}".prop_map(Span::Insert),
        ]
    }

    proptest! {
        #[test]
        fn round_trip(spans in prop::collection::vec(span_strategy(), 0..10)) {
            let update = Update::new(ClientId::new("p"), ChangeSet::from_spans(spans));
            let decoded = deserialize(&serialize(&update)).unwrap();
            prop_assert_eq!(decoded, update);
        }
    }
}
