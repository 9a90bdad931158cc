//! Per-format capabilities.

use crate::classifier::Classification;
use crate::error::{ProtocolError, ProtocolResult};
use crate::field::FieldList;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Format tag of [`FieldListFormat`].
pub const FIELD_LIST_FORMAT: &str = "fields";

/// A forked copy of a record produced by [`FormatDelegate::duplicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatedPayload {
    /// Uid of the fork.
    pub uid: String,
    /// Content of the fork.
    pub data: Vec<u8>,
}

/// What the engine needs to know about one payload format.
///
/// Delegates are selected at runtime by the payload's format tag through a
/// [`FormatRegistry`].
pub trait FormatDelegate: Send + Sync + fmt::Debug {
    /// Returns the format tag this delegate handles.
    fn name(&self) -> &str;

    /// Parses a payload into the fields the classifier walks.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid for this format.
    fn extract_fields(&self, data: &[u8]) -> ProtocolResult<FieldList>;

    /// Compares two payloads with a format-specific rule.
    ///
    /// Returns `None` to fall back to the field-weighted classifier.
    fn compare(&self, _a: &[u8], _b: &[u8]) -> Option<ProtocolResult<Classification>> {
        None
    }

    /// Forks a payload into a new entity. `attempt` starts at 1 and grows
    /// when a previous fork's uid was already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be copied.
    fn duplicate(&self, uid: &str, data: &[u8], attempt: u32) -> ProtocolResult<DuplicatedPayload> {
        Ok(DuplicatedPayload {
            uid: format!("{uid}-dup{attempt}"),
            data: data.to_vec(),
        })
    }

    /// Renders a payload for humans.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid for this format.
    fn print(&self, data: &[u8]) -> ProtocolResult<String>;
}

/// Format delegates keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Arc<dyn FormatDelegate>>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `delegate` under its own tag, replacing any previous one.
    pub fn register(&mut self, delegate: Arc<dyn FormatDelegate>) {
        self.formats.insert(delegate.name().to_owned(), delegate);
    }

    /// Returns the delegate for `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownFormat`] if none is registered.
    pub fn get(&self, tag: &str) -> ProtocolResult<&Arc<dyn FormatDelegate>> {
        self.formats
            .get(tag)
            .ok_or_else(|| ProtocolError::UnknownFormat(tag.to_owned()))
    }

    /// Returns true if `tag` is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.formats.contains_key(tag)
    }

    /// Returns the registered tags in order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }
}

/// Built-in format whose payload is a CBOR-encoded [`FieldList`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldListFormat;

impl FieldListFormat {
    /// Encodes `fields` into a payload body.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(fields: &FieldList) -> ProtocolResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(fields, &mut out).map_err(|e| ProtocolError::Codec(e.to_string()))?;
        Ok(out)
    }

    /// Decodes a payload body.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a valid field list.
    pub fn decode(data: &[u8]) -> ProtocolResult<FieldList> {
        let list: FieldList =
            ciborium::from_reader(data).map_err(|e| ProtocolError::Codec(e.to_string()))?;
        // encoders outside this crate may not keep names ordered
        Ok(FieldList::new(list.fields))
    }
}

impl FormatDelegate for FieldListFormat {
    fn name(&self) -> &str {
        FIELD_LIST_FORMAT
    }

    fn extract_fields(&self, data: &[u8]) -> ProtocolResult<FieldList> {
        Self::decode(data)
    }

    fn print(&self, data: &[u8]) -> ProtocolResult<String> {
        let list = Self::decode(data)?;
        let mut out = String::new();
        for field in &list.fields {
            out.push_str(&field.name);
            for (name, value) in &field.attrs {
                out.push_str(&format!(" {name}={value}"));
            }
            out.push(':');
            for key in &field.keys {
                out.push_str(&format!(" {}={:?}", key.name, key.value));
            }
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    #[test]
    fn field_list_round_trip_restores_order() {
        let list = FieldList {
            fields: vec![Field::text("Note", "n"), Field::text("EMail", "e")],
        };
        let data = FieldListFormat::encode(&list).unwrap();
        let decoded = FieldListFormat.extract_fields(&data).unwrap();
        assert_eq!(decoded.fields[0].name, "EMail");
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            FieldListFormat.extract_fields(&[0xFF, 0x00]),
            Err(ProtocolError::Codec(_))
        ));
    }

    #[test]
    fn print_lists_fields() {
        let list = FieldList::new(vec![Field::text("Tel", "1").with_attr("Type", "Work")]);
        let data = FieldListFormat::encode(&list).unwrap();
        assert_eq!(FieldListFormat.print(&data).unwrap(), "Tel Type=Work: Content=\"1\"\n");
    }

    #[test]
    fn duplicate_renames_uid() {
        let fork = FieldListFormat.duplicate("abc", b"x", 2).unwrap();
        assert_eq!(fork.uid, "abc-dup2");
        assert_eq!(fork.data, b"x");
    }

    #[test]
    fn registry_lookup() {
        let mut registry = FormatRegistry::new();
        registry.register(Arc::new(FieldListFormat));
        assert!(registry.get(FIELD_LIST_FORMAT).is_ok());
        assert!(matches!(registry.get("vcard"), Err(ProtocolError::UnknownFormat(_))));
    }
}
