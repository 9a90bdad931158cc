//! Parsed record content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key name used by [`Field::text`] for single-valued fields.
pub const CONTENT_KEY: &str = "Content";

/// One named sub-value of a field, such as `First` inside `Name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    /// Key name.
    pub name: String,
    /// Key value.
    pub value: String,
}

/// A named field of a record. Fields may repeat within a record
/// (several `Telephone` fields), and keys may repeat within a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, the unit [`FieldRule`](crate::FieldRule)s are keyed by.
    pub name: String,
    /// Attributes such as `Type=Work`.
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Sub-values in document order.
    #[serde(default)]
    pub keys: Vec<FieldKey>,
}

impl Field {
    /// Creates a field with no attributes and no keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            keys: Vec::new(),
        }
    }

    /// Creates a single-valued field stored under [`CONTENT_KEY`].
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name).with_key(CONTENT_KEY, value)
    }

    /// Appends a key.
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.push(FieldKey {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Returns every value stored under key `name`.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.keys
            .iter()
            .filter(move |k| k.name == name)
            .map(|k| k.value.as_str())
    }

    /// Order-independent identity of the whole field: attributes plus the
    /// sorted multiset of keys.
    pub(crate) fn exact_identity(&self) -> (BTreeMap<String, String>, Vec<FieldKey>) {
        let mut keys = self.keys.clone();
        keys.sort();
        (self.attrs.clone(), keys)
    }

    /// Identity of the field restricted to `key_fields`: for each listed
    /// key, the sorted multiset of its values. Attributes do not take part.
    pub(crate) fn key_identity(&self, key_fields: &[String]) -> Vec<Vec<String>> {
        key_fields
            .iter()
            .map(|key| {
                let mut values: Vec<String> = self.values(key).map(str::to_owned).collect();
                values.sort();
                values
            })
            .collect()
    }
}

/// The fields of one record, kept sorted by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldList {
    /// Fields in name order. Instances of one name keep their relative order.
    pub fields: Vec<Field>,
}

impl FieldList {
    /// Creates a list, sorting `fields` by name.
    #[must_use]
    pub fn new(mut fields: Vec<Field>) -> Self {
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Self { fields }
    }

    /// Adds a field, keeping name order.
    pub fn push(&mut self, field: Field) {
        let at = self.fields.partition_point(|f| f.name <= field.name);
        self.fields.insert(at, field);
    }

    /// Returns the instances of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> &[Field] {
        let start = self.fields.partition_point(|f| f.name.as_str() < name);
        let end = self.fields.partition_point(|f| f.name.as_str() <= name);
        &self.fields[start..end]
    }

    /// Groups consecutive instances by name.
    pub(crate) fn groups(&self) -> Vec<(&str, &[Field])> {
        let mut out = Vec::new();
        let mut start = 0;
        while start < self.fields.len() {
            let name = self.fields[start].name.as_str();
            let len = self.fields[start..].iter().take_while(|f| f.name == name).count();
            out.push((name, &self.fields[start..start + len]));
            start += len;
        }
        out
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the list holds no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
