//! # peersync protocol
//!
//! Data model and record classification shared by every peersync crate.
//!
//! This crate provides:
//! - [`Record`], [`ChangeKind`] and [`Payload`], the unit of synchronized data
//! - [`Field`] and [`FieldList`], the parsed form a payload is compared in
//! - [`ConflictClassifier`], the field-weighted `Same`/`Similar`/`Mismatch`
//!   comparison driven by [`ClassifierRules`]
//! - [`FormatDelegate`], the per-format capability selected by format tag,
//!   and [`Environment`], which owns the registered formats and their rules
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Example
//!
//! ```rust
//! use peersync_protocol::{Classification, ClassifierRules, ConflictClassifier, Field, FieldList, FieldRule};
//!
//! let rules = ClassifierRules::new(50)
//!     .with_rule(FieldRule::points("EMail", 10))
//!     .with_rule(FieldRule::points("Name", 90).with_key_fields(["First", "Last"]));
//!
//! let a = FieldList::new(vec![
//!     Field::text("EMail", "x@y"),
//!     Field::new("Name").with_key("First", "A").with_key("Last", "B"),
//! ]);
//! let mut b = a.clone();
//! b.fields[0] = Field::text("EMail", "other@y");
//!
//! let result = ConflictClassifier::classify_fields(&a, &b, &rules);
//! assert_eq!(result.classification, Classification::Similar);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod environment;
mod error;
mod field;
mod format;
mod record;
mod rules;

pub use classifier::{Classification, Comparison, ConflictClassifier};
pub use environment::Environment;
pub use error::{ProtocolError, ProtocolResult};
pub use field::{Field, FieldKey, FieldList, CONTENT_KEY};
pub use format::{DuplicatedPayload, FieldListFormat, FormatDelegate, FormatRegistry, FIELD_LIST_FORMAT};
pub use record::{ChangeKind, Payload, Record};
pub use rules::{ClassifierRules, FieldRule, Weight};
