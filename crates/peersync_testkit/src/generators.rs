//! Property-based test generators using proptest.
//!
//! Provides strategies for generating field lists, contact payloads and
//! member record snapshots.

use crate::fixtures::{contact, field_payload};
use peersync_protocol::{Field, FieldList, Payload};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating member-local uids.
pub fn uid_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}-[0-9]{1,3}").expect("Invalid regex")
}

/// Strategy for generating short field values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9@.]{0,8}").expect("Invalid regex")
}

/// Strategy for generating one field drawn from a small name pool, so
/// generated lists share names and repeat fields.
pub fn field_strategy() -> impl Strategy<Value = Field> {
    let name = prop::sample::select(vec!["EMail", "Name", "Phone", "Note", "Revision"]);
    let keys = prop::collection::vec(
        (prop::sample::select(vec!["First", "Last", "Content", "Type"]), value_strategy()),
        1..3,
    );
    let attrs = prop::collection::vec((prop::sample::select(vec!["type", "pref"]), value_strategy()), 0..2);

    (name, keys, attrs).prop_map(|(name, keys, attrs)| {
        let field = keys
            .into_iter()
            .fold(Field::new(name), |field, (key, value)| field.with_key(key, value));
        attrs
            .into_iter()
            .fold(field, |field, (attr, value)| field.with_attr(attr, value))
    })
}

/// Strategy for generating field lists of up to eight fields.
pub fn field_list_strategy() -> impl Strategy<Value = FieldList> {
    prop::collection::vec(field_strategy(), 0..8).prop_map(FieldList::new)
}

/// Strategy for generating field-list payloads.
pub fn field_payload_strategy() -> impl Strategy<Value = Payload> {
    field_list_strategy().prop_map(|fields| field_payload(&fields))
}

/// Strategy for generating contact payloads.
pub fn contact_strategy() -> impl Strategy<Value = Payload> {
    (value_strategy(), value_strategy(), value_strategy())
        .prop_map(|(first, last, email)| contact(&first, &last, &email))
}

/// Strategy for generating the records a member holds: uid to payload.
pub fn snapshot_strategy(max_records: usize) -> impl Strategy<Value = BTreeMap<String, Payload>> {
    prop::collection::btree_map(uid_strategy(), contact_strategy(), 0..=max_records)
}

/// Strategy for generating the `(uid, hash)` pairs a change scan yields.
pub fn scan_strategy(max_records: usize) -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        uid_strategy(),
        prop::string::string_regex("h[0-9]{1,2}").expect("Invalid regex"),
        0..=max_records,
    )
}
