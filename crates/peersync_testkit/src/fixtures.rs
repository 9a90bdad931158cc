//! Test fixtures and member helpers.
//!
//! Provides temp-dir backed members and the contact payloads used across
//! the engine tests.

use crate::scripted::ScriptedBackend;
use peersync_engine::{Member, PhaseTimeouts, SessionConfig};
use peersync_protocol::{
    ClassifierRules, Environment, Field, FieldList, FieldListFormat, FieldRule, Payload,
    CONTENT_KEY, FIELD_LIST_FORMAT,
};
use peersync_store::MemberPaths;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Timeouts short enough for paused-clock tests: one second per call.
pub fn fast_timeouts() -> PhaseTimeouts {
    PhaseTimeouts::uniform(Duration::from_secs(1))
}

/// A member whose ledger and anchors live in a temporary directory.
pub struct TestMember {
    /// Member id.
    pub id: String,
    /// The member's backend. Clones share its records and script.
    pub backend: ScriptedBackend,
    /// Session configuration used by [`open`](Self::open).
    pub config: SessionConfig,
    dir: TempDir,
}

impl TestMember {
    /// Creates a member with an empty backend and [`fast_timeouts`].
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            backend: ScriptedBackend::new(),
            config: SessionConfig::new(id).with_timeouts(fast_timeouts()),
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Replaces the timeouts.
    pub fn with_timeouts(mut self, timeouts: PhaseTimeouts) -> Self {
        self.config = self.config.with_timeouts(timeouts);
        self
    }

    /// Opens the member from its directory. Call again after dropping the
    /// previous [`Member`] to simulate a restart.
    pub fn open(&self) -> Member {
        Member::open(self.config.clone(), self.backend.clone(), self.dir.path())
            .expect("Failed to open member state")
    }

    /// Returns the state root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the paths of the member's state files.
    pub fn paths(&self) -> MemberPaths {
        MemberPaths::new(self.dir.path(), &self.id).expect("Invalid member id")
    }
}

/// Contact classification rules: `EMail` weighs 10, `Name` weighs 90
/// keyed on `First`/`Last`, `Revision` is ignored, threshold 50.
pub fn contact_rules() -> ClassifierRules {
    ClassifierRules::new(50)
        .with_rule(FieldRule::points("EMail", 10).with_key_fields([CONTENT_KEY]))
        .with_rule(FieldRule::points("Name", 90).with_key_fields(["First", "Last"]))
        .with_rule(FieldRule::ignore("Revision"))
}

/// An environment classifying field-list payloads with [`contact_rules`].
pub fn contact_env() -> Environment {
    Environment::new().with_rules(FIELD_LIST_FORMAT, contact_rules())
}

/// Builds a contact payload.
pub fn contact(first: &str, last: &str, email: &str) -> Payload {
    let fields = FieldList::new(vec![
        Field::text("EMail", email),
        Field::new("Name").with_key("First", first).with_key("Last", last),
    ]);
    field_payload(&fields)
}

/// Encodes a field list as a payload.
pub fn field_payload(fields: &FieldList) -> Payload {
    let data = FieldListFormat::encode(fields).expect("Failed to encode field list");
    Payload::new(FIELD_LIST_FORMAT, data)
}

/// Builds an opaque text payload.
pub fn text(content: &str) -> Payload {
    Payload::new("text", content.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_protocol::{Classification, ChangeKind, ConflictClassifier, Record};

    #[test]
    fn member_state_persists_in_its_directory() {
        let member = TestMember::new("phone");
        drop(member.open());
        assert!(member.paths().ledger_path().exists());
        assert!(member.paths().dir().starts_with(member.root()));
    }

    #[test]
    fn contacts_classify() {
        let env = contact_env();
        let classifier = ConflictClassifier::new(&env);
        let a = Record::new("1", "h", ChangeKind::Modified, contact("A", "B", "x@y"));
        let b = Record::new("2", "h", ChangeKind::Modified, contact("A", "B", "z@y"));
        let comparison = classifier.classify(&a, &b).unwrap();
        assert_eq!(comparison.classification, Classification::Similar);
    }
}
