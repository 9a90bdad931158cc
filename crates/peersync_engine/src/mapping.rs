//! Correlation of member-local uids to group-wide entities.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Group-wide identity of one logical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing uuid.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the uuid.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bidirectional `(member, uid) <-> entity` table.
///
/// The coordinator reads it to group reported changes, and writes it when
/// records are created or removed on members. Persisting it is up to the
/// implementation.
pub trait MappingTable: Send + Sync {
    /// Returns the entity `uid` of `member` belongs to.
    fn entity_of(&self, member: &str, uid: &str) -> Option<EntityId>;

    /// Returns the uid `entity` has in `member`.
    fn uid_in(&self, entity: EntityId, member: &str) -> Option<String>;

    /// Binds `uid` of `member` to `entity`, replacing previous bindings of
    /// either side.
    fn bind(&mut self, member: &str, uid: &str, entity: EntityId);

    /// Removes the binding of `uid` in `member`, together with any
    /// deletion deferred for it.
    fn unbind(&mut self, member: &str, uid: &str) -> Option<EntityId>;

    /// Remembers that `uid` of `member` has to be deleted the next time the
    /// member reports. The binding stays in place until then.
    fn defer_delete(&mut self, member: &str, uid: &str);

    /// Takes every deletion deferred for `member`, in uid order.
    fn take_deferred(&mut self, member: &str) -> Vec<String>;
}

/// A [`MappingTable`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMappingTable {
    by_uid: BTreeMap<(String, String), EntityId>,
    by_entity: BTreeMap<(EntityId, String), String>,
    deferred: BTreeMap<String, BTreeSet<String>>,
}

impl MemoryMappingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    /// Returns true if there is no binding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }

    /// Returns every `(member, uid)` bound to `entity`.
    #[must_use]
    pub fn members_of(&self, entity: EntityId) -> Vec<(String, String)> {
        self.by_entity
            .range((entity, String::new())..)
            .take_while(|((e, _), _)| *e == entity)
            .map(|((_, member), uid)| (member.clone(), uid.clone()))
            .collect()
    }

    /// Returns the uids whose deletion is deferred for `member`.
    #[must_use]
    pub fn deferred(&self, member: &str) -> Vec<String> {
        self.deferred
            .get(member)
            .map(|uids| uids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl MappingTable for MemoryMappingTable {
    fn entity_of(&self, member: &str, uid: &str) -> Option<EntityId> {
        self.by_uid
            .get(&(member.to_owned(), uid.to_owned()))
            .copied()
    }

    fn uid_in(&self, entity: EntityId, member: &str) -> Option<String> {
        self.by_entity.get(&(entity, member.to_owned())).cloned()
    }

    fn bind(&mut self, member: &str, uid: &str, entity: EntityId) {
        self.unbind(member, uid);
        if let Some(previous) = self.by_entity.remove(&(entity, member.to_owned())) {
            self.by_uid.remove(&(member.to_owned(), previous));
        }
        self.by_uid
            .insert((member.to_owned(), uid.to_owned()), entity);
        self.by_entity
            .insert((entity, member.to_owned()), uid.to_owned());
    }

    fn unbind(&mut self, member: &str, uid: &str) -> Option<EntityId> {
        if let Some(uids) = self.deferred.get_mut(member) {
            uids.remove(uid);
        }
        let entity = self.by_uid.remove(&(member.to_owned(), uid.to_owned()))?;
        self.by_entity.remove(&(entity, member.to_owned()));
        Some(entity)
    }

    fn defer_delete(&mut self, member: &str, uid: &str) {
        self.deferred
            .entry(member.to_owned())
            .or_default()
            .insert(uid.to_owned());
    }

    fn take_deferred(&mut self, member: &str) -> Vec<String> {
        self.deferred
            .remove(member)
            .map(|uids| uids.into_iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_both_directions() {
        let mut table = MemoryMappingTable::new();
        let entity = EntityId::new();
        table.bind("phone", "p1", entity);
        table.bind("laptop", "l7", entity);

        assert_eq!(table.entity_of("phone", "p1"), Some(entity));
        assert_eq!(table.uid_in(entity, "laptop").as_deref(), Some("l7"));
        assert_eq!(table.members_of(entity).len(), 2);
    }

    #[test]
    fn rebinding_replaces_old_bindings() {
        let mut table = MemoryMappingTable::new();
        let first = EntityId::new();
        let second = EntityId::new();
        table.bind("phone", "p1", first);
        table.bind("phone", "p1", second);
        assert_eq!(table.entity_of("phone", "p1"), Some(second));
        assert_eq!(table.uid_in(first, "phone"), None);

        table.bind("phone", "p2", second);
        assert_eq!(table.entity_of("phone", "p1"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unbind() {
        let mut table = MemoryMappingTable::new();
        let entity = EntityId::new();
        table.bind("phone", "p1", entity);
        assert_eq!(table.unbind("phone", "p1"), Some(entity));
        assert_eq!(table.unbind("phone", "p1"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn deferred_deletions_are_taken_once() {
        let mut table = MemoryMappingTable::new();
        let entity = EntityId::new();
        table.bind("phone", "p1", entity);
        table.defer_delete("phone", "p2");
        table.defer_delete("phone", "p1");

        assert_eq!(table.deferred("phone"), ["p1", "p2"]);
        assert_eq!(table.take_deferred("phone"), ["p1", "p2"]);
        assert!(table.take_deferred("phone").is_empty());
        assert_eq!(table.entity_of("phone", "p1"), Some(entity));
    }

    #[test]
    fn unbind_drops_the_deferred_deletion() {
        let mut table = MemoryMappingTable::new();
        table.bind("phone", "p1", EntityId::new());
        table.defer_delete("phone", "p1");
        table.unbind("phone", "p1");
        assert!(table.deferred("phone").is_empty());
    }
}
