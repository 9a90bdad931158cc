//! Turns the change reports of one pass into per-member commit batches.

use crate::config::CoordinatorConfig;
use crate::mapping::{EntityId, MappingTable};
use crate::report::ConflictSummary;
use crate::resolver::{Conflict, ConflictResolver, Resolution};
use crate::session::{BatchItem, CommitBatch, Origin};
use crate::status::{EngineEvent, StatusFeed};
use peersync_protocol::{ChangeKind, Classification, ConflictClassifier, Environment, Payload, Record};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Reported versions of one entity.
#[derive(Debug)]
struct Group {
    entity: EntityId,
    entries: Vec<(String, Record)>,
}

impl Group {
    fn reported_by(&self, member: &str) -> bool {
        self.entries.iter().any(|(m, _)| m == member)
    }

    fn deleted_in(&self, member: &str) -> bool {
        self.entries
            .iter()
            .any(|(m, r)| m == member && r.kind == ChangeKind::Deleted)
    }
}

/// Batches and conflicts decided for one pass.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub batches: BTreeMap<String, CommitBatch>,
    pub conflicts: Vec<ConflictSummary>,
}

fn compare(classifier: &ConflictClassifier<'_>, a: &Record, b: &Record) -> Classification {
    match classifier.classify(a, b) {
        Ok(comparison) => comparison.classification,
        Err(e) => {
            warn!(a = %a.uid, b = %b.uid, error = %e, "records not comparable, treating as mismatch");
            Classification::Mismatch
        }
    }
}

pub(crate) struct Planner<'a> {
    env: &'a Environment,
    config: &'a CoordinatorConfig,
    mapping: &'a mut dyn MappingTable,
    resolver: &'a dyn ConflictResolver,
    feed: &'a StatusFeed,
    registered: &'a [String],
    plan: Plan,
    deleted: Vec<(String, String)>,
}

impl<'a> Planner<'a> {
    pub(crate) fn new(
        env: &'a Environment,
        config: &'a CoordinatorConfig,
        mapping: &'a mut dyn MappingTable,
        resolver: &'a dyn ConflictResolver,
        feed: &'a StatusFeed,
        registered: &'a [String],
    ) -> Self {
        Self {
            env,
            config,
            mapping,
            resolver,
            feed,
            registered,
            plan: Plan::default(),
            deleted: Vec::new(),
        }
    }

    /// Plans the pass. `reports` holds the changes of every member that
    /// finished its scan; only those members receive a batch.
    ///
    /// Deletions that could not reach a member earlier are added to its
    /// batch first, unless the member reported a change of that record.
    pub(crate) fn plan(mut self, reports: &[(String, Vec<Record>)]) -> Plan {
        for (member, changes) in reports {
            let mut batch = CommitBatch::default();
            for uid in self.mapping.take_deferred(member) {
                if changes.iter().any(|r| r.uid == uid) {
                    debug!(%member, %uid, "deferred deletion superseded by a reported change");
                    continue;
                }
                let Some(entity) = self.mapping.entity_of(member, &uid) else {
                    continue;
                };
                debug!(%member, %uid, %entity, "deferred deletion replayed");
                batch.changes.push(BatchItem {
                    entity,
                    record: Record::deleted(uid),
                    origins: Vec::new(),
                });
            }
            self.plan.batches.insert(member.clone(), batch);
        }

        let classifier = ConflictClassifier::new(self.env);
        let groups = self.group(&classifier, reports);
        debug!(groups = groups.len(), "changes grouped");
        for group in groups {
            self.settle(&classifier, group);
        }

        for (member, uid) in std::mem::take(&mut self.deleted) {
            self.mapping.unbind(&member, &uid);
        }
        self.plan
    }

    fn group(&mut self, classifier: &ConflictClassifier<'_>, reports: &[(String, Vec<Record>)]) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<EntityId, usize> = HashMap::new();

        for (member, changes) in reports {
            for record in changes {
                let entity = match self.mapping.entity_of(member, &record.uid) {
                    Some(entity) => entity,
                    None if record.kind == ChangeKind::Deleted => {
                        debug!(%member, uid = %record.uid, "deletion of unmapped record ignored");
                        continue;
                    }
                    None => {
                        let entity = self
                            .match_unmapped(classifier, &groups, member, record)
                            .unwrap_or_else(EntityId::new);
                        self.mapping.bind(member, &record.uid, entity);
                        entity
                    }
                };
                if record.kind == ChangeKind::Deleted {
                    self.deleted.push((member.clone(), record.uid.clone()));
                }

                let entry = (member.clone(), record.clone());
                match index.get(&entity) {
                    Some(&i) => groups[i].entries.push(entry),
                    None => {
                        index.insert(entity, groups.len());
                        groups.push(Group {
                            entity,
                            entries: vec![entry],
                        });
                    }
                }
            }
        }
        groups
    }

    /// Finds a group of this pass the unmapped `record` belongs to.
    fn match_unmapped(
        &self,
        classifier: &ConflictClassifier<'_>,
        groups: &[Group],
        member: &str,
        record: &Record,
    ) -> Option<EntityId> {
        if !self.config.match_unmapped {
            return None;
        }
        groups
            .iter()
            .find(|group| {
                let Some((_, representative)) = group.entries.first() else {
                    return false;
                };
                representative.kind != ChangeKind::Deleted
                    && !group.reported_by(member)
                    && self.mapping.uid_in(group.entity, member).is_none()
                    && compare(classifier, representative, record) != Classification::Mismatch
            })
            .map(|group| group.entity)
    }

    fn settle(&mut self, classifier: &ConflictClassifier<'_>, group: Group) {
        let mut classification = Classification::Same;
        for (i, (_, a)) in group.entries.iter().enumerate() {
            for (_, b) in &group.entries[i + 1..] {
                classification = classification.worst(compare(classifier, a, b));
            }
        }

        if classification == Classification::Same {
            let (_, record) = &group.entries[0];
            let skip: Vec<&str> = group.entries.iter().map(|(m, _)| m.as_str()).collect();
            let origins: Vec<(&str, &Record)> = group
                .entries
                .iter()
                .filter(|(_, r)| r.kind != ChangeKind::Deleted)
                .map(|(m, r)| (m.as_str(), r))
                .collect();
            self.propagate(group.entity, record, &skip, &group, &origins);
            return;
        }

        self.conflict(group, classification);
    }

    fn conflict(&mut self, group: Group, classification: Classification) {
        let entity = group.entity;
        self.feed.engine(EngineEvent::Conflict { entity, classification });
        let conflict = Conflict {
            entity,
            entries: group.entries,
            classification,
        };
        let resolution = self.resolver.resolve(&conflict);
        info!(%entity, ?classification, ?resolution, members = conflict.entries.len(), "conflict");

        let group = Group {
            entity,
            entries: conflict.entries,
        };
        let resolution = match resolution {
            Resolution::Choose(winner) => match group.entries.iter().find(|(m, _)| *m == winner) {
                Some((member, record)) => {
                    let origins = [(member.as_str(), record)];
                    self.propagate(entity, record, &[member.as_str()], &group, &origins);
                    Resolution::Choose(winner)
                }
                None => {
                    warn!(%entity, %winner, "chosen member reported no version, ignoring conflict");
                    self.ignore(&group);
                    Resolution::Ignore
                }
            },
            Resolution::Duplicate => {
                self.duplicate(&group);
                Resolution::Duplicate
            }
            Resolution::Ignore => {
                self.ignore(&group);
                Resolution::Ignore
            }
        };

        self.plan.conflicts.push(ConflictSummary {
            entity,
            members: group.entries.iter().map(|(m, _)| m.clone()).collect(),
            classification,
            resolution,
        });
    }

    fn duplicate(&mut self, group: &Group) {
        for (attempt, (member, record)) in group.entries.iter().enumerate().skip(1) {
            let Some(payload) = &record.payload else {
                continue;
            };
            let attempt = u32::try_from(attempt).unwrap_or(u32::MAX);
            let fork = match self
                .env
                .format(&payload.format)
                .and_then(|delegate| delegate.duplicate(&record.uid, &payload.data, attempt))
            {
                Ok(fork) => fork,
                Err(e) => {
                    warn!(%member, uid = %record.uid, error = %e, "duplicate failed, conflict left for next run");
                    self.invalidate(member, record);
                    continue;
                }
            };

            let entity = EntityId::new();
            self.mapping.bind(member, &record.uid, entity);
            let copy = Record::new(
                fork.uid,
                String::new(),
                ChangeKind::Added,
                Payload::new(payload.format.clone(), fork.data),
            );
            let origins = [(member.as_str(), record)];
            let fresh = Group {
                entity,
                entries: Vec::new(),
            };
            self.propagate(entity, &copy, &[member.as_str()], &fresh, &origins);
        }

        let (member, record) = &group.entries[0];
        let origins = [(member.as_str(), record)];
        self.propagate(group.entity, record, &[member.as_str()], group, &origins);
    }

    fn ignore(&mut self, group: &Group) {
        for (member, record) in &group.entries {
            if record.kind != ChangeKind::Deleted {
                self.invalidate(member, record);
            }
        }
    }

    /// Re-arms `record` in `member` so it is reported again next run.
    fn invalidate(&mut self, member: &str, record: &Record) {
        if let Some(batch) = self.plan.batches.get_mut(member) {
            if !batch.invalidate.iter().any(|(u, _)| *u == record.uid) {
                batch.invalidate.push((record.uid.clone(), record.kind));
            }
        }
    }

    /// Writes `record` to every registered member not in `skip`.
    ///
    /// Members without a batch did not finish their scan. A deletion is
    /// deferred in the mapping table until such a member reports again;
    /// any other change re-arms its `origins` so it is offered again next
    /// run.
    fn propagate(
        &mut self,
        entity: EntityId,
        record: &Record,
        skip: &[&str],
        group: &Group,
        origins: &[(&str, &Record)],
    ) {
        let sources: Vec<Origin> = if record.kind == ChangeKind::Deleted {
            Vec::new()
        } else {
            origins
                .iter()
                .map(|(member, origin)| Origin {
                    member: (*member).to_owned(),
                    uid: origin.uid.clone(),
                    kind: origin.kind,
                })
                .collect()
        };
        let registered = self.registered;
        for target in registered {
            if skip.contains(&target.as_str()) {
                continue;
            }
            if !self.plan.batches.contains_key(target) {
                if record.kind == ChangeKind::Deleted {
                    if let Some(uid) = self.mapping.uid_in(entity, target) {
                        debug!(%target, %entity, %uid, "target did not report, deletion deferred");
                        self.mapping.defer_delete(target, &uid);
                    }
                } else {
                    debug!(%target, %entity, "target did not report, change deferred");
                    for (member, origin) in origins {
                        self.invalidate(member, origin);
                    }
                }
                continue;
            }

            let existing = if group.deleted_in(target) {
                None
            } else {
                self.mapping.uid_in(entity, target)
            };
            let write = match (record.kind, existing) {
                (ChangeKind::Deleted, Some(uid)) => Record::deleted(uid),
                (ChangeKind::Deleted, None) => continue,
                (_, Some(uid)) => Record {
                    uid,
                    hash: String::new(),
                    kind: ChangeKind::Modified,
                    payload: record.payload.clone(),
                },
                (_, None) => Record {
                    uid: record.uid.clone(),
                    hash: String::new(),
                    kind: ChangeKind::Added,
                    payload: record.payload.clone(),
                },
            };
            if let Some(batch) = self.plan.batches.get_mut(target) {
                batch.changes.push(BatchItem {
                    entity,
                    record: write,
                    origins: sources.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MemoryMappingTable;
    use crate::resolver::IgnoreConflicts;
    use peersync_protocol::{ClassifierRules, Field, FieldList, FieldListFormat, FieldRule, FIELD_LIST_FORMAT};

    fn env() -> Environment {
        Environment::new().with_rules(
            FIELD_LIST_FORMAT,
            ClassifierRules::new(50)
                .with_rule(FieldRule::points("EMail", 10).with_key_fields(["Content"]))
                .with_rule(FieldRule::points("Name", 90).with_key_fields(["First", "Last"])),
        )
    }

    fn contact(uid: &str, kind: ChangeKind, email: &str, last: &str) -> Record {
        let fields = FieldList::new(vec![
            Field::text("EMail", email),
            Field::new("Name").with_key("First", "A").with_key("Last", last),
        ]);
        let data = FieldListFormat::encode(&fields).unwrap();
        Record::new(uid, "h", kind, Payload::new(FIELD_LIST_FORMAT, data))
    }

    fn report(member: &str, changes: Vec<Record>) -> (String, Vec<Record>) {
        (member.to_owned(), changes)
    }

    fn members() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    struct Fixture {
        env: Environment,
        config: CoordinatorConfig,
        mapping: MemoryMappingTable,
        feed: StatusFeed,
        registered: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                env: env(),
                config: CoordinatorConfig::new(),
                mapping: MemoryMappingTable::new(),
                feed: StatusFeed::new(),
                registered: members(),
            }
        }

        fn plan(&mut self, resolver: &dyn ConflictResolver, reports: &[(String, Vec<Record>)]) -> Plan {
            Planner::new(
                &self.env,
                &self.config,
                &mut self.mapping,
                resolver,
                &self.feed,
                &self.registered,
            )
            .plan(reports)
        }

        fn map(&mut self, entity: EntityId, bindings: &[(&str, &str)]) {
            for (member, uid) in bindings {
                self.mapping.bind(member, uid, entity);
            }
        }
    }

    fn writes(plan: &Plan, member: &str) -> Vec<(String, ChangeKind)> {
        plan.batches[member]
            .changes
            .iter()
            .map(|item| (item.record.uid.clone(), item.record.kind))
            .collect()
    }

    #[test]
    fn new_record_is_added_everywhere() {
        let mut fx = Fixture::new();
        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Added, "x@y", "B")]),
            report("b", vec![]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);

        assert!(writes(&plan, "a").is_empty());
        assert_eq!(writes(&plan, "b"), vec![("1".to_owned(), ChangeKind::Added)]);
        assert_eq!(writes(&plan, "c"), vec![("1".to_owned(), ChangeKind::Added)]);
        assert!(fx.mapping.entity_of("a", "1").is_some());
    }

    #[test]
    fn mapped_changes_use_target_uids() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "b-7"), ("c", "c-3")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);
        assert_eq!(writes(&plan, "b"), vec![("b-7".to_owned(), ChangeKind::Modified)]);
        assert_eq!(plan.batches["c"].changes[0].entity, entity);
    }

    #[test]
    fn deletions_follow_the_mapping() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "b-7")]);

        let reports = vec![
            report("a", vec![Record::deleted("1")]),
            report("b", vec![Record::deleted("unknown")]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);
        assert_eq!(writes(&plan, "b"), vec![("b-7".to_owned(), ChangeKind::Deleted)]);
        // c never had the entity
        assert!(writes(&plan, "c").is_empty());
        assert_eq!(fx.mapping.entity_of("a", "1"), None);
    }

    #[test]
    fn identical_versions_are_not_conflicts() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![contact("2", ChangeKind::Modified, "x@y", "B")]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);
        assert!(plan.conflicts.is_empty());
        assert!(writes(&plan, "a").is_empty());
        assert!(writes(&plan, "b").is_empty());
        assert_eq!(writes(&plan, "c"), vec![("3".to_owned(), ChangeKind::Modified)]);
    }

    #[test]
    fn chosen_version_overwrites_the_others() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![contact("2", ChangeKind::Modified, "z@y", "B")]),
            report("c", vec![]),
        ];
        let choose_b = |_: &Conflict| Resolution::Choose("b".into());
        let plan = fx.plan(&choose_b, &reports);

        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].classification, Classification::Similar);
        assert_eq!(writes(&plan, "a"), vec![("1".to_owned(), ChangeKind::Modified)]);
        assert!(writes(&plan, "b").is_empty());
        assert_eq!(writes(&plan, "c"), vec![("3".to_owned(), ChangeKind::Modified)]);
        assert_eq!(
            plan.batches["a"].changes[0].record.payload,
            reports[1].1[0].payload
        );
    }

    #[test]
    fn ignored_conflicts_are_rearmed() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "2")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![contact("2", ChangeKind::Modified, "z@y", "Q")]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);
        assert_eq!(plan.conflicts[0].classification, Classification::Mismatch);
        assert_eq!(plan.conflicts[0].resolution, Resolution::Ignore);
        assert_eq!(plan.batches["a"].invalidate, vec![("1".to_owned(), ChangeKind::Modified)]);
        assert_eq!(plan.batches["b"].invalidate, vec![("2".to_owned(), ChangeKind::Modified)]);
        assert!(plan.batches.values().all(|b| b.changes.is_empty()));
    }

    #[test]
    fn choosing_an_absent_member_ignores() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "2")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![contact("2", ChangeKind::Modified, "z@y", "B")]),
        ];
        let choose_c = |_: &Conflict| Resolution::Choose("c".into());
        let plan = fx.plan(&choose_c, &reports);
        assert_eq!(plan.conflicts[0].resolution, Resolution::Ignore);
        assert_eq!(plan.batches["a"].invalidate, vec![("1".to_owned(), ChangeKind::Modified)]);
    }

    #[test]
    fn duplicate_forks_later_versions() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Modified, "x@y", "B")]),
            report("b", vec![contact("2", ChangeKind::Modified, "z@y", "B")]),
            report("c", vec![]),
        ];
        let duplicate = |_: &Conflict| Resolution::Duplicate;
        let plan = fx.plan(&duplicate, &reports);

        // fork of b's version goes to a and c
        assert_eq!(writes(&plan, "a"), vec![("2-dup1".to_owned(), ChangeKind::Added)]);
        // b gets a's version as a new record, c gets it over its own copy
        assert_eq!(writes(&plan, "b"), vec![("1".to_owned(), ChangeKind::Added)]);
        assert_eq!(
            writes(&plan, "c"),
            vec![
                ("2-dup1".to_owned(), ChangeKind::Added),
                ("3".to_owned(), ChangeKind::Modified)
            ]
        );

        let fork = fx.mapping.entity_of("b", "2").unwrap();
        assert_ne!(fork, entity);
        assert_eq!(fx.mapping.entity_of("a", "1"), Some(entity));
    }

    #[test]
    fn silent_members_defer_the_change() {
        let mut fx = Fixture::new();
        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Added, "x@y", "B")]),
            report("c", vec![]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);

        assert!(!plan.batches.contains_key("b"));
        assert_eq!(writes(&plan, "c"), vec![("1".to_owned(), ChangeKind::Added)]);
        assert_eq!(plan.batches["a"].invalidate, vec![("1".to_owned(), ChangeKind::Added)]);
    }

    #[test]
    fn deletion_waits_for_a_silent_member() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "b-7"), ("c", "c-3")]);

        let plan = fx.plan(
            &IgnoreConflicts,
            &[report("a", vec![Record::deleted("1")]), report("c", vec![])],
        );
        assert_eq!(writes(&plan, "c"), vec![("c-3".to_owned(), ChangeKind::Deleted)]);
        assert_eq!(fx.mapping.deferred("b"), ["b-7"]);
        assert_eq!(fx.mapping.entity_of("b", "b-7"), Some(entity));
        assert_eq!(fx.mapping.entity_of("a", "1"), None);

        // b still silent: nothing changes
        let plan = fx.plan(&IgnoreConflicts, &[report("a", vec![]), report("c", vec![])]);
        assert!(plan.batches.values().all(|b| b.changes.is_empty()));
        assert_eq!(fx.mapping.deferred("b"), ["b-7"]);

        let plan = fx.plan(
            &IgnoreConflicts,
            &[report("a", vec![]), report("b", vec![]), report("c", vec![])],
        );
        assert_eq!(writes(&plan, "b"), vec![("b-7".to_owned(), ChangeKind::Deleted)]);
        assert_eq!(plan.batches["b"].changes[0].entity, entity);
        assert!(fx.mapping.deferred("b").is_empty());
    }

    #[test]
    fn reported_edit_beats_a_deferred_deletion() {
        let mut fx = Fixture::new();
        let entity = EntityId::new();
        fx.map(entity, &[("a", "1"), ("b", "b-7")]);
        fx.plan(&IgnoreConflicts, &[report("a", vec![Record::deleted("1")])]);
        assert_eq!(fx.mapping.deferred("b"), ["b-7"]);

        let plan = fx.plan(
            &IgnoreConflicts,
            &[
                report("a", vec![]),
                report("b", vec![contact("b-7", ChangeKind::Modified, "x@y", "B")]),
                report("c", vec![]),
            ],
        );
        assert!(writes(&plan, "b").is_empty());
        assert_eq!(writes(&plan, "a"), vec![("b-7".to_owned(), ChangeKind::Added)]);
        assert!(fx.mapping.deferred("b").is_empty());
    }

    #[test]
    fn unmapped_records_merge_when_enabled() {
        let mut fx = Fixture::new();
        fx.config = CoordinatorConfig::new().with_match_unmapped(true);

        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Added, "x@y", "B")]),
            report("b", vec![contact("9", ChangeKind::Added, "x@y", "B")]),
            report("c", vec![contact("5", ChangeKind::Added, "q@r", "Z")]),
        ];
        let plan = fx.plan(&IgnoreConflicts, &reports);

        assert_eq!(fx.mapping.entity_of("a", "1"), fx.mapping.entity_of("b", "9"));
        assert_ne!(fx.mapping.entity_of("a", "1"), fx.mapping.entity_of("c", "5"));
        assert!(plan.conflicts.is_empty());
        // a and b already agree, c gets the merged contact
        assert_eq!(writes(&plan, "a"), vec![("5".to_owned(), ChangeKind::Added)]);
        assert_eq!(writes(&plan, "b"), vec![("5".to_owned(), ChangeKind::Added)]);
        assert_eq!(writes(&plan, "c"), vec![("1".to_owned(), ChangeKind::Added)]);
    }

    #[test]
    fn unmapped_records_stay_apart_by_default() {
        let mut fx = Fixture::new();
        let reports = vec![
            report("a", vec![contact("1", ChangeKind::Added, "x@y", "B")]),
            report("b", vec![contact("9", ChangeKind::Added, "x@y", "B")]),
        ];
        fx.plan(&IgnoreConflicts, &reports);
        assert_ne!(fx.mapping.entity_of("a", "1"), fx.mapping.entity_of("b", "9"));
    }
}
