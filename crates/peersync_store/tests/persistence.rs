//! Durability and change-detection properties of the persisted member state.

use peersync_protocol::ChangeKind;
use peersync_store::{ChangeLedger, MemberPaths};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn scan(ledger: &mut ChangeLedger, records: &BTreeMap<String, String>) -> Vec<(String, ChangeKind)> {
    ledger.reset_reports();
    let mut out: Vec<(String, ChangeKind)> = records
        .iter()
        .map(|(uid, hash)| (uid.clone(), ledger.record_seen(uid, hash).unwrap()))
        .collect();
    let deleted = ledger.deleted_uids();
    ledger.purge(&deleted).unwrap();
    out.extend(deleted.into_iter().map(|uid| (uid, ChangeKind::Deleted)));
    out
}

#[test]
fn ledger_survives_restart() {
    let dir = tempdir().unwrap();
    let paths = MemberPaths::new(dir.path(), "phone").unwrap();
    let records: BTreeMap<String, String> =
        [("a", "h1"), ("b", "h2")].iter().map(|(k, v)| ((*k).into(), (*v).into())).collect();

    {
        let mut ledger = paths.open_ledger().unwrap();
        scan(&mut ledger, &records);
        ledger.sync().unwrap();
    }

    let mut ledger = paths.open_ledger().unwrap();
    assert_eq!(ledger.len(), 2);
    let kinds = scan(&mut ledger, &records);
    assert!(kinds.iter().all(|(_, kind)| *kind == ChangeKind::Unmodified));
}

#[test]
fn deletion_is_reported_once() {
    let dir = tempdir().unwrap();
    let paths = MemberPaths::new(dir.path(), "phone").unwrap();
    let mut ledger = paths.open_ledger().unwrap();

    let mut records: BTreeMap<String, String> = BTreeMap::new();
    records.insert("A".into(), "h1".into());
    records.insert("B".into(), "h2".into());
    scan(&mut ledger, &records);

    records.remove("B");
    let kinds = scan(&mut ledger, &records);
    assert_eq!(
        kinds,
        vec![
            ("A".to_owned(), ChangeKind::Unmodified),
            ("B".to_owned(), ChangeKind::Deleted),
        ]
    );

    let kinds = scan(&mut ledger, &records);
    assert_eq!(kinds, vec![("A".to_owned(), ChangeKind::Unmodified)]);
}

#[test]
fn anchors_check_then_update_across_restart() {
    let dir = tempdir().unwrap();
    let paths = MemberPaths::new(dir.path(), "file-sync").unwrap();

    {
        let anchors = paths.open_anchors().unwrap();
        assert!(anchors.check_and_maybe_flag("file-sync", "path", "/data"));
    }
    {
        let mut anchors = paths.open_anchors().unwrap();
        assert!(anchors.check_and_maybe_flag("file-sync", "path", "/data"));
        anchors.update("file-sync", "path", "/data").unwrap();
        anchors.sync().unwrap();
    }

    let anchors = paths.open_anchors().unwrap();
    assert!(!anchors.check_and_maybe_flag("file-sync", "path", "/data"));
    assert!(anchors.check_and_maybe_flag("file-sync", "path", "/other"));
}

#[test]
fn members_do_not_share_state() {
    let dir = tempdir().unwrap();
    let phone = MemberPaths::new(dir.path(), "phone").unwrap();
    let laptop = MemberPaths::new(dir.path(), "laptop").unwrap();

    let mut ledger = phone.open_ledger().unwrap();
    ledger.reset_reports();
    ledger.record_seen("a", "h1").unwrap();

    let other = laptop.open_ledger().unwrap();
    assert!(other.is_empty());
    assert_eq!(other.classify("a", "h1"), ChangeKind::Added);
}

#[test]
fn compaction_preserves_ledger() {
    let dir = tempdir().unwrap();
    let paths = MemberPaths::new(dir.path(), "phone").unwrap();
    let mut ledger = paths.open_ledger().unwrap();
    for round in 0..10 {
        ledger.reset_reports();
        ledger.record_seen("a", &format!("h{round}")).unwrap();
        ledger.record_seen("b", "fixed").unwrap();
    }

    let stats = ledger.log_mut().compact().unwrap();
    assert_eq!(stats.live_keys, 2);
    drop(ledger);

    let ledger = paths.open_ledger().unwrap();
    assert_eq!(ledger.hash_of("a"), Some("h9"));
    assert_eq!(ledger.hash_of("b"), Some("fixed"));
}

fn snapshot() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-e]{1,2}", "h[0-3]", 0..8)
}

proptest! {
    #[test]
    fn rescanning_unchanged_snapshot_reports_nothing(records in snapshot()) {
        let mut ledger = ChangeLedger::in_memory("m");
        scan(&mut ledger, &records);
        let kinds = scan(&mut ledger, &records);
        prop_assert!(kinds.iter().all(|(_, kind)| *kind == ChangeKind::Unmodified));
        prop_assert_eq!(kinds.len(), records.len());
    }

    #[test]
    fn ledger_tracks_latest_snapshot(first in snapshot(), second in snapshot()) {
        let mut ledger = ChangeLedger::in_memory("m");
        scan(&mut ledger, &first);
        let kinds = scan(&mut ledger, &second);

        for (uid, kind) in &kinds {
            let expected = match (first.get(uid), second.get(uid)) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Deleted,
                (Some(a), Some(b)) if a == b => ChangeKind::Unmodified,
                (Some(_), Some(_)) => ChangeKind::Modified,
                (None, None) => unreachable!(),
            };
            prop_assert_eq!(*kind, expected);
        }
        let stored: BTreeMap<String, String> =
            ledger.entries().into_iter().map(|e| (e.uid, e.hash)).collect();
        prop_assert_eq!(stored, second);
    }
}
