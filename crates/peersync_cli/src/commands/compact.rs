//! Compact command implementation.

use super::{existing_member, CliError};
use peersync_store::{CompactionStats, KvLog};
use std::path::Path;
use tracing::info;

/// Runs the compact command.
pub fn run(root: &Path, member: &str, dry_run: bool) -> Result<(), CliError> {
    let paths = existing_member(root, member)?;
    let mut ledger = paths.open_ledger()?;
    let mut anchors = paths.open_anchors()?;

    if dry_run {
        println!("Ledger:  {} bytes, {} records", ledger.log().size()?, ledger.len());
        println!("Anchors: {} bytes", anchors.log().size()?);
        println!("Dry run - no changes made");
        return Ok(());
    }

    let ledger_stats = compact_log(ledger.log_mut())?;
    print_stats("Ledger", &ledger_stats);
    let anchor_stats = compact_log(anchors.log_mut())?;
    print_stats("Anchors", &anchor_stats);
    Ok(())
}

fn compact_log(log: &mut KvLog) -> Result<CompactionStats, CliError> {
    let stats = log.compact()?;
    log.sync()?;
    info!(
        before = stats.bytes_before,
        after = stats.bytes_after,
        live_keys = stats.live_keys,
        "compacted log"
    );
    Ok(stats)
}

fn print_stats(name: &str, stats: &CompactionStats) {
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!(
        "{name}: {} -> {} bytes ({saved} reclaimed, {} live keys)",
        stats.bytes_before, stats.bytes_after, stats.live_keys
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_store::MemberPaths;
    use tempfile::TempDir;

    #[test]
    fn compaction_keeps_live_entries() {
        let dir = TempDir::new().unwrap();
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        let mut ledger = paths.open_ledger().unwrap();
        for n in 0..5 {
            ledger.record_seen("a", &format!("h{n}")).unwrap();
        }
        ledger.record_seen("b", "h1").unwrap();
        ledger.sync().unwrap();
        let before = ledger.log().size().unwrap();
        drop(ledger);

        run(dir.path(), "phone", false).unwrap();

        let ledger = paths.open_ledger().unwrap();
        assert!(ledger.log().size().unwrap() < before);
        assert_eq!(ledger.hash_of("a"), Some("h4"));
        assert_eq!(ledger.hash_of("b"), Some("h1"));
    }

    #[test]
    fn dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        let mut ledger = paths.open_ledger().unwrap();
        ledger.record_seen("a", "h1").unwrap();
        ledger.record_seen("a", "h2").unwrap();
        ledger.sync().unwrap();
        drop(ledger);
        let size = std::fs::metadata(paths.ledger_path()).unwrap().len();

        run(dir.path(), "phone", true).unwrap();
        assert_eq!(std::fs::metadata(paths.ledger_path()).unwrap().len(), size);
    }
}
