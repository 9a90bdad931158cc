//! Reset command implementation.

use super::{existing_member, CliError};
use std::path::Path;
use tracing::info;

/// Runs the reset command. With the ledger empty every record is reported
/// as added on the next run.
pub fn run(root: &Path, member: &str, keep_anchors: bool) -> Result<(), CliError> {
    let paths = existing_member(root, member)?;

    let mut ledger = paths.open_ledger()?;
    let dropped = ledger.reset()?;
    ledger.sync()?;
    info!(member = %member, dropped, "reset ledger");
    println!("Dropped {dropped} ledger entries");

    if !keep_anchors {
        let mut anchors = paths.open_anchors()?;
        let cleared = anchors.clear(member)?;
        anchors.sync()?;
        info!(member = %member, cleared, "cleared anchors");
        println!("Cleared {cleared} anchors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_store::MemberPaths;
    use tempfile::TempDir;

    fn seeded(dir: &TempDir) -> MemberPaths {
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        let mut ledger = paths.open_ledger().unwrap();
        ledger.record_seen("a", "h1").unwrap();
        ledger.sync().unwrap();
        let mut anchors = paths.open_anchors().unwrap();
        anchors.update("phone", "path", "/sdcard").unwrap();
        anchors.sync().unwrap();
        paths
    }

    #[test]
    fn clears_ledger_and_anchors() {
        let dir = TempDir::new().unwrap();
        let paths = seeded(&dir);

        run(dir.path(), "phone", false).unwrap();

        assert!(paths.open_ledger().unwrap().is_empty());
        assert_eq!(paths.open_anchors().unwrap().get("phone", "path"), None);
    }

    #[test]
    fn anchors_can_be_kept() {
        let dir = TempDir::new().unwrap();
        let paths = seeded(&dir);

        run(dir.path(), "phone", true).unwrap();

        assert!(paths.open_ledger().unwrap().is_empty());
        assert_eq!(paths.open_anchors().unwrap().get("phone", "path"), Some("/sdcard"));
    }
}
