//! Verify command implementation.

use super::{existing_member, CliError};
use peersync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use peersync_store::{KvLog, ReplayReport, StoreError};
use std::path::Path;

/// What checking one log file found.
#[derive(Debug)]
pub enum LogCheck {
    /// The file does not exist yet.
    Missing,
    /// The log replays; a torn tail may have to be cut off on next open.
    Replayed(ReplayReport),
    /// An entry before the tail is damaged.
    Corrupted(StoreError),
}

impl LogCheck {
    fn is_ok(&self) -> bool {
        !matches!(self, Self::Corrupted(_))
    }
}

/// Runs the verify command.
pub fn run(root: &Path, member: &str) -> Result<(), CliError> {
    let paths = existing_member(root, member)?;
    println!("Verifying state of {member} at {:?}", paths.dir());
    println!();

    let ledger = check(&paths.ledger_path())?;
    print_check("Ledger", &ledger);
    let anchors = check(&paths.anchor_path())?;
    print_check("Anchors", &anchors);

    println!();
    if ledger.is_ok() && anchors.is_ok() {
        println!("✓ Member state verification passed");
        Ok(())
    } else {
        println!("✗ Member state verification failed");
        Err(CliError::VerifyFailed)
    }
}

/// Replays a copy of the log at `path`, leaving the file untouched.
pub fn check(path: &Path) -> Result<LogCheck, CliError> {
    if !path.exists() {
        return Ok(LogCheck::Missing);
    }
    let data = FileBackend::open(path)?.read_all()?;
    match KvLog::open(Box::new(InMemoryBackend::with_data(data))) {
        Ok(log) => Ok(LogCheck::Replayed(log.replay_report().clone())),
        Err(err @ StoreError::Corrupted { .. }) => Ok(LogCheck::Corrupted(err)),
        Err(err) => Err(err.into()),
    }
}

fn print_check(name: &str, check: &LogCheck) {
    match check {
        LogCheck::Missing => println!("{name}: not created yet"),
        LogCheck::Replayed(report) => {
            println!("{name}:");
            println!("  Entries:         {}", report.entries);
            println!("  Valid bytes:     {}", report.valid_bytes);
            if report.truncated_bytes > 0 {
                println!("  Torn tail:       {} bytes", report.truncated_bytes);
            }
        }
        LogCheck::Corrupted(err) => println!("{name}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_store::MemberPaths;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn torn_tail_is_reported_not_cut() {
        let dir = TempDir::new().unwrap();
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        let mut ledger = paths.open_ledger().unwrap();
        ledger.record_seen("a", "h1").unwrap();
        ledger.sync().unwrap();
        drop(ledger);

        let mut file = OpenOptions::new().append(true).open(paths.ledger_path()).unwrap();
        file.write_all(b"PSKV\x01").unwrap();
        drop(file);
        let size = std::fs::metadata(paths.ledger_path()).unwrap().len();

        match check(&paths.ledger_path()).unwrap() {
            LogCheck::Replayed(report) => {
                assert_eq!(report.entries, 1);
                assert_eq!(report.truncated_bytes, 5);
            }
            other => panic!("unexpected check result: {other:?}"),
        }
        assert_eq!(std::fs::metadata(paths.ledger_path()).unwrap().len(), size);
    }

    #[test]
    fn damaged_entry_fails_verification() {
        let dir = TempDir::new().unwrap();
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        let mut ledger = paths.open_ledger().unwrap();
        ledger.record_seen("a", "h1").unwrap();
        ledger.record_seen("b", "h2").unwrap();
        ledger.sync().unwrap();
        drop(ledger);

        let mut bytes = std::fs::read(paths.ledger_path()).unwrap();
        // inside the first entry's payload
        bytes[12] ^= 0xFF;
        std::fs::write(paths.ledger_path(), bytes).unwrap();

        assert!(matches!(check(&paths.ledger_path()).unwrap(), LogCheck::Corrupted(_)));
        assert!(matches!(run(dir.path(), "phone"), Err(CliError::VerifyFailed)));
    }

    #[test]
    fn missing_anchor_log_is_fine() {
        let dir = TempDir::new().unwrap();
        let paths = MemberPaths::new(dir.path(), "phone").unwrap();
        drop(paths.open_ledger().unwrap());
        run(dir.path(), "phone").unwrap();
    }
}
