//! Dump-hash command implementation.

use super::{existing_member, CliError, OutputFormat};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Serialize)]
struct HashRow {
    uid: String,
    hash: String,
}

/// Runs the dump-hash command.
pub fn run(root: &Path, member: &str, format: OutputFormat) -> Result<(), CliError> {
    let rows = load(root, member)?;
    debug!(member = %member, entries = rows.len(), "loaded ledger");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            for row in &rows {
                println!("{}\t{}", row.uid, row.hash);
            }
            println!("{} entries", rows.len());
        }
    }
    Ok(())
}

fn load(root: &Path, member: &str) -> Result<Vec<HashRow>, CliError> {
    let ledger = existing_member(root, member)?.open_ledger()?;
    Ok(ledger
        .entries()
        .into_iter()
        .map(|entry| HashRow {
            uid: entry.uid,
            hash: entry.hash,
        })
        .collect())
}
