//! Dump-anchors command implementation.

use super::{existing_member, CliError, OutputFormat};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct AnchorRow {
    field: String,
    value: String,
}

/// Runs the dump-anchors command.
pub fn run(root: &Path, member: &str, format: OutputFormat) -> Result<(), CliError> {
    let rows = load(root, member)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No anchors for {member}");
            }
            for row in &rows {
                println!("{} = {}", row.field, row.value);
            }
        }
    }
    Ok(())
}

fn load(root: &Path, member: &str) -> Result<Vec<AnchorRow>, CliError> {
    let anchors = existing_member(root, member)?.open_anchors()?;
    Ok(anchors
        .entries(member)
        .into_iter()
        .map(|anchor| AnchorRow {
            field: anchor.field_name,
            value: anchor.value,
        })
        .collect())
}
