//! peersync CLI
//!
//! Maintenance tools for the state peersync keeps per member.
//!
//! # Commands
//!
//! - `dump-hash` - List the change ledger of a member
//! - `dump-anchors` - List the resource identities of a member
//! - `verify` - Replay both logs and report damage
//! - `compact` - Rewrite both logs to live entries only
//! - `reset` - Forget everything, forcing a slow-sync next run

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// peersync member state tools.
#[derive(Parser)]
#[command(name = "peersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// State root holding one directory per member
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every uid and hash in a member's ledger
    DumpHash {
        /// Member id
        member: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List every anchor of a member
    DumpAnchors {
        /// Member id
        member: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Replay a member's logs and report entry counts and damage
    Verify {
        /// Member id
        member: String,
    },

    /// Rewrite a member's logs to their live entries
    Compact {
        /// Member id
        member: String,

        /// Show sizes without rewriting
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Clear a member's ledger and anchors
    Reset {
        /// Member id
        member: String,

        /// Keep the anchors, clearing only the ledger
        #[arg(long)]
        keep_anchors: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::DumpHash { member, format } => {
            let path = cli.path.ok_or("State root required for dump-hash")?;
            commands::dump_hash::run(&path, &member, format)?;
        }
        Commands::DumpAnchors { member, format } => {
            let path = cli.path.ok_or("State root required for dump-anchors")?;
            commands::dump_anchors::run(&path, &member, format)?;
        }
        Commands::Verify { member } => {
            let path = cli.path.ok_or("State root required for verify")?;
            commands::verify::run(&path, &member)?;
        }
        Commands::Compact { member, dry_run } => {
            let path = cli.path.ok_or("State root required for compact")?;
            commands::compact::run(&path, &member, dry_run)?;
        }
        Commands::Reset {
            member,
            keep_anchors,
        } => {
            let path = cli.path.ok_or("State root required for reset")?;
            commands::reset::run(&path, &member, keep_anchors)?;
        }
        Commands::Version => {
            println!("peersync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("log format v{}", peersync_store::LOG_VERSION);
        }
    }

    Ok(())
}
