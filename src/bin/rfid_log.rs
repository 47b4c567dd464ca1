//! rfid_log - inspect and append to the RFID gate audit log
//!
//! The log path and listing limit come from `DepotConfig` (`DEPOT_CONFIG`,
//! `DEPOT_AUDIT_PATH`); `--log` and `--limit` override them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use depot_monitor::{AuditLog, AuditRecord, DepotConfig, TagEvent};

#[derive(Parser, Debug)]
#[command(name = "rfid_log", about = "Inspect or append to the RFID ingress/egress log")]
struct Args {
    /// Audit log CSV file (default: configured audit.path).
    #[arg(long)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recent records, newest first
    List {
        /// Maximum number of records, 0 = all (default: configured audit.display_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Record a manual ingress
    Ingress {
        /// Tag identifier; blank records `manual-tag`
        #[arg(default_value = "")]
        tag: String,
    },

    /// Record a manual egress
    Egress {
        #[arg(default_value = "")]
        tag: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config = DepotConfig::load()?;

    let limit = match &args.command {
        Command::List { limit } => *limit,
        _ => None,
    };
    let settings = config.audit.with_overrides(args.log, limit);
    let log = AuditLog::open(&settings.path)?;

    match args.command {
        Command::List { .. } => {
            let records = log.read_recent(settings.display_limit)?;
            if records.is_empty() {
                println!("(no records in {})", log.path().display());
            }
            for record in records {
                println!(
                    "{}  {:<7}  {:<16}  {}",
                    record.timestamp, record.event, record.tag_id, record.notes
                );
            }
        }
        Command::Ingress { tag } => print_entry(log.record_manual(TagEvent::Ingress, &tag)?),
        Command::Egress { tag } => print_entry(log.record_manual(TagEvent::Egress, &tag)?),
    }
    Ok(())
}

fn print_entry(record: AuditRecord) {
    println!(
        "logged {} {} at {}",
        record.event, record.tag_id, record.timestamp
    );
}
