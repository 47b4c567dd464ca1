//! Append-only RFID ingress/egress audit log (CSV).
//!
//! Records are never rewritten or deleted. Appends come from two independent
//! origins, operator entries and the serial bridge worker, so every record is
//! encoded in memory first and written with a single `write_all` on an
//! append-mode handle. Concurrent appenders never interleave partial rows.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CSV_HEADERS: [&str; 4] = ["timestamp", "event", "tag_id", "notes"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MANUAL_TAG: &str = "manual-tag";
const MANUAL_NOTE: &str = "manual entry";

/// Direction of a tag read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagEvent {
    Ingress,
    Egress,
}

impl TagEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagEvent::Ingress => "ingress",
            TagEvent::Egress => "egress",
        }
    }
}

impl fmt::Display for TagEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagEvent {
    type Err = anyhow::Error;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INGRESS" => Ok(TagEvent::Ingress),
            "EGRESS" => Ok(TagEvent::Egress),
            other => Err(anyhow!("unknown tag event '{}'", other)),
        }
    }
}

/// One immutable log row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Local time, ISO-8601, second precision.
    pub timestamp: String,
    pub event: TagEvent,
    pub tag_id: String,
    pub notes: String,
}

impl AuditRecord {
    pub fn now(event: TagEvent, tag_id: &str, notes: &str) -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            event,
            tag_id: tag_id.to_string(),
            notes: notes.to_string(),
        }
    }
}

/// Handle to the audit file. Cheap to clone; holds no open descriptor.
#[derive(Clone, Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Opens the log, creating the file with a header row if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let log = Self { path: path.into() };
        log.ensure()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure(&self) -> Result<()> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create audit log {}", self.path.display()))
            }
        };
        let header = format!("{}\n", CSV_HEADERS.join(","));
        file.write_all(header.as_bytes())
            .with_context(|| format!("failed to write audit header {}", self.path.display()))?;
        log::info!("created audit log {}", self.path.display());
        Ok(())
    }

    /// Appends one record stamped with the current local time.
    pub fn append(&self, event: TagEvent, tag_id: &str, notes: &str) -> Result<AuditRecord> {
        let record = AuditRecord::now(event, tag_id, notes);
        self.append_record(&record)?;
        Ok(record)
    }

    pub fn append_record(&self, record: &AuditRecord) -> Result<()> {
        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        encoder.serialize(record)?;
        let row = encoder
            .into_inner()
            .map_err(|e| anyhow!("failed to encode audit record: {}", e.error()))?;

        self.ensure()?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit log {}", self.path.display()))?;
        file.write_all(&row)
            .with_context(|| format!("failed to append to audit log {}", self.path.display()))?;
        Ok(())
    }

    /// Operator entry. A blank tag is logged as `manual-tag`.
    pub fn record_manual(&self, event: TagEvent, tag_id: &str) -> Result<AuditRecord> {
        let tag = tag_id.trim();
        let tag = if tag.is_empty() { MANUAL_TAG } else { tag };
        self.append(event, tag, MANUAL_NOTE)
    }

    /// Most recent `limit` records, newest first. `limit == 0` returns all.
    /// Rows that fail to decode are skipped.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.ensure()?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("failed to read audit log {}", self.path.display()))?;

        let mut rows = Vec::new();
        for (idx, row) in reader.deserialize::<AuditRecord>().enumerate() {
            match row {
                Ok(record) => rows.push(record),
                Err(err) => log::warn!("audit log row {} skipped: {}", idx + 1, err),
            }
        }
        if limit > 0 && rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        rows.reverse();
        Ok(rows)
    }
}
