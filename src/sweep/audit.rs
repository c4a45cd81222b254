use crate::error::AuditError;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Staged,
    Deleted,
    Restored,
}

impl AuditAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub folder: String,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub source: Option<String>,
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AuditRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}

/// Durable destination for audit records. Appends only.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Timestamp for the next record; never earlier than the previous one.
    fn stamp(&self) -> DateTime<Utc>;
}

/// One JSONL file per local calendar day under the audit directory.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    tz: Tz,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLog {
    pub fn new(dir: &Path, tz: Tz) -> Self {
        Self {
            dir: dir.to_path_buf(),
            tz,
            last: Mutex::new(None),
        }
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<AuditRecord>> {
        let path = self.day_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut out = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(trimmed)
                .with_context(|| format!("failed to parse audit line in {}", path.display()))?;
            out.push(record);
        }
        Ok(out)
    }
}

impl AuditSink for AuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        fs::create_dir_all(&self.dir)?;
        let line = format!("{}\n", serde_json::to_string(record)?);
        let path = self.day_path(self.local_date(record.timestamp));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        // Other processes appending to the same day file must not interleave.
        file.lock_exclusive()?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.sync_data());
        FileExt::unlock(&file)?;
        written?;
        Ok(())
    }

    fn stamp(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Utc::now();
        let next = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(next);
        next
    }
}
