use crate::error::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Closed set the remote lifecycle fields are normalized into at the fetch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[serde(alias = "open")]
    Active,
    #[serde(alias = "expired", alias = "closed")]
    Retired,
    #[serde(other)]
    Unknown,
}

impl RecordStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub key: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sys_id: Option<String>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_by: Option<String>,
    #[serde(default)]
    pub pickup_tagged: bool,
    #[serde(default)]
    pub url: Option<String>,
}

impl RemoteRecord {
    pub fn new(key: &str, status: RecordStatus) -> Self {
        Self {
            key: normalize_key(key),
            status,
            updated_at: None,
            sys_id: None,
            closed_at: None,
            closed_by: None,
            pickup_tagged: false,
            url: None,
        }
    }
}

pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Source of the remote records a pass matches against.
pub trait RecordFetcher: Send + Sync {
    fn fetch_records(&self) -> Result<Vec<RemoteRecord>, FetchError>;

    /// Short label for reports, e.g. the instance host or file path.
    fn describe(&self) -> String;
}

/// Reads a JSON array of records, as exported by a previous pass or written by hand.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl RecordFetcher for FileFetcher {
    fn fetch_records(&self) -> Result<Vec<RemoteRecord>, FetchError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| FetchError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        })?;
        let mut records: Vec<RemoteRecord> =
            serde_json::from_str(&raw).map_err(|err| FetchError::Decode(err.to_string()))?;
        for record in &mut records {
            record.key = normalize_key(&record.key);
        }
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Stands in when no real fetcher could be built, so the pass still runs
/// and every folder lands in review.
#[derive(Debug, Clone)]
pub struct UnavailableFetcher {
    error: FetchError,
}

impl UnavailableFetcher {
    pub fn new(error: FetchError) -> Self {
        Self { error }
    }
}

impl RecordFetcher for UnavailableFetcher {
    fn fetch_records(&self) -> Result<Vec<RemoteRecord>, FetchError> {
        Err(self.error.clone())
    }

    fn describe(&self) -> String {
        "unavailable".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_fetcher_normalizes_keys_and_statuses() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("records.json");
        fs::write(
            &path,
            r#"[
                {"key": " tkt0000001 ", "status": "retired"},
                {"key": "TKT0000002", "status": "open", "pickup_tagged": true},
                {"key": "TKT0000003", "status": "on_hold"}
            ]"#,
        )
        .expect("write records");

        let records = FileFetcher::new(&path).fetch_records().expect("fetch");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "TKT0000001");
        assert_eq!(records[0].status, RecordStatus::Retired);
        assert_eq!(records[1].status, RecordStatus::Active);
        assert!(records[1].pickup_tagged);
        assert_eq!(records[2].status, RecordStatus::Unknown);
    }

    #[test]
    fn file_fetcher_reports_missing_file() {
        let tmp = tempdir().expect("tempdir");
        let err = FileFetcher::new(&tmp.path().join("absent.json"))
            .fetch_records()
            .expect_err("missing file");
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[test]
    fn unavailable_fetcher_replays_its_error() {
        let fetcher = UnavailableFetcher::new(FetchError::Config("no credentials".into()));
        assert_eq!(
            fetcher.fetch_records().expect_err("unavailable"),
            FetchError::Config("no credentials".into())
        );
    }

    #[test]
    fn file_fetcher_reports_bad_json() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("records.json");
        fs::write(&path, "{not json").expect("write");
        let err = FileFetcher::new(&path).fetch_records().expect_err("bad json");
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
