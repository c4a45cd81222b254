use crate::error::ScanError;
use crate::sweep::util::CancelFlag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How often the recursive size walk re-checks its deadline and cancel flag.
const SIZE_CHECK_EVERY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupUnit {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSkip {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub compute_size: bool,
    /// Wall-clock allowance for all recursive size walks of one scan.
    pub size_budget: Option<Duration>,
    pub cancel: CancelFlag,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanInventory {
    pub root: PathBuf,
    pub units: Vec<BackupUnit>,
    pub skipped: Vec<ScanSkip>,
    /// Set when sizing stopped early; the remaining units carry no size.
    pub size_truncated: bool,
}

fn is_excluded(path: &Path, exclude: Option<&Path>, exclude_canon: Option<&PathBuf>) -> bool {
    let Some(exclude) = exclude else {
        return false;
    };
    if path == exclude {
        return true;
    }
    match (exclude_canon, fs::canonicalize(path)) {
        (Some(canon), Ok(candidate)) => &candidate == canon,
        _ => false,
    }
}

fn modified_utc(meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Recursive byte count of regular files under `path`, not following symlinks.
/// `None` when the deadline passed or the scan was cancelled mid-walk.
pub fn folder_size(path: &Path, deadline: Option<Instant>, cancel: &CancelFlag) -> Option<u64> {
    let mut total = 0u64;
    for (seen, entry) in WalkDir::new(path).follow_links(false).into_iter().enumerate() {
        if seen % SIZE_CHECK_EVERY == 0
            && (cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d))
        {
            return None;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "size walk skipped an entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => total = total.saturating_add(meta.len()),
            Err(err) => {
                debug!(file = %entry.path().display(), error = %err, "size walk could not stat file");
            }
        }
    }
    Some(total)
}

fn fill_sizes(units: &mut [BackupUnit], opts: &ScanOptions) -> bool {
    let deadline = opts.size_budget.map(|budget| Instant::now() + budget);
    for unit in units.iter_mut() {
        if opts.cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        match folder_size(&unit.path, deadline, &opts.cancel) {
            Some(bytes) => unit.size_bytes = Some(bytes),
            None => return true,
        }
    }
    false
}

/// Inventory the immediate subdirectories of `root`, one unit per folder,
/// ordered by name. `exclude` (the staging root) is never reported as a unit.
pub fn scan(
    root: &Path,
    exclude: Option<&Path>,
    opts: &ScanOptions,
) -> Result<ScanInventory, ScanError> {
    let root_meta = fs::metadata(root).map_err(|source| ScanError::RootUnreadable {
        root: root.to_path_buf(),
        source,
    })?;
    if !root_meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let entries = fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        root: root.to_path_buf(),
        source,
    })?;

    let exclude_canon = exclude.and_then(|p| fs::canonicalize(p).ok());
    let mut inventory = ScanInventory {
        root: root.to_path_buf(),
        ..ScanInventory::default()
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                inventory.skipped.push(ScanSkip {
                    name: "<unreadable entry>".to_string(),
                    path: root.to_path_buf(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        if is_excluded(&path, exclude, exclude_canon.as_ref()) {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            inventory.skipped.push(ScanSkip {
                name: entry.file_name().to_string_lossy().to_string(),
                path,
                reason: "folder name is not valid UTF-8".to_string(),
            });
            continue;
        };

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                inventory.skipped.push(ScanSkip {
                    name,
                    path,
                    reason: format!("metadata unreadable: {err}"),
                });
                continue;
            }
        };
        if let Err(err) = fs::read_dir(&path) {
            inventory.skipped.push(ScanSkip {
                name,
                path,
                reason: format!("folder unreadable: {err}"),
            });
            continue;
        }

        inventory.units.push(BackupUnit {
            name,
            modified: modified_utc(&meta),
            path,
            size_bytes: None,
        });
    }

    inventory.units.sort_by(|a, b| a.name.cmp(&b.name));
    inventory.skipped.sort_by(|a, b| a.name.cmp(&b.name));
    for skip in &inventory.skipped {
        warn!(folder = %skip.name, reason = %skip.reason, "scan skipped folder");
    }

    if opts.compute_size {
        inventory.size_truncated = fill_sizes(&mut inventory.units, opts);
        if inventory.size_truncated {
            warn!(root = %root.display(), "size computation stopped early; remaining sizes omitted");
        }
    }

    Ok(inventory)
}
