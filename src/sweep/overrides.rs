use crate::sweep::ledger::{Ledger, Override};
use crate::sweep::matcher::Disposition;
use crate::sweep::paths::HdcsPaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOverride {
    pub decision: Override,
    /// Computed disposition at the time the decision was made.
    pub disposition: Disposition,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideStore {
    pub schema_version: u32,
    pub entries: BTreeMap<String, StoredOverride>,
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self {
            schema_version: 1,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CarryReport {
    pub applied: Vec<String>,
    pub dropped: Vec<DroppedOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedOverride {
    pub folder: String,
    pub reason: String,
}

pub fn store_file_path(paths: &HdcsPaths) -> PathBuf {
    paths.state_dir.join("overrides.json")
}

pub fn load(paths: &HdcsPaths) -> Result<OverrideStore> {
    let file = store_file_path(paths);
    if !file.exists() {
        return Ok(OverrideStore::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: OverrideStore = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &HdcsPaths, store: &OverrideStore) -> Result<PathBuf> {
    let file = store_file_path(paths);
    let parent = file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.state_dir.clone());
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let data = serde_json::to_string_pretty(store)?;
    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(format!("{data}\n").as_bytes())
        .with_context(|| format!("failed to write temp file for {}", file.display()))?;
    tmp.persist(&file)
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

impl OverrideStore {
    pub fn record(&mut self, folder: &str, decision: Override, disposition: Disposition) {
        self.entries.insert(
            folder.to_string(),
            StoredOverride {
                decision,
                disposition,
                recorded_at: Utc::now(),
            },
        );
    }

    pub fn clear(&mut self, folder: &str) -> bool {
        self.entries.remove(folder).is_some()
    }

    /// Reapply stored decisions to a fresh ledger. A decision only carries
    /// while the folder's computed disposition is unchanged; stale ones are
    /// removed from the store and reported.
    pub fn carry_into(&mut self, ledger: &mut Ledger) -> CarryReport {
        let mut report = CarryReport::default();
        let mut stale = Vec::new();
        for (folder, stored) in &self.entries {
            let current = ledger.get(folder).map(|entry| entry.disposition());
            match current {
                Some(disposition) if disposition == stored.disposition => {
                    if ledger.apply_override(folder, stored.decision).is_ok() {
                        report.applied.push(folder.clone());
                    }
                }
                Some(disposition) => {
                    stale.push(folder.clone());
                    report.dropped.push(DroppedOverride {
                        folder: folder.clone(),
                        reason: format!(
                            "disposition changed from {} to {}",
                            stored.disposition.label(),
                            disposition.label()
                        ),
                    });
                }
                None => {
                    stale.push(folder.clone());
                    report.dropped.push(DroppedOverride {
                        folder: folder.clone(),
                        reason: "folder not in this pass".to_string(),
                    });
                }
            }
        }
        for folder in stale {
            self.entries.remove(&folder);
        }
        if !report.applied.is_empty() || !report.dropped.is_empty() {
            info!(
                applied = report.applied.len(),
                dropped = report.dropped.len(),
                "carried stored overrides"
            );
        }
        report
    }
}
