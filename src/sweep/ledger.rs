use crate::error::LedgerError;
use crate::sweep::matcher::{Disposition, MatchResult};
use crate::sweep::scanner::{BackupUnit, ScanInventory, ScanSkip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operator decision layered over a computed disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    ConfirmComputed,
    ForceKeep,
    ForceDelete,
}

impl Override {
    pub fn label(self) -> &'static str {
        match self {
            Self::ConfirmComputed => "confirm",
            Self::ForceKeep => "keep",
            Self::ForceDelete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveAction {
    Leave,
    Stage,
}

impl EffectiveAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Stage => "stage",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub unit: BackupUnit,
    pub result: MatchResult,
    #[serde(rename = "override")]
    pub override_: Option<Override>,
    pub last_error: Option<String>,
}

impl LedgerEntry {
    pub fn name(&self) -> &str {
        &self.unit.name
    }

    pub fn disposition(&self) -> Disposition {
        self.result.disposition
    }

    /// Dispositions are advisory; only an operator override ever stages.
    pub fn effective_action(&self) -> EffectiveAction {
        match self.override_ {
            Some(Override::ForceDelete) => EffectiveAction::Stage,
            Some(Override::ConfirmComputed)
                if self.result.disposition == Disposition::DeleteEligible =>
            {
                EffectiveAction::Stage
            }
            Some(_) | None => EffectiveAction::Leave,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub keep: usize,
    pub review_needed: usize,
    pub delete_eligible: usize,
    pub orphaned: usize,
    pub skipped: usize,
    pub to_stage: usize,
}

impl LedgerSummary {
    pub fn count(&self, disposition: Disposition) -> usize {
        match disposition {
            Disposition::Keep => self.keep,
            Disposition::ReviewNeeded => self.review_needed,
            Disposition::DeleteEligible => self.delete_eligible,
            Disposition::Orphaned => self.orphaned,
        }
    }
}

/// One pass worth of entries, keyed by folder name. Rebuilt every pass.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
    skipped: Vec<ScanSkip>,
}

impl Ledger {
    pub fn build(inventory: ScanInventory, results: Vec<MatchResult>) -> Self {
        let mut by_folder = results
            .into_iter()
            .map(|result| (result.folder.clone(), result))
            .collect::<BTreeMap<_, _>>();
        let mut entries = BTreeMap::new();
        for unit in inventory.units {
            let Some(result) = by_folder.remove(&unit.name) else {
                continue;
            };
            entries.insert(
                unit.name.clone(),
                LedgerEntry {
                    unit,
                    result,
                    override_: None,
                    last_error: None,
                },
            );
        }
        Self {
            entries,
            skipped: inventory.skipped,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    pub fn skipped(&self) -> &[ScanSkip] {
        &self.skipped
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            total: self.entries.len(),
            skipped: self.skipped.len(),
            ..LedgerSummary::default()
        };
        for entry in self.entries.values() {
            match entry.disposition() {
                Disposition::Keep => summary.keep += 1,
                Disposition::ReviewNeeded => summary.review_needed += 1,
                Disposition::DeleteEligible => summary.delete_eligible += 1,
                Disposition::Orphaned => summary.orphaned += 1,
            }
            if entry.effective_action() == EffectiveAction::Stage {
                summary.to_stage += 1;
            }
        }
        summary
    }

    pub fn to_stage(&self) -> Vec<&LedgerEntry> {
        self.entries
            .values()
            .filter(|entry| entry.effective_action() == EffectiveAction::Stage)
            .collect()
    }

    /// Record an operator decision. The computed match result is never touched.
    pub fn apply_override(&mut self, name: &str, decision: Override) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LedgerError::UnknownFolder(name.to_string()))?;
        entry.override_ = Some(decision);
        Ok(())
    }

    /// Bulk confirmation: every DeleteEligible entry without a decision gets
    /// ConfirmComputed. Returns how many entries were confirmed.
    pub fn confirm_eligible(&mut self) -> usize {
        let mut confirmed = 0;
        for entry in self.entries.values_mut() {
            if entry.override_.is_none() && entry.disposition() == Disposition::DeleteEligible {
                entry.override_ = Some(Override::ConfirmComputed);
                confirmed += 1;
            }
        }
        confirmed
    }

    pub fn record_failure(&mut self, name: &str, reason: &str) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LedgerError::UnknownFolder(name.to_string()))?;
        entry.last_error = Some(reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::matcher::{KeyRule, match_units};
    use crate::sweep::records::{RecordStatus, RemoteRecord};
    use std::path::PathBuf;

    fn ledger() -> Ledger {
        let units = ["TKT0000001_a", "TKT0000002_b", "TKT0000003_c", "loose"]
            .iter()
            .map(|name| BackupUnit {
                name: name.to_string(),
                path: PathBuf::from("/backups").join(name),
                size_bytes: None,
                modified: None,
            })
            .collect::<Vec<_>>();
        let records = vec![
            RemoteRecord::new("TKT0000001", RecordStatus::Retired),
            RemoteRecord::new("TKT0000002", RecordStatus::Active),
        ];
        let results = match_units(&units, Ok(&records), &KeyRule::new("TKT", Some(7)));
        let inventory = ScanInventory {
            root: PathBuf::from("/backups"),
            units,
            skipped: vec![ScanSkip {
                name: "locked".to_string(),
                path: PathBuf::from("/backups/locked"),
                reason: "permission denied".to_string(),
            }],
            size_truncated: false,
        };
        Ledger::build(inventory, results)
    }

    #[test]
    fn build_keeps_one_entry_per_unit_and_the_skips() {
        let ledger = ledger();
        assert_eq!(ledger.entries().count(), 4);
        assert_eq!(ledger.skipped().len(), 1);
        let summary = ledger.summary();
        assert_eq!(summary.delete_eligible, 1);
        assert_eq!(summary.keep, 1);
        assert_eq!(summary.orphaned, 1);
        assert_eq!(summary.review_needed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.to_stage, 0);
    }

    #[test]
    fn dispositions_alone_never_stage() {
        let ledger = ledger();
        assert!(ledger.to_stage().is_empty());
    }

    #[test]
    fn confirm_only_stages_eligible_entries() {
        let mut ledger = ledger();
        ledger
            .apply_override("TKT0000001_a", Override::ConfirmComputed)
            .expect("override");
        ledger
            .apply_override("TKT0000002_b", Override::ConfirmComputed)
            .expect("override");
        let staged = ledger
            .to_stage()
            .iter()
            .map(|e| e.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(staged, vec!["TKT0000001_a"]);
    }

    #[test]
    fn force_overrides_win_without_touching_the_result() {
        let mut ledger = ledger();
        ledger
            .apply_override("TKT0000001_a", Override::ForceKeep)
            .expect("override");
        ledger
            .apply_override("loose", Override::ForceDelete)
            .expect("override");

        let kept = ledger.get("TKT0000001_a").expect("entry");
        assert_eq!(kept.effective_action(), EffectiveAction::Leave);
        assert_eq!(kept.disposition(), Disposition::DeleteEligible);
        let forced = ledger.get("loose").expect("entry");
        assert_eq!(forced.effective_action(), EffectiveAction::Stage);
        assert_eq!(forced.disposition(), Disposition::ReviewNeeded);
    }

    #[test]
    fn unknown_folder_is_rejected() {
        let mut ledger = ledger();
        let err = ledger
            .apply_override("nope", Override::ForceDelete)
            .expect_err("unknown");
        assert_eq!(err, LedgerError::UnknownFolder("nope".to_string()));
    }

    #[test]
    fn confirm_eligible_respects_existing_decisions() {
        let mut ledger = ledger();
        ledger
            .apply_override("TKT0000001_a", Override::ForceKeep)
            .expect("override");
        assert_eq!(ledger.confirm_eligible(), 0);
        assert!(ledger.to_stage().is_empty());

        let mut fresh = self::ledger();
        assert_eq!(fresh.confirm_eligible(), 1);
        assert_eq!(fresh.confirm_eligible(), 0);
        assert_eq!(fresh.to_stage().len(), 1);
    }

    #[test]
    fn record_failure_is_visible_on_the_entry() {
        let mut ledger = ledger();
        ledger
            .record_failure("TKT0000001_a", "E106_FILESYSTEM rename failed")
            .expect("record");
        let entry = ledger.get("TKT0000001_a").expect("entry");
        assert_eq!(entry.last_error.as_deref(), Some("E106_FILESYSTEM rename failed"));
        assert_eq!(entry.disposition(), Disposition::DeleteEligible);
    }
}
