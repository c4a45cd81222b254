//! Pure folder-to-record matching.
//!
//! Key extraction looks for `prefix` followed by a run of digits anywhere in a
//! folder name. A name whose leading token (up to the first `_`, `-`, space or
//! `.`) is the only key it contains is a clean match; anything else needs a
//! human.

use crate::error::FetchError;
use crate::sweep::config::MatchingConfig;
use crate::sweep::records::{RecordStatus, RemoteRecord};
use crate::sweep::scanner::BackupUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SEPARATORS: [char; 4] = ['_', '-', ' ', '.'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    prefix: String,
    digits: Option<usize>,
}

impl KeyRule {
    pub fn new(prefix: &str, digits: Option<usize>) -> Self {
        Self {
            prefix: prefix.trim().to_ascii_uppercase(),
            digits,
        }
    }

    pub fn from_config(cfg: &MatchingConfig) -> Self {
        let digits = (cfg.key_digits > 0).then_some(cfg.key_digits);
        Self::new(&cfg.key_prefix, digits)
    }

    fn digits_ok(&self, run: usize) -> bool {
        match self.digits {
            Some(n) => run == n,
            None => run > 0,
        }
    }

    /// Every well-formed key in `name`, upper-cased, first occurrence order.
    fn candidates(&self, name: &str) -> Vec<String> {
        let upper = name.to_ascii_uppercase();
        let bytes = upper.as_bytes();
        let prefix = self.prefix.as_bytes();
        let mut found: Vec<String> = Vec::new();
        if prefix.is_empty() {
            return found;
        }
        let mut i = 0;
        while i + prefix.len() <= bytes.len() {
            if &bytes[i..i + prefix.len()] != prefix {
                i += 1;
                continue;
            }
            let digits_start = i + prefix.len();
            let run = bytes[digits_start..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if self.digits_ok(run) {
                let key = upper[i..digits_start + run].to_string();
                if !found.contains(&key) {
                    found.push(key);
                }
                i = digits_start + run;
            } else {
                i += 1;
            }
        }
        found
    }

    pub fn parse(&self, name: &str) -> KeyParse {
        let candidates = self.candidates(name);
        if candidates.is_empty() {
            return KeyParse::Unparsable;
        }
        let leading = name
            .split(|c| SEPARATORS.contains(&c))
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if candidates.len() == 1 && candidates[0] == leading {
            KeyParse::Clean(leading)
        } else {
            KeyParse::Ambiguous(candidates)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParse {
    Clean(String),
    Ambiguous(Vec<String>),
    Unparsable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Fuzzy,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Keep,
    ReviewNeeded,
    DeleteEligible,
    Orphaned,
}

impl Disposition {
    pub const ALL: [Disposition; 4] = [
        Disposition::Keep,
        Disposition::ReviewNeeded,
        Disposition::DeleteEligible,
        Disposition::Orphaned,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::ReviewNeeded => "review_needed",
            Self::DeleteEligible => "delete_eligible",
            Self::Orphaned => "orphaned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub folder: String,
    pub key: Option<String>,
    pub record: Option<RemoteRecord>,
    pub confidence: MatchConfidence,
    pub disposition: Disposition,
    pub reason: String,
}

fn review(folder: &str, key: Option<String>, confidence: MatchConfidence, reason: String) -> MatchResult {
    MatchResult {
        folder: folder.to_string(),
        key,
        record: None,
        confidence,
        disposition: Disposition::ReviewNeeded,
        reason,
    }
}

fn classify_single(folder: &str, key: String, record: &RemoteRecord) -> MatchResult {
    let (disposition, reason) = match record.status {
        RecordStatus::Retired => (Disposition::DeleteEligible, "record retired".to_string()),
        RecordStatus::Active if record.pickup_tagged => (
            Disposition::Keep,
            "record tagged ready for pickup".to_string(),
        ),
        RecordStatus::Active => (Disposition::Keep, "record active".to_string()),
        RecordStatus::Unknown => (
            Disposition::ReviewNeeded,
            "record status unknown".to_string(),
        ),
    };
    MatchResult {
        folder: folder.to_string(),
        key: Some(key),
        record: Some(record.clone()),
        confidence: MatchConfidence::Exact,
        disposition,
        reason,
    }
}

/// Relate each unit to at most one record. A failed fetch sends every unit
/// to review; nothing becomes delete-eligible without a record saying so.
pub fn match_units(
    units: &[BackupUnit],
    records: Result<&[RemoteRecord], &FetchError>,
    rule: &KeyRule,
) -> Vec<MatchResult> {
    let records = match records {
        Ok(records) => records,
        Err(err) => {
            return units
                .iter()
                .map(|unit| {
                    let key = match rule.parse(&unit.name) {
                        KeyParse::Clean(key) => Some(key),
                        _ => None,
                    };
                    review(
                        &unit.name,
                        key,
                        MatchConfidence::None,
                        format!("records unavailable: {err}"),
                    )
                })
                .collect();
        }
    };

    let mut index: HashMap<&str, Vec<&RemoteRecord>> = HashMap::with_capacity(records.len());
    for record in records {
        index.entry(record.key.as_str()).or_default().push(record);
    }

    units
        .iter()
        .map(|unit| match rule.parse(&unit.name) {
            KeyParse::Unparsable => review(
                &unit.name,
                None,
                MatchConfidence::Fuzzy,
                "no record key in folder name".to_string(),
            ),
            KeyParse::Ambiguous(candidates) => review(
                &unit.name,
                None,
                MatchConfidence::Fuzzy,
                format!("ambiguous key in folder name: {}", candidates.join(", ")),
            ),
            KeyParse::Clean(key) => match index.get(key.as_str()).map(Vec::as_slice) {
                None | Some([]) => MatchResult {
                    folder: unit.name.clone(),
                    key: Some(key),
                    record: None,
                    confidence: MatchConfidence::None,
                    disposition: Disposition::Orphaned,
                    reason: "no matching record".to_string(),
                },
                Some([record]) => classify_single(&unit.name, key, record),
                Some(many) => review(
                    &unit.name,
                    Some(key),
                    MatchConfidence::Fuzzy,
                    format!("{} records share this key", many.len()),
                ),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit(name: &str) -> BackupUnit {
        BackupUnit {
            name: name.to_string(),
            path: PathBuf::from("/backups").join(name),
            size_bytes: None,
            modified: None,
        }
    }

    fn tkt() -> KeyRule {
        KeyRule::new("TKT", Some(7))
    }

    #[test]
    fn parse_recognizes_clean_leading_key() {
        assert_eq!(
            tkt().parse("tkt0001234_jdoe laptop"),
            KeyParse::Clean("TKT0001234".to_string())
        );
        assert_eq!(
            tkt().parse("TKT0001234"),
            KeyParse::Clean("TKT0001234".to_string())
        );
    }

    #[test]
    fn parse_flags_embedded_or_repeated_keys() {
        assert_eq!(
            tkt().parse("jdoe_TKT0001234"),
            KeyParse::Ambiguous(vec!["TKT0001234".to_string()])
        );
        assert_eq!(
            tkt().parse("TKT0001234_TKT0005678"),
            KeyParse::Ambiguous(vec!["TKT0001234".to_string(), "TKT0005678".to_string()])
        );
        // The same key twice is still one key.
        assert_eq!(
            tkt().parse("TKT0001234_copy_of_TKT0001234"),
            KeyParse::Clean("TKT0001234".to_string())
        );
    }

    #[test]
    fn parse_rejects_wrong_digit_counts() {
        assert_eq!(tkt().parse("TKT123_laptop"), KeyParse::Unparsable);
        assert_eq!(tkt().parse("TKT00012345_laptop"), KeyParse::Unparsable);
        assert_eq!(tkt().parse("random folder"), KeyParse::Unparsable);
        assert_eq!(
            KeyRule::new("TKT", None).parse("TKT12_laptop"),
            KeyParse::Clean("TKT12".to_string())
        );
    }

    #[test]
    fn ci_example_yields_eligible_and_orphaned() {
        let rule = KeyRule::new("CI", Some(4));
        let units = vec![unit("CI0001_2023"), unit("CI0002_2023")];
        let records = vec![RemoteRecord::new("CI0001", RecordStatus::Retired)];

        let results = match_units(&units, Ok(&records), &rule);
        assert_eq!(results[0].disposition, Disposition::DeleteEligible);
        assert_eq!(results[0].confidence, MatchConfidence::Exact);
        assert_eq!(results[1].disposition, Disposition::Orphaned);
        assert_eq!(results[1].confidence, MatchConfidence::None);
        assert!(results[1].record.is_none());
    }

    #[test]
    fn dispositions_follow_record_status() {
        let units = vec![
            unit("TKT0000001_a"),
            unit("TKT0000002_b"),
            unit("TKT0000003_c"),
            unit("TKT0000004_d"),
            unit("misc"),
        ];
        let mut pickup = RemoteRecord::new("TKT0000004", RecordStatus::Active);
        pickup.pickup_tagged = true;
        let records = vec![
            RemoteRecord::new("TKT0000001", RecordStatus::Retired),
            RemoteRecord::new("TKT0000002", RecordStatus::Active),
            RemoteRecord::new("TKT0000003", RecordStatus::Unknown),
            pickup,
        ];

        let got = match_units(&units, Ok(&records), &tkt())
            .into_iter()
            .map(|r| r.disposition)
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                Disposition::DeleteEligible,
                Disposition::Keep,
                Disposition::ReviewNeeded,
                Disposition::Keep,
                Disposition::ReviewNeeded,
            ]
        );
    }

    #[test]
    fn fuzzy_names_never_become_eligible() {
        let units = vec![unit("old_TKT0000001")];
        let records = vec![RemoteRecord::new("TKT0000001", RecordStatus::Retired)];
        let result = &match_units(&units, Ok(&records), &tkt())[0];
        assert_eq!(result.confidence, MatchConfidence::Fuzzy);
        assert_eq!(result.disposition, Disposition::ReviewNeeded);
    }

    #[test]
    fn duplicate_records_need_review() {
        let units = vec![unit("TKT0000001_a")];
        let records = vec![
            RemoteRecord::new("TKT0000001", RecordStatus::Retired),
            RemoteRecord::new("TKT0000001", RecordStatus::Active),
        ];
        let result = &match_units(&units, Ok(&records), &tkt())[0];
        assert_eq!(result.disposition, Disposition::ReviewNeeded);
        assert!(result.reason.contains("2 records"));
    }

    #[test]
    fn fetch_failure_sends_everything_to_review() {
        let units = (0..50)
            .map(|i| unit(&format!("TKT{i:07}_x")))
            .collect::<Vec<_>>();
        let err = FetchError::TimedOut(5);
        let results = match_units(&units, Err(&err), &tkt());
        assert_eq!(results.len(), 50);
        assert!(
            results
                .iter()
                .all(|r| r.disposition == Disposition::ReviewNeeded)
        );
    }

    #[test]
    fn large_record_sets_match_by_key() {
        let records = (0..10_000)
            .map(|i| RemoteRecord::new(&format!("TKT{i:07}"), RecordStatus::Active))
            .chain(std::iter::once(RemoteRecord::new(
                "TKT0099999",
                RecordStatus::Retired,
            )))
            .collect::<Vec<_>>();
        let units = vec![unit("TKT0099999_last"), unit("TKT0000042_mid")];
        let results = match_units(&units, Ok(&records), &tkt());
        assert_eq!(results[0].disposition, Disposition::DeleteEligible);
        assert_eq!(results[1].disposition, Disposition::Keep);
    }

    #[test]
    fn rule_from_config_treats_zero_digits_as_any() {
        let cfg = MatchingConfig {
            key_prefix: "ci".to_string(),
            key_digits: 0,
        };
        let rule = KeyRule::from_config(&cfg);
        assert_eq!(rule, KeyRule::new("CI", None));
    }
}
