use crate::error::ActionError;
use crate::sweep::audit::{AuditAction, AuditOutcome, AuditRecord, AuditSink};
use crate::sweep::config::staging_contains;
use crate::sweep::ledger::{EffectiveAction, LedgerEntry};
use crate::sweep::warn::{self, WarnEvent};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub folder: String,
    pub action: AuditAction,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    /// Name used in the staging root when the original name was taken.
    pub renamed_to: Option<String>,
    /// Set when the action happened but its audit record could not be written.
    pub audit_error: Option<String>,
    /// Set when a verified copy landed but the source could not be removed.
    pub leftover_error: Option<String>,
}

/// Performs Stage / Delete / Restore one at a time. Shareable across threads.
pub struct ActionExecutor {
    backups_root: PathBuf,
    staging_root: PathBuf,
    audit: Arc<dyn AuditSink>,
    gate: Mutex<()>,
}

fn validate_name(folder: &str) -> Result<(), ActionError> {
    let invalid = |reason| ActionError::InvalidName {
        folder: folder.to_string(),
        reason,
    };
    if folder.trim().is_empty() {
        return Err(invalid("empty name"));
    }
    if folder.contains(['/', '\\', '\0']) {
        return Err(invalid("name contains a path separator"));
    }
    let mut components = Path::new(folder).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("name is not a plain folder name")),
    }
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir())
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// First of `name`, `name_1`, `name_2`, ... not present in `dir`.
fn free_destination(dir: &Path, name: &str) -> (PathBuf, Option<String>) {
    let plain = dir.join(name);
    if !exists_no_follow(&plain) {
        return (plain, None);
    }
    let mut n = 1u64;
    loop {
        let candidate = format!("{name}_{n}");
        let path = dir.join(&candidate);
        if !exists_no_follow(&path) {
            return (path, Some(candidate));
        }
        n += 1;
    }
}

fn hash_file(path: &Path, hasher: &mut Sha256) -> io::Result<()> {
    let mut file = fs::File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            return Ok(());
        }
        hasher.update(&buf[..read]);
    }
}

/// SHA-256 over relative paths, entry kinds and file bytes, in name order.
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .replace('\\', "/");
        hasher.update(rel.as_bytes());
        let kind = entry.file_type();
        if kind.is_dir() {
            hasher.update(b"\0d\0");
        } else if kind.is_symlink() {
            hasher.update(b"\0l\0");
            let target = fs::read_link(entry.path())?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            hasher.update(b"\0f\0");
            hash_file(entry.path(), &mut hasher)?;
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        format!("cannot copy symlink {}", from.display()),
    ))
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(rel);
        let kind = entry.file_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy `from` to `to`, check the copy byte for byte, then drop the source.
/// On a failed or mismatched copy the partial copy is removed and the source
/// is left alone. Once the copy is verified it is kept even if removing the
/// source fails; that error comes back as `Ok(Some(_))`.
fn copy_verified(from: &Path, to: &Path) -> io::Result<Option<io::Error>> {
    copy_verified_with(from, to, |path| fs::remove_dir_all(path))
}

fn copy_verified_with(
    from: &Path,
    to: &Path,
    remove_source: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<Option<io::Error>> {
    let attempt = copy_tree(from, to).and_then(|_| {
        let expected = tree_digest(from)?;
        let actual = tree_digest(to)?;
        if expected == actual {
            Ok(())
        } else {
            Err(io::Error::new(
                ErrorKind::InvalidData,
                "copied tree does not match the source digest",
            ))
        }
    });
    if let Err(err) = attempt {
        if exists_no_follow(to) {
            let _ = fs::remove_dir_all(to);
        }
        return Err(err);
    }
    Ok(remove_source(from).err())
}

/// Rename, or copy across devices. `Ok(Some(_))` means the data moved but
/// some of the source is still in place.
fn move_dir(from: &Path, to: &Path) -> io::Result<Option<io::Error>> {
    match fs::rename(from, to) {
        Ok(()) => Ok(None),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            info!(from = %from.display(), to = %to.display(), "rename crosses devices; copying");
            copy_verified(from, to)
        }
        Err(err) => Err(err),
    }
}

impl ActionExecutor {
    pub fn new(backups_root: &Path, staging_root: &Path, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            backups_root: backups_root.to_path_buf(),
            staging_root: staging_root.to_path_buf(),
            audit,
            gate: Mutex::new(()),
        }
    }

    fn write_audit(&self, record: AuditRecord) -> Option<String> {
        match self.audit.append(&record) {
            Ok(()) => None,
            Err(err) => {
                let rendered = err.to_string();
                warn::emit(WarnEvent {
                    code: "AUDIT_APPEND_FAILED",
                    stage: "executor",
                    action: record.action.label(),
                    folder: &record.folder,
                    reason: "audit-write-failed",
                    err: &rendered,
                });
                Some(rendered)
            }
        }
    }

    fn fail(
        &self,
        folder: &str,
        action: AuditAction,
        source: Option<&Path>,
        err: ActionError,
    ) -> ActionError {
        warn!(folder, action = action.label(), code = err.code().as_str(), error = %err, "action failed");
        self.write_audit(AuditRecord {
            timestamp: self.audit.stamp(),
            folder: folder.to_string(),
            action,
            outcome: AuditOutcome::Failure {
                reason: format!("{}: {err}", err.code().as_str()),
            },
            source: source.map(|p| p.display().to_string()),
            destination: None,
            renamed_to: None,
            note: None,
        });
        err
    }

    fn succeed(
        &self,
        folder: &str,
        action: AuditAction,
        source: PathBuf,
        destination: Option<PathBuf>,
        renamed_to: Option<String>,
        leftover: Option<io::Error>,
    ) -> ActionOutcome {
        info!(folder, action = action.label(), "action completed");
        let leftover_error = leftover.map(|err| {
            let rendered = err.to_string();
            warn::emit(WarnEvent {
                code: "SOURCE_REMOVE_FAILED",
                stage: "executor",
                action: action.label(),
                folder,
                reason: "verified-copy-kept",
                err: &rendered,
            });
            rendered
        });
        let audit_error = self.write_audit(AuditRecord {
            timestamp: self.audit.stamp(),
            folder: folder.to_string(),
            action,
            outcome: AuditOutcome::Success,
            source: Some(source.display().to_string()),
            destination: destination.as_ref().map(|p| p.display().to_string()),
            renamed_to: renamed_to.clone(),
            note: leftover_error
                .as_ref()
                .map(|err| format!("source not fully removed: {err}")),
        });
        ActionOutcome {
            folder: folder.to_string(),
            action,
            source,
            destination,
            renamed_to,
            audit_error,
            leftover_error,
        }
    }

    fn stage_locked(&self, folder: &str) -> Result<ActionOutcome, ActionError> {
        let action = AuditAction::Staged;
        if let Err(err) = validate_name(folder) {
            return Err(self.fail(folder, action, None, err));
        }
        let source = self.backups_root.join(folder);
        if !is_real_dir(&source) {
            let err = ActionError::NotFound {
                folder: folder.to_string(),
                location: self.backups_root.clone(),
            };
            return Err(self.fail(folder, action, Some(source.as_path()), err));
        }
        if let Err(source_err) = fs::create_dir_all(&self.staging_root) {
            let err = ActionError::Filesystem {
                folder: folder.to_string(),
                op: "create staging root",
                source: source_err,
            };
            return Err(self.fail(folder, action, Some(source.as_path()), err));
        }
        let (destination, renamed_to) = free_destination(&self.staging_root, folder);
        if let Some(new_name) = &renamed_to {
            info!(folder, renamed_to = %new_name, "staging root already has this name");
        }
        let leftover = match move_dir(&source, &destination) {
            Ok(leftover) => leftover,
            Err(io_err) => {
                let err = ActionError::Filesystem {
                    folder: folder.to_string(),
                    op: "move to staging",
                    source: io_err,
                };
                return Err(self.fail(folder, action, Some(source.as_path()), err));
            }
        };
        Ok(self.succeed(folder, action, source, Some(destination), renamed_to, leftover))
    }

    /// Move `backups_root/folder` into the staging root.
    pub fn stage(&self, folder: &str) -> Result<ActionOutcome, ActionError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.stage_locked(folder)
    }

    /// Permanently remove a folder from the staging root. Folders still in
    /// the backups root are refused untouched.
    pub fn delete(&self, folder: &str) -> Result<ActionOutcome, ActionError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let action = AuditAction::Deleted;
        if let Err(err) = validate_name(folder) {
            return Err(self.fail(folder, action, None, err));
        }
        let target = self.staging_root.join(folder);
        if staging_contains(&target, &self.backups_root) {
            let err = ActionError::ProtectedPath {
                folder: folder.to_string(),
                target: target.clone(),
            };
            return Err(self.fail(folder, action, Some(target.as_path()), err));
        }
        if !is_real_dir(&target) {
            let err = ActionError::NotStaged {
                folder: folder.to_string(),
            };
            return Err(self.fail(folder, action, Some(target.as_path()), err));
        }
        if let Err(io_err) = fs::remove_dir_all(&target) {
            let err = ActionError::Filesystem {
                folder: folder.to_string(),
                op: "remove",
                source: io_err,
            };
            return Err(self.fail(folder, action, Some(target.as_path()), err));
        }
        Ok(self.succeed(folder, action, target, None, None, None))
    }

    /// Move a staged folder back into the backups root; never overwrites.
    pub fn restore(&self, folder: &str) -> Result<ActionOutcome, ActionError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let action = AuditAction::Restored;
        if let Err(err) = validate_name(folder) {
            return Err(self.fail(folder, action, None, err));
        }
        let source = self.staging_root.join(folder);
        if !is_real_dir(&source) {
            let err = ActionError::NotFound {
                folder: folder.to_string(),
                location: self.staging_root.clone(),
            };
            return Err(self.fail(folder, action, Some(source.as_path()), err));
        }
        let destination = self.backups_root.join(folder);
        if exists_no_follow(&destination) {
            let err = ActionError::RestoreConflict {
                folder: folder.to_string(),
            };
            return Err(self.fail(folder, action, Some(source.as_path()), err));
        }
        let leftover = match move_dir(&source, &destination) {
            Ok(leftover) => leftover,
            Err(io_err) => {
                let err = ActionError::Filesystem {
                    folder: folder.to_string(),
                    op: "move to backups root",
                    source: io_err,
                };
                return Err(self.fail(folder, action, Some(source.as_path()), err));
            }
        };
        Ok(self.succeed(folder, action, source, Some(destination), None, leftover))
    }

    /// Carry out a ledger entry's effective action. Only Stage is actionable.
    pub fn execute(&self, entry: &LedgerEntry) -> Result<ActionOutcome, ActionError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match entry.effective_action() {
            EffectiveAction::Stage => self.stage_locked(entry.name()),
            other => {
                let err = ActionError::NotActionable {
                    folder: entry.name().to_string(),
                    action: other.label(),
                };
                Err(self.fail(entry.name(), AuditAction::Staged, Some(entry.unit.path.as_path()), err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::sweep::audit::AuditLog;
    use crate::sweep::ledger::{Ledger, Override};
    use crate::sweep::matcher::{KeyRule, match_units};
    use crate::sweep::records::{RecordStatus, RemoteRecord};
    use crate::sweep::scanner::{ScanOptions, scan};
    use chrono::{DateTime, Utc};
    use std::thread;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _tmp: TempDir,
        backups: PathBuf,
        staging: PathBuf,
        log: Arc<AuditLog>,
        exec: ActionExecutor,
    }

    fn fixture() -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let backups = tmp.path().join("backups");
        let staging = backups.join("MARKED FOR DELETION");
        fs::create_dir_all(&backups).expect("mkdir backups");
        let log = Arc::new(AuditLog::new(&tmp.path().join("audit"), chrono_tz::UTC));
        let exec = ActionExecutor::new(&backups, &staging, log.clone());
        Fixture {
            _tmp: tmp,
            backups,
            staging,
            log,
            exec,
        }
    }

    fn make_folder(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("docs")).expect("mkdir");
        fs::write(dir.join("image.bin"), (0..=255u8).collect::<Vec<_>>()).expect("write");
        fs::write(dir.join("docs").join("readme.txt"), name).expect("write");
    }

    fn audit_records(fx: &Fixture) -> Vec<AuditRecord> {
        fx.log.read_day(fx.log.today()).expect("read audit")
    }

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Io(io::Error::other("disk full")))
        }

        fn stamp(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[test]
    fn stage_restore_stage_preserves_bytes() {
        let fx = fixture();
        make_folder(&fx.backups, "CI0001_2023");
        let before = tree_digest(&fx.backups.join("CI0001_2023")).expect("digest");

        fx.exec.stage("CI0001_2023").expect("stage");
        fx.exec.restore("CI0001_2023").expect("restore");
        let outcome = fx.exec.stage("CI0001_2023").expect("stage again");

        assert_eq!(outcome.destination, Some(fx.staging.join("CI0001_2023")));
        assert!(!fx.backups.join("CI0001_2023").exists());
        let after = tree_digest(&fx.staging.join("CI0001_2023")).expect("digest");
        assert_eq!(before, after);
    }

    #[test]
    fn delete_of_in_place_folder_changes_nothing() {
        let fx = fixture();
        make_folder(&fx.backups, "TKT0000001_a");
        let before = tree_digest(&fx.backups.join("TKT0000001_a")).expect("digest");

        let err = fx.exec.delete("TKT0000001_a").expect_err("not staged");
        assert!(matches!(err, ActionError::NotStaged { .. }));
        assert_eq!(
            tree_digest(&fx.backups.join("TKT0000001_a")).expect("digest"),
            before
        );

        let records = audit_records(&fx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::Deleted);
        assert!(!records[0].succeeded());
    }

    #[test]
    fn staged_folder_can_be_deleted() {
        let fx = fixture();
        make_folder(&fx.backups, "TKT0000001_a");
        fx.exec.stage("TKT0000001_a").expect("stage");
        fx.exec.delete("TKT0000001_a").expect("delete");
        assert!(!fx.staging.join("TKT0000001_a").exists());
    }

    #[test]
    fn stage_collision_takes_next_free_suffix() {
        let fx = fixture();
        fs::create_dir_all(fx.staging.join("CI0001_2023")).expect("mkdir existing");
        make_folder(&fx.backups, "CI0001_2023");

        let outcome = fx.exec.stage("CI0001_2023").expect("stage");
        assert_eq!(outcome.renamed_to.as_deref(), Some("CI0001_2023_1"));
        assert!(fx.staging.join("CI0001_2023_1").join("image.bin").exists());

        let records = audit_records(&fx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].renamed_to.as_deref(), Some("CI0001_2023_1"));
    }

    #[test]
    fn restore_refuses_to_overwrite() {
        let fx = fixture();
        make_folder(&fx.backups, "TKT0000001_a");
        fx.exec.stage("TKT0000001_a").expect("stage");
        fs::create_dir_all(fx.backups.join("TKT0000001_a")).expect("recreate");

        let err = fx.exec.restore("TKT0000001_a").expect_err("conflict");
        assert!(matches!(err, ActionError::RestoreConflict { .. }));
        assert!(fx.staging.join("TKT0000001_a").join("image.bin").exists());
    }

    #[test]
    fn invalid_names_are_rejected_and_audited() {
        let fx = fixture();
        for name in ["", "..", "a/b", "../escape"] {
            let err = fx.exec.stage(name).expect_err("invalid");
            assert!(matches!(err, ActionError::InvalidName { .. }), "{name}");
        }
        assert_eq!(audit_records(&fx).len(), 4);
    }

    #[test]
    fn every_attempt_writes_one_record_in_order() {
        let fx = fixture();
        make_folder(&fx.backups, "TKT0000001_a");
        fx.exec.stage("TKT0000001_a").expect("stage");
        let _ = fx.exec.stage("TKT0000001_a");
        fx.exec.restore("TKT0000001_a").expect("restore");
        let _ = fx.exec.restore("TKT0000001_a");
        fx.exec.stage("TKT0000001_a").expect("stage");
        fx.exec.delete("TKT0000001_a").expect("delete");

        let records = audit_records(&fx);
        let actions = records.iter().map(|r| r.action).collect::<Vec<_>>();
        assert_eq!(
            actions,
            vec![
                AuditAction::Staged,
                AuditAction::Staged,
                AuditAction::Restored,
                AuditAction::Restored,
                AuditAction::Staged,
                AuditAction::Deleted,
            ]
        );
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn audit_failure_does_not_undo_the_action() {
        let tmp = tempdir().expect("tempdir");
        let backups = tmp.path().join("backups");
        let staging = tmp.path().join("staging");
        make_folder(&backups, "TKT0000001_a");
        let exec = ActionExecutor::new(&backups, &staging, Arc::new(BrokenSink));

        let outcome = exec.stage("TKT0000001_a").expect("stage");
        assert!(outcome.audit_error.as_deref().is_some_and(|e| e.contains("disk full")));
        assert!(staging.join("TKT0000001_a").exists());
    }

    #[test]
    fn execute_only_stages_confirmed_entries() {
        let fx = fixture();
        make_folder(&fx.backups, "TKT0000001_a");
        make_folder(&fx.backups, "TKT0000002_b");
        let inventory = scan(&fx.backups, Some(fx.staging.as_path()), &ScanOptions::default()).expect("scan");
        let records = vec![
            RemoteRecord::new("TKT0000001", RecordStatus::Retired),
            RemoteRecord::new("TKT0000002", RecordStatus::Retired),
        ];
        let results = match_units(&inventory.units, Ok(&records), &KeyRule::new("TKT", Some(7)));
        let mut ledger = Ledger::build(inventory, results);
        ledger
            .apply_override("TKT0000001_a", Override::ConfirmComputed)
            .expect("override");

        fx.exec
            .execute(ledger.get("TKT0000001_a").expect("entry"))
            .expect("execute");
        let err = fx
            .exec
            .execute(ledger.get("TKT0000002_b").expect("entry"))
            .expect_err("not confirmed");
        assert!(matches!(err, ActionError::NotActionable { .. }));
        assert!(fx.staging.join("TKT0000001_a").exists());
        assert!(fx.backups.join("TKT0000002_b").exists());
    }

    #[test]
    fn concurrent_stages_are_serialized() {
        let fx = fixture();
        let names = (0..8).map(|i| format!("TKT000000{i}_x")).collect::<Vec<_>>();
        for name in &names {
            make_folder(&fx.backups, name);
        }
        let exec = Arc::new(fx.exec);
        let handles = names
            .iter()
            .cloned()
            .map(|name| {
                let exec = exec.clone();
                thread::spawn(move || exec.stage(&name))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join").expect("stage");
        }
        for name in &names {
            assert!(fx.staging.join(name).exists());
        }
        let records = fx.log.read_day(fx.log.today()).expect("read audit");
        assert_eq!(records.len(), names.len());
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn verified_copy_matches_and_removes_source() {
        let tmp = tempdir().expect("tempdir");
        make_folder(tmp.path(), "src");
        let digest = tree_digest(&tmp.path().join("src")).expect("digest");

        let leftover = copy_verified(&tmp.path().join("src"), &tmp.path().join("dst")).expect("copy");
        assert!(leftover.is_none());
        assert!(!tmp.path().join("src").exists());
        assert_eq!(tree_digest(&tmp.path().join("dst")).expect("digest"), digest);
    }

    #[test]
    fn verified_copy_is_kept_when_source_removal_fails() {
        let tmp = tempdir().expect("tempdir");
        make_folder(tmp.path(), "src");
        let digest = tree_digest(&tmp.path().join("src")).expect("digest");

        let leftover = copy_verified_with(&tmp.path().join("src"), &tmp.path().join("dst"), |_| {
            Err(io::Error::other("file in use"))
        })
        .expect("copy");

        assert_eq!(leftover.map(|err| err.to_string()).as_deref(), Some("file in use"));
        assert_eq!(tree_digest(&tmp.path().join("dst")).expect("digest"), digest);
        assert!(tmp.path().join("src").join("image.bin").exists());
    }

    #[test]
    fn unusable_staging_root_fails_once_and_leaves_source() {
        let tmp = tempdir().expect("tempdir");
        let backups = tmp.path().join("backups");
        let staging = tmp.path().join("staging");
        fs::create_dir_all(&backups).expect("mkdir backups");
        fs::write(&staging, "not a directory").expect("write blocker");
        let log = Arc::new(AuditLog::new(&tmp.path().join("audit"), chrono_tz::UTC));
        let exec = ActionExecutor::new(&backups, &staging, log.clone());
        make_folder(&backups, "TKT0000001_a");
        let before = tree_digest(&backups.join("TKT0000001_a")).expect("digest");

        let inventory =
            scan(&backups, Some(staging.as_path()), &ScanOptions::default()).expect("scan");
        let records = vec![RemoteRecord::new("TKT0000001", RecordStatus::Retired)];
        let results = match_units(&inventory.units, Ok(&records), &KeyRule::new("TKT", Some(7)));
        let mut ledger = Ledger::build(inventory, results);
        ledger.confirm_eligible();

        let entry = ledger.get("TKT0000001_a").expect("entry");
        let err = exec.execute(entry).expect_err("staging root is a file");
        assert_eq!(err.folder(), "TKT0000001_a");
        assert!(matches!(err, ActionError::Filesystem { .. }));
        assert!(std::error::Error::source(&err).is_some());
        let reason = format!("{} {err}", err.code().as_str());
        ledger.record_failure("TKT0000001_a", &reason).expect("record");

        let entry = ledger.get("TKT0000001_a").expect("entry");
        assert!(entry.last_error.as_deref().is_some_and(|e| e.starts_with("E106_FILESYSTEM")));
        assert_eq!(tree_digest(&backups.join("TKT0000001_a")).expect("digest"), before);
        let audit = log.read_day(log.today()).expect("read audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].folder, "TKT0000001_a");
        assert!(!audit[0].succeeded());
    }

    #[test]
    fn delete_refuses_a_target_that_holds_the_backups_root() {
        let tmp = tempdir().expect("tempdir");
        let staging = tmp.path().join("srv");
        let backups = staging.join("backups");
        make_folder(&backups, "TKT0000001_a");
        let log = Arc::new(AuditLog::new(&tmp.path().join("audit"), chrono_tz::UTC));
        let exec = ActionExecutor::new(&backups, &staging, log.clone());

        let err = exec.delete("backups").expect_err("protected");
        assert!(matches!(err, ActionError::ProtectedPath { .. }));
        assert_eq!(err.code().as_str(), "E107_PROTECTED_PATH");
        assert!(backups.join("TKT0000001_a").join("image.bin").exists());

        let audit = log.read_day(log.today()).expect("read audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Deleted);
        assert!(!audit[0].succeeded());
    }

    #[test]
    fn failed_copy_leaves_source_and_no_partial() {
        let tmp = tempdir().expect("tempdir");
        make_folder(tmp.path(), "src");
        fs::write(tmp.path().join("blocker"), "file").expect("write");
        // Destination parent is a file, so the copy cannot start.
        let err = copy_verified(&tmp.path().join("src"), &tmp.path().join("blocker").join("dst"));
        assert!(err.is_err());
        assert!(tmp.path().join("src").join("image.bin").exists());
    }
}
