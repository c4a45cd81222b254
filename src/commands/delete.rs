use anyhow::Result;

use crate::commands::{CommandReport, build_executor, load_context};
use crate::sweep::scanner::{ScanOptions, scan};

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub names: Vec<String>,
    pub all: bool,
    pub yes: bool,
}

pub fn run(opts: &DeleteOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("delete");
    let staging_root = &ctx.cfg.deletion_location;
    report.detail(format!("staging_root={}", staging_root.display()));

    let names = if opts.all {
        if !staging_root.exists() {
            report.detail("staging root does not exist; nothing to delete");
            return Ok(report);
        }
        scan(staging_root, Some(ctx.cfg.backups_location.as_path()), &ScanOptions::default())?
            .units
            .into_iter()
            .map(|unit| unit.name)
            .collect::<Vec<_>>()
    } else {
        opts.names.clone()
    };

    if names.is_empty() {
        if opts.all {
            report.detail("staging root is empty; nothing to delete");
        } else {
            report.issue("name the staged folders to delete, or pass --all");
        }
        return Ok(report);
    }

    if !opts.yes {
        for name in &names {
            report.detail(format!("would permanently delete {name}"));
        }
        report.detail(format!(
            "dry-run: re-run with --yes to permanently delete {} folder(s)",
            names.len()
        ));
        return Ok(report);
    }

    let executor = build_executor(&ctx)?;
    let mut deleted = Vec::new();
    for name in &names {
        match executor.delete(name) {
            Ok(outcome) => {
                report.detail(format!("deleted {name}"));
                if let Some(audit_err) = &outcome.audit_error {
                    report.issue(format!("{name}: deleted but audit record not written: {audit_err}"));
                }
                deleted.push(outcome);
            }
            Err(err) => report.issue(format!("delete failed: {} {err}", err.code().as_str())),
        }
    }
    report.detail(format!("deleted {} of {} folder(s)", deleted.len(), names.len()));
    report.attach(&deleted)?;
    Ok(report)
}
