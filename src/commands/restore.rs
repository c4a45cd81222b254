use anyhow::Result;

use crate::commands::{CommandReport, build_executor, load_context};

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub names: Vec<String>,
}

pub fn run(opts: &RestoreOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("restore");
    report.detail(format!("backups_root={}", ctx.cfg.backups_location.display()));

    if opts.names.is_empty() {
        report.issue("name at least one staged folder to restore");
        return Ok(report);
    }

    let executor = build_executor(&ctx)?;
    let mut restored = Vec::new();
    for name in &opts.names {
        match executor.restore(name) {
            Ok(outcome) => {
                report.detail(format!("restored {name}"));
                if let Some(audit_err) = &outcome.audit_error {
                    report.issue(format!("{name}: restored but audit record not written: {audit_err}"));
                }
                if let Some(leftover) = &outcome.leftover_error {
                    report.issue(format!(
                        "{name}: restored and verified, but part of it is still in the staging root: {leftover}"
                    ));
                }
                restored.push(outcome);
            }
            Err(err) => report.issue(format!("restore failed: {} {err}", err.code().as_str())),
        }
    }
    report.attach(&restored)?;
    Ok(report)
}
