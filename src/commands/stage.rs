use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{
    CommandReport, PassRequest, build_executor, load_context, render_entry, run_reconcile,
};
use crate::sweep::executor::ActionOutcome;
use crate::sweep::ledger::Override;

#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub records: Option<PathBuf>,
    pub size: bool,
    /// Actually move folders; without it the command only lists candidates.
    pub yes: bool,
    pub only: Vec<String>,
    pub keep: Vec<String>,
    pub force: Vec<String>,
}

pub fn run(opts: &StageOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("stage");
    let req = PassRequest {
        records: opts.records.as_deref(),
        size: opts.size,
    };
    let mut ledger = run_reconcile(&ctx, &req, &mut report)?.ledger;

    let decisions = opts
        .keep
        .iter()
        .map(|name| (name, Override::ForceKeep))
        .chain(opts.force.iter().map(|name| (name, Override::ForceDelete)));
    for (name, decision) in decisions {
        if let Err(err) = ledger.apply_override(name, decision) {
            report.issue(err.to_string());
        }
    }
    let confirmed = ledger.confirm_eligible();
    report.detail(format!("confirmed {confirmed} delete-eligible folder(s)"));

    for name in &opts.only {
        if ledger.get(name).is_none() {
            report.issue(format!("--only {name}: no such folder in this pass"));
        }
    }
    let candidates = ledger
        .to_stage()
        .into_iter()
        .filter(|entry| opts.only.is_empty() || opts.only.iter().any(|n| n == entry.name()))
        .map(|entry| {
            report.detail(format!("candidate {}", render_entry(entry, &ctx.cfg)));
            entry.name().to_string()
        })
        .collect::<Vec<_>>();

    if candidates.is_empty() {
        report.detail("nothing to stage");
        return Ok(report);
    }
    if !opts.yes {
        report.detail(format!(
            "dry-run: {} folder(s) would move to {}; re-run with --yes to stage them",
            candidates.len(),
            ctx.cfg.deletion_location.display()
        ));
        report.attach(&candidates)?;
        return Ok(report);
    }

    let executor = build_executor(&ctx)?;
    let mut staged: Vec<ActionOutcome> = Vec::new();
    for name in &candidates {
        let Some(entry) = ledger.get(name) else {
            continue;
        };
        match executor.execute(entry) {
            Ok(outcome) => {
                match &outcome.renamed_to {
                    Some(renamed) => report.detail(format!("staged {name} as {renamed}")),
                    None => report.detail(format!("staged {name}")),
                }
                if let Some(audit_err) = &outcome.audit_error {
                    report.issue(format!("{name}: staged but audit record not written: {audit_err}"));
                }
                if let Some(leftover) = &outcome.leftover_error {
                    report.issue(format!(
                        "{name}: staged and verified, but part of the source is still in the backups root: {leftover}"
                    ));
                }
                staged.push(outcome);
            }
            Err(err) => {
                let code = err.code().as_str();
                let reason = format!("{code} {err}");
                ledger.record_failure(name, &reason)?;
                report.issue(format!("stage failed for {}: {reason}", err.folder()));
            }
        }
    }
    report.detail(format!(
        "staged {} of {} folder(s) into {}",
        staged.len(),
        candidates.len(),
        ctx.cfg.deletion_location.display()
    ));
    report.attach(&serde_json::json!({
        "staged": staged,
        "failed": ledger
            .entries()
            .filter(|entry| entry.last_error.is_some())
            .collect::<Vec<_>>(),
    }))?;
    Ok(report)
}
