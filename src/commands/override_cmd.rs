use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, PassRequest, load_context, run_reconcile};
use crate::sweep::ledger::Override;
use crate::sweep::overrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideChoice {
    Keep,
    Delete,
    Confirm,
    Clear,
}

#[derive(Debug, Clone)]
pub struct OverrideOptions {
    pub name: String,
    pub choice: OverrideChoice,
    pub records: Option<PathBuf>,
}

pub fn run(opts: &OverrideOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("override");

    if !ctx.cfg.pass.carry_overrides {
        report.issue(
            "stored overrides are disabled; set pass.carry_overrides = true or HDCS_CARRY_OVERRIDES=1",
        );
        return Ok(report);
    }

    let mut store = overrides::load(&ctx.paths)?;
    let decision = match opts.choice {
        OverrideChoice::Clear => {
            if store.clear(&opts.name) {
                report.detail(format!("cleared stored override for {}", opts.name));
                let file = overrides::save(&ctx.paths, &store)?;
                report.detail(format!("overrides_file={}", file.display()));
            } else {
                report.detail(format!("no stored override for {}", opts.name));
            }
            return Ok(report);
        }
        OverrideChoice::Keep => Override::ForceKeep,
        OverrideChoice::Delete => Override::ForceDelete,
        OverrideChoice::Confirm => Override::ConfirmComputed,
    };

    // The decision is pinned to the disposition computed right now.
    let req = PassRequest {
        records: opts.records.as_deref(),
        size: false,
    };
    let outcome = run_reconcile(&ctx, &req, &mut report)?;
    // Carry-over may have dropped stale entries and saved; start from disk again.
    store = overrides::load(&ctx.paths)?;
    let Some(entry) = outcome.ledger.get(&opts.name) else {
        report.issue(format!("no folder named {} in this pass", opts.name));
        return Ok(report);
    };
    let disposition = entry.disposition();
    store.record(&opts.name, decision, disposition);
    let file = overrides::save(&ctx.paths, &store)?;
    report.detail(format!(
        "stored override {} for {} (disposition {})",
        decision.label(),
        opts.name,
        disposition.label()
    ));
    report.detail(format!("overrides_file={}", file.display()));
    Ok(report)
}
