use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, PassRequest, load_context, render_entry, run_reconcile};
use crate::sweep::matcher::Disposition;

#[derive(Debug, Clone, Default)]
pub struct ScanCommandOptions {
    pub records: Option<PathBuf>,
    pub size: bool,
}

pub fn run(opts: &ScanCommandOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("scan");
    let req = PassRequest {
        records: opts.records.as_deref(),
        size: opts.size,
    };
    let outcome = run_reconcile(&ctx, &req, &mut report)?;

    for entry in outcome.ledger.entries() {
        report.detail(render_entry(entry, &ctx.cfg));
    }

    let summary = outcome.ledger.summary();
    let counts = Disposition::ALL
        .iter()
        .map(|d| format!("{}={}", d.label(), summary.count(*d)))
        .collect::<Vec<_>>()
        .join(" ");
    report.detail(format!(
        "summary total={} {counts} skipped={}",
        summary.total, summary.skipped
    ));
    if summary.delete_eligible > 0 {
        report.detail(format!(
            "{} folder(s) eligible; run `hdcs-backups stage` to review and move them",
            summary.delete_eligible
        ));
    }

    report.attach(&serde_json::json!({
        "summary": summary,
        "entries": outcome.ledger.entries().collect::<Vec<_>>(),
        "skipped": outcome.ledger.skipped(),
        "fetch_error": outcome.fetch_error.as_ref().map(ToString::to_string),
        "elapsed_ms": outcome.elapsed.as_millis() as u64,
    }))?;
    Ok(report)
}
