use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::commands::{CommandReport, load_context};
use crate::sweep::audit::{AuditLog, AuditOutcome};
use crate::sweep::util::format_local;

#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// `YYYY-MM-DD` in the configured zone; today when absent.
    pub date: Option<String>,
}

pub fn run(opts: &AuditOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("audit");
    let tz = ctx.cfg.timezone()?;
    let log = AuditLog::new(&ctx.paths.audit_dir, tz);

    let date = match &opts.date {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --date {raw:?}; expected YYYY-MM-DD"))?,
        None => log.today(),
    };
    report.detail(format!("audit_file={}", log.day_path(date).display()));

    let records = log.read_day(date)?;
    for record in &records {
        let outcome = match &record.outcome {
            AuditOutcome::Success => "success".to_string(),
            AuditOutcome::Failure { reason } => format!("failure reason=\"{reason}\""),
        };
        let mut line = format!(
            "{} {} {} {outcome}",
            format_local(record.timestamp, tz),
            record.action.label(),
            record.folder,
        );
        if let Some(renamed) = &record.renamed_to {
            line.push_str(&format!(" renamed_to={renamed}"));
        }
        report.detail(line);
    }
    let failures = records.iter().filter(|r| !r.succeeded()).count();
    report.detail(format!("records={} failures={failures}", records.len()));
    report.attach(&records)?;
    Ok(report)
}
