pub mod audit;
pub mod delete;
pub mod override_cmd;
pub mod restore;
pub mod scan;
pub mod stage;
pub mod staged;
pub mod status;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::FetchError;
use crate::sweep::audit::AuditLog;
use crate::sweep::config::{SweepConfig, load_config_from};
use crate::sweep::executor::ActionExecutor;
use crate::sweep::ledger::LedgerEntry;
use crate::sweep::overrides;
use crate::sweep::paths::{HdcsPaths, resolve_paths};
use crate::sweep::reconcile::{PassOutcome, run_pass, scan_options};
use crate::sweep::records::{FileFetcher, RecordFetcher, UnavailableFetcher};
use crate::sweep::servicenow::{ServiceNowCredentials, ServiceNowFetcher};
use crate::sweep::util::{CancelFlag, format_local, human_readable_size};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn attach(&mut self, value: &impl Serialize) -> Result<()> {
        self.data = Some(serde_json::to_value(value).context("failed to encode report data")?);
        Ok(())
    }
}

/// Paths and resolved configuration shared by every command.
#[derive(Debug, Clone)]
pub struct SweepContext {
    pub paths: HdcsPaths,
    pub cfg: SweepConfig,
    pub config_source: Option<PathBuf>,
}

pub fn load_context() -> Result<SweepContext> {
    let paths = resolve_paths()?;
    let (cfg, config_source) = load_config_from(&paths)?;
    Ok(SweepContext {
        paths,
        cfg,
        config_source,
    })
}

fn servicenow_fetcher(cfg: &SweepConfig) -> Result<ServiceNowFetcher, FetchError> {
    let credentials = ServiceNowCredentials::from_env()?;
    ServiceNowFetcher::new(cfg, credentials)
}

/// A records file wins over the configured instance. When neither works the
/// pass still runs, with every folder sent to review.
pub fn build_fetcher(cfg: &SweepConfig, records: Option<&Path>) -> Arc<dyn RecordFetcher> {
    if let Some(path) = records {
        return Arc::new(FileFetcher::new(path));
    }
    if cfg.instance.trim().is_empty() {
        return Arc::new(UnavailableFetcher::new(FetchError::Config(
            "no ITSM instance configured and no records file given".to_string(),
        )));
    }
    match servicenow_fetcher(cfg) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => Arc::new(UnavailableFetcher::new(err)),
    }
}

pub fn build_executor(ctx: &SweepContext) -> Result<ActionExecutor> {
    let tz = ctx.cfg.timezone()?;
    let audit = Arc::new(AuditLog::new(&ctx.paths.audit_dir, tz));
    Ok(ActionExecutor::new(
        &ctx.cfg.backups_location,
        &ctx.cfg.deletion_location,
        audit,
    ))
}

#[derive(Debug, Clone, Default)]
pub struct PassRequest<'a> {
    pub records: Option<&'a Path>,
    pub size: bool,
}

/// Run a reconciliation pass, reapply stored overrides when enabled, and
/// note the pass-level facts on the report.
pub fn run_reconcile(
    ctx: &SweepContext,
    req: &PassRequest<'_>,
    report: &mut CommandReport,
) -> Result<PassOutcome> {
    let fetcher = build_fetcher(&ctx.cfg, req.records);
    let opts = scan_options(&ctx.cfg, req.size, CancelFlag::new());
    let mut outcome = run_pass(&ctx.cfg, fetcher, &opts)?;

    report.detail(format!("backups_root={}", ctx.cfg.backups_location.display()));
    report.detail(format!("staging_root={}", ctx.cfg.deletion_location.display()));
    report.detail(format!(
        "records_source={} records={}",
        outcome.fetcher_label, outcome.record_count
    ));
    if let Some(err) = &outcome.fetch_error {
        report.issue(format!("record fetch failed, every folder needs review: {err}"));
    }
    if outcome.size_truncated {
        report.detail("size computation stopped early; some sizes are missing");
    }
    for skip in outcome.ledger.skipped() {
        report.detail(format!("skipped {}: {}", skip.name, skip.reason));
    }

    if ctx.cfg.pass.carry_overrides {
        let mut store = overrides::load(&ctx.paths)?;
        let carried = store.carry_into(&mut outcome.ledger);
        for folder in &carried.applied {
            report.detail(format!("carried override for {folder}"));
        }
        for dropped in &carried.dropped {
            report.detail(format!(
                "dropped stored override for {}: {}",
                dropped.folder, dropped.reason
            ));
        }
        if !carried.dropped.is_empty() {
            overrides::save(&ctx.paths, &store)?;
        }
    }

    Ok(outcome)
}

pub fn render_entry(entry: &LedgerEntry, cfg: &SweepConfig) -> String {
    let tz = cfg.timezone().unwrap_or(chrono_tz::UTC);
    let mut line = format!(
        "{:<15} {}",
        entry.disposition().label(),
        entry.name()
    );
    if let Some(key) = &entry.result.key {
        line.push_str(&format!(" key={key}"));
    }
    if let Some(record) = &entry.result.record {
        line.push_str(&format!(" status={}", record.status.label()));
        if let Some(closed_at) = record.closed_at {
            line.push_str(&format!(" closed_at=\"{}\"", format_local(closed_at, tz)));
        }
        if let Some(closed_by) = &record.closed_by {
            line.push_str(&format!(" closed_by=\"{closed_by}\""));
        }
        if record.pickup_tagged {
            line.push_str(" pickup=yes");
        }
    }
    if let Some(bytes) = entry.unit.size_bytes {
        line.push_str(&format!(" size=\"{}\"", human_readable_size(bytes)));
    }
    if let Some(decision) = entry.override_ {
        line.push_str(&format!(
            " override={} action={}",
            decision.label(),
            entry.effective_action().label()
        ));
    }
    line.push_str(&format!(" reason=\"{}\"", entry.result.reason));
    if let Some(err) = &entry.last_error {
        line.push_str(&format!(" last_error=\"{err}\""));
    }
    line
}
