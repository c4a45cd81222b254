use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, load_context};
use crate::sweep::matcher::KeyRule;

include!(concat!(env!("OUT_DIR"), "/hdcs_env_allowlist.rs"));

/// Credential variables are reported as set or unset, never echoed.
const SECRET_ENV_KEYS: &[&str] = &["HDCS_ITSM_PASSWORD", "HDCS_ITSM_USER"];

fn env_overrides_in_effect() -> Vec<(String, String)> {
    GENERATED_HDCS_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| {
            let value = env::var(key).ok()?;
            let shown = if SECRET_ENV_KEYS.contains(key) {
                "<set>".to_string()
            } else {
                value
            };
            Some((key.to_string(), shown))
        })
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("status");
    let cfg = &ctx.cfg;

    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", ctx.paths.home.display()));
    report.detail(format!("logs_dir={}", ctx.paths.logs_dir.display()));
    report.detail(format!("audit_dir={}", ctx.paths.audit_dir.display()));
    report.detail(format!("state_dir={}", ctx.paths.state_dir.display()));
    match &ctx.config_source {
        Some(path) => report.detail(format!("config_file={}", path.display())),
        None => report.detail("config_file=none (defaults and environment only)"),
    }

    report.detail(format!("backups_root={}", cfg.backups_location.display()));
    report.detail(format!("staging_root={}", cfg.deletion_location.display()));
    report.detail(format!(
        "instance={}",
        if cfg.instance.is_empty() { "none" } else { cfg.instance.as_str() }
    ));
    report.detail(format!(
        "itsm table={} query={} retention_weeks={} timezone={}",
        cfg.itsm.table, cfg.itsm.query, cfg.itsm.retention_weeks, cfg.itsm.timezone
    ));
    report.detail(format!("key_rule={:?}", KeyRule::from_config(&cfg.matching)));
    report.detail(format!(
        "get_size={} size_budget_secs={} fetch_timeout_secs={} carry_overrides={}",
        cfg.get_size,
        cfg.pass.size_budget_secs,
        cfg.pass.fetch_timeout_secs,
        cfg.pass.carry_overrides
    ));

    for (key, value) in env_overrides_in_effect() {
        report.detail(format!("env {key}={value}"));
    }

    if !cfg.backups_location.is_dir() {
        report.issue(format!(
            "backups root {} is not a readable directory",
            cfg.backups_location.display()
        ));
    }
    if !cfg.instance.is_empty()
        && (env::var("HDCS_ITSM_USER").is_err() || env::var("HDCS_ITSM_PASSWORD").is_err())
    {
        report.issue("ITSM instance configured but HDCS_ITSM_USER / HDCS_ITSM_PASSWORD are not set");
    }

    Ok(report)
}
