use crate::sweep::paths::HdcsPaths;
use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STAGING_DIR_NAME: &str = "MARKED FOR DELETION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub key_prefix: String,
    /// Exact digit count after the prefix; 0 accepts any length.
    pub key_digits: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            key_prefix: "TKT".to_string(),
            key_digits: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItsmConfig {
    pub table: String,
    pub query: String,
    pub retention_weeks: u64,
    pub pickup_label: String,
    pub timezone: String,
    pub request_timeout_secs: u64,
    pub page_size: u64,
}

impl Default for ItsmConfig {
    fn default() -> Self {
        Self {
            table: "sc_req_item".to_string(),
            query: "numberSTARTSWITHTKT".to_string(),
            retention_weeks: 2,
            pickup_label: "0874ad561b6b9d147881db13dd4bcb96".to_string(),
            timezone: "America/New_York".to_string(),
            request_timeout_secs: 30,
            page_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub fetch_timeout_secs: u64,
    /// 0 leaves the recursive size computation unbounded.
    pub size_budget_secs: u64,
    pub carry_overrides: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 120,
            size_budget_secs: 0,
            carry_overrides: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SweepConfig {
    pub instance: String,
    pub backups_location: PathBuf,
    pub deletion_location: PathBuf,
    pub get_size: bool,
    pub matching: MatchingConfig,
    pub itsm: ItsmConfig,
    pub pass: PassConfig,
}

impl SweepConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.itsm
            .timezone
            .trim()
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid timezone {:?}: {err}", self.itsm.timezone))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.pass.fetch_timeout_secs)
    }

    pub fn size_budget(&self) -> Option<Duration> {
        match self.pass.size_budget_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSweepConfig {
    instance: Option<String>,
    backups_location: Option<PathBuf>,
    deletion_location: Option<PathBuf>,
    get_size: Option<bool>,
    matching: Option<MatchingConfig>,
    itsm: Option<ItsmConfig>,
    pass: Option<PassConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_path(var: &str, fallback: &Path) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback.to_path_buf(),
    }
}

fn merge_partial(base: &mut SweepConfig, parsed: PartialSweepConfig) {
    if let Some(instance) = parsed.instance {
        base.instance = instance;
    }
    if let Some(backups) = parsed.backups_location {
        base.backups_location = backups;
    }
    if let Some(deletion) = parsed.deletion_location {
        base.deletion_location = deletion;
    }
    if let Some(get_size) = parsed.get_size {
        base.get_size = get_size;
    }
    if let Some(matching) = parsed.matching {
        base.matching = matching;
    }
    if let Some(itsm) = parsed.itsm {
        base.itsm = itsm;
    }
    if let Some(pass) = parsed.pass {
        base.pass = pass;
    }
}

/// Merges `config.toml`, or the legacy `config.json` when no TOML file exists.
/// Returns the file that was applied, if any.
fn merge_file_config(base: &mut SweepConfig, paths: &HdcsPaths) -> Result<Option<PathBuf>> {
    if paths.config_file.exists() {
        let raw = fs::read_to_string(&paths.config_file)
            .with_context(|| format!("failed to read {}", paths.config_file.display()))?;
        let parsed: PartialSweepConfig = toml::from_str(&raw).map_err(|err| {
            anyhow!(
                "failed to parse config {}: {err}",
                paths.config_file.display()
            )
        })?;
        merge_partial(base, parsed);
        return Ok(Some(paths.config_file.clone()));
    }

    if paths.legacy_config_file.exists() {
        let raw = fs::read_to_string(&paths.legacy_config_file)
            .with_context(|| format!("failed to read {}", paths.legacy_config_file.display()))?;
        let parsed: PartialSweepConfig = json5::from_str(&raw).map_err(|err| {
            anyhow!(
                "failed to parse legacy config {}: {err}",
                paths.legacy_config_file.display()
            )
        })?;
        merge_partial(base, parsed);
        return Ok(Some(paths.legacy_config_file.clone()));
    }

    Ok(None)
}

fn apply_env_overrides(cfg: &mut SweepConfig) {
    cfg.instance = env_or_string("HDCS_INSTANCE", &cfg.instance);
    cfg.backups_location = env_or_path("HDCS_BACKUPS_LOCATION", &cfg.backups_location);
    cfg.deletion_location = env_or_path("HDCS_DELETION_LOCATION", &cfg.deletion_location);
    cfg.get_size = env_or_bool("HDCS_GET_SIZE", cfg.get_size);
    cfg.matching.key_prefix = env_or_string("HDCS_KEY_PREFIX", &cfg.matching.key_prefix);
    cfg.matching.key_digits =
        env_or_u64("HDCS_KEY_DIGITS", cfg.matching.key_digits as u64) as usize;
    cfg.itsm.retention_weeks = env_or_u64("HDCS_RETENTION_WEEKS", cfg.itsm.retention_weeks);
    cfg.itsm.timezone = env_or_string("HDCS_TIMEZONE", &cfg.itsm.timezone);
    cfg.pass.fetch_timeout_secs =
        env_or_u64("HDCS_FETCH_TIMEOUT_SECS", cfg.pass.fetch_timeout_secs);
    cfg.pass.size_budget_secs = env_or_u64("HDCS_SIZE_BUDGET_SECS", cfg.pass.size_budget_secs);
    cfg.pass.carry_overrides = env_or_bool("HDCS_CARRY_OVERRIDES", cfg.pass.carry_overrides);
}

fn fill_derived(cfg: &mut SweepConfig) {
    if cfg.deletion_location.as_os_str().is_empty() && !cfg.backups_location.as_os_str().is_empty()
    {
        cfg.deletion_location = cfg.backups_location.join(DEFAULT_STAGING_DIR_NAME);
    }
}

/// True when `staging` is `backups` or an ancestor of it, compared both as
/// written and canonicalized.
pub fn staging_contains(staging: &Path, backups: &Path) -> bool {
    if backups.starts_with(staging) {
        return true;
    }
    match (fs::canonicalize(staging), fs::canonicalize(backups)) {
        (Ok(staging), Ok(backups)) => backups.starts_with(staging),
        _ => false,
    }
}

fn validate(cfg: &SweepConfig) -> Result<()> {
    if cfg.backups_location.as_os_str().is_empty() {
        return Err(anyhow!(
            "backups_location is required (config file or HDCS_BACKUPS_LOCATION)"
        ));
    }
    if staging_contains(&cfg.deletion_location, &cfg.backups_location) {
        return Err(anyhow!(
            "deletion_location {} must not be backups_location or one of its parents ({})",
            cfg.deletion_location.display(),
            cfg.backups_location.display()
        ));
    }
    let prefix = cfg.matching.key_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(anyhow!(
            "invalid key prefix {:?}: use ASCII letters and digits",
            cfg.matching.key_prefix
        ));
    }
    if prefix.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(anyhow!("invalid key prefix {prefix:?}: cannot end with a digit"));
    }
    if cfg.itsm.page_size == 0 {
        return Err(anyhow!("invalid itsm page size: must be >= 1"));
    }
    if cfg.pass.fetch_timeout_secs == 0 {
        return Err(anyhow!("invalid fetch timeout: must be >= 1 second"));
    }
    cfg.timezone()?;
    Ok(())
}

pub fn load_config_from(paths: &HdcsPaths) -> Result<(SweepConfig, Option<PathBuf>)> {
    let mut cfg = SweepConfig::default();
    let source = merge_file_config(&mut cfg, paths)?;
    apply_env_overrides(&mut cfg);
    fill_derived(&mut cfg);
    validate(&cfg)?;
    Ok((cfg, source))
}
