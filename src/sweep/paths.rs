use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct HdcsPaths {
    pub home: PathBuf,
    pub logs_dir: PathBuf,
    pub audit_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_file: PathBuf,
    pub legacy_config_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

impl HdcsPaths {
    /// Layout rooted at `home` with no environment overrides applied.
    pub fn under(home: &Path) -> Self {
        let logs_dir = home.join("logs");
        Self {
            home: home.to_path_buf(),
            audit_dir: logs_dir.join("audit"),
            logs_dir,
            state_dir: home.join("state"),
            config_file: home.join("config.toml"),
            legacy_config_file: home.join("config.json"),
        }
    }
}

pub fn resolve_paths() -> Result<HdcsPaths> {
    let default_home = match env::var("HDCS_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".hdcs-backups"),
    };

    let mut paths = HdcsPaths::under(&default_home);
    paths.logs_dir = env_or_default_path("HDCS_LOGS_DIR", paths.logs_dir);
    paths.audit_dir = paths.logs_dir.join("audit");
    paths.config_file = env_or_default_path("HDCS_CONFIG_PATH", paths.config_file);
    Ok(paths)
}
