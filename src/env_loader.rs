use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(hdcs_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match (hdcs_home, home_dir) {
        (Some(base), _) => Some(base.join(".env")),
        (None, Some(home)) => Some(home.join(".hdcs-backups").join(".env")),
        (None, None) => None,
    }
}

/// Loads `./.env`, falling back to the one next to the hdcs home directory.
/// ServiceNow credentials usually live there.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("HDCS_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_hdcs_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/hdcs")),
            Some(PathBuf::from("/home/alice")),
        );

        assert_eq!(got, Some(PathBuf::from("/srv/hdcs/.env")));
    }

    #[test]
    fn fallback_uses_home_when_hdcs_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        let want = Some(PathBuf::from("/home/alice/.hdcs-backups/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_is_none_without_any_home() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
