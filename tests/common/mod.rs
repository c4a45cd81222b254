#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Site {
    pub tmp: TempDir,
    pub home: PathBuf,
    pub backups: PathBuf,
    pub staging: PathBuf,
    pub records: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let home = tmp.path().join("home");
        let backups = tmp.path().join("backups");
        fs::create_dir_all(&home).expect("mkdir home");
        fs::create_dir_all(&backups).expect("mkdir backups");
        Self {
            staging: backups.join("MARKED FOR DELETION"),
            records: tmp.path().join("records.json"),
            tmp,
            home,
            backups,
        }
    }

    pub fn folder(&self, name: &str) -> PathBuf {
        let dir = self.backups.join(name);
        fs::create_dir_all(dir.join("Documents")).expect("mkdir folder");
        fs::write(dir.join("Documents").join("notes.txt"), name).expect("write file");
        dir
    }

    pub fn write_records(&self, json: &str) {
        fs::write(&self.records, json).expect("write records");
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hdcs-backups");
        cmd.current_dir(self.tmp.path())
            .env("HDCS_HOME", &self.home)
            .env("HDCS_BACKUPS_LOCATION", &self.backups)
            .env_remove("HDCS_DELETION_LOCATION")
            .env_remove("HDCS_INSTANCE")
            .env_remove("HDCS_CONFIG_PATH")
            .env_remove("HDCS_LOGS_DIR")
            .env_remove("HDCS_RECORDS_FILE")
            .env_remove("HDCS_CARRY_OVERRIDES")
            .env_remove("HDCS_ITSM_USER")
            .env_remove("HDCS_ITSM_PASSWORD")
            .env("HDCS_LOG", "warn");
        cmd
    }

    pub fn audit_lines(&self) -> Vec<serde_json::Value> {
        let dir = self.home.join("logs").join("audit");
        let mut out = Vec::new();
        let Ok(entries) = fs::read_dir(&dir) else {
            return out;
        };
        let mut files = entries
            .map(|e| e.expect("entry").path())
            .collect::<Vec<_>>();
        files.sort();
        for file in files {
            let raw = fs::read_to_string(&file).expect("read audit");
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                out.push(serde_json::from_str(line).expect("audit json"));
            }
        }
        out
    }
}

pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("report json")
}
