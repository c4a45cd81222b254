use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal to a pass: the backups root itself could not be enumerated.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("backups root {} is unreadable: {source}", root.display())]
    RootUnreadable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("backups root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Record retrieval failures. A pass degrades to ReviewNeeded on any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("ITSM rejected the credentials (HTTP {status})")]
    Auth { status: u16 },
    #[error("ITSM request {url} failed with HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },
    #[error("ITSM transport error: {0}")]
    Transport(String),
    #[error("could not decode ITSM response: {0}")]
    Decode(String),
    #[error("could not read records file {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("record fetch did not finish within {0}s")]
    TimedOut(u64),
    #[error("record fetch is not configured: {0}")]
    Config(String),
    #[error("record fetch stopped without producing a result")]
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorCode {
    E101InvalidName,
    E102NotFound,
    E103NotStaged,
    E104RestoreConflict,
    E105NotActionable,
    E106Filesystem,
    E107ProtectedPath,
}

impl ActionErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E101InvalidName => "E101_INVALID_NAME",
            Self::E102NotFound => "E102_NOT_FOUND",
            Self::E103NotStaged => "E103_NOT_STAGED",
            Self::E104RestoreConflict => "E104_RESTORE_CONFLICT",
            Self::E105NotActionable => "E105_NOT_ACTIONABLE",
            Self::E106Filesystem => "E106_FILESYSTEM",
            Self::E107ProtectedPath => "E107_PROTECTED_PATH",
        }
    }
}

/// A single Stage/Delete/Restore attempt failed. The ledger entry stays as it
/// was so the operator can retry or skip.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid folder name {folder:?}: {reason}")]
    InvalidName { folder: String, reason: &'static str },
    #[error("{folder}: not found in {}", location.display())]
    NotFound { folder: String, location: PathBuf },
    #[error("{folder}: not in the staging root (only staged folders can be deleted)")]
    NotStaged { folder: String },
    #[error("{folder}: the backups root already has a folder with this name")]
    RestoreConflict { folder: String },
    #[error("{folder}: effective action is {action}, nothing to stage")]
    NotActionable { folder: String, action: &'static str },
    #[error("{folder}: {op} failed: {source}")]
    Filesystem {
        folder: String,
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{folder}: {} holds the backups root, refusing to remove it", target.display())]
    ProtectedPath { folder: String, target: PathBuf },
}

impl ActionError {
    pub fn folder(&self) -> &str {
        match self {
            Self::InvalidName { folder, .. }
            | Self::NotFound { folder, .. }
            | Self::NotStaged { folder }
            | Self::RestoreConflict { folder }
            | Self::NotActionable { folder, .. }
            | Self::Filesystem { folder, .. }
            | Self::ProtectedPath { folder, .. } => folder,
        }
    }

    pub fn code(&self) -> ActionErrorCode {
        match self {
            Self::InvalidName { .. } => ActionErrorCode::E101InvalidName,
            Self::NotFound { .. } => ActionErrorCode::E102NotFound,
            Self::NotStaged { .. } => ActionErrorCode::E103NotStaged,
            Self::RestoreConflict { .. } => ActionErrorCode::E104RestoreConflict,
            Self::NotActionable { .. } => ActionErrorCode::E105NotActionable,
            Self::Filesystem { .. } => ActionErrorCode::E106Filesystem,
            Self::ProtectedPath { .. } => ActionErrorCode::E107ProtectedPath,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log write failed: {0}")]
    Io(#[from] io::Error),
    #[error("audit record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("no ledger entry for folder {0:?}")]
    UnknownFolder(String),
}
