use std::path::PathBuf;

/// Error taxonomy for the client core (spec §7). Each variant maps to a
/// caller-visible outcome and, at the CLI boundary, an exit code.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("control file unavailable: {location}")]
    ControlFileUnavailable { location: String },

    #[error("control file parse error: {reason}")]
    ControlFileParseError { reason: String },

    #[error("download incomplete: no usable URLs remain; partial data left at {part_path}")]
    DownloadIncomplete { part_path: PathBuf },

    #[error("verification failed; partial data left at {part_path}")]
    VerificationFailed { part_path: PathBuf },

    #[error("failed to move {part_path} into place at {target_path}: {reason}")]
    MoveFailed {
        part_path: PathBuf,
        target_path: PathBuf,
        reason: String,
    },

    #[error("failed to back up existing file at {target_path}: {reason}")]
    BackupFailed {
        target_path: PathBuf,
        reason: String,
    },

    #[error("relative URL '{url}' has no referrer to resolve against")]
    NoReferrerForRelativeUrl { url: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Exit code for the CLI boundary. Not part of spec.md (it leaves the
    /// table unspecified beyond "the ClientDriver outcome code"); the
    /// mapping below is this crate's decision, recorded in DESIGN.md.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::ControlFileUnavailable { .. } => 10,
            ClientError::ControlFileParseError { .. } => 11,
            ClientError::DownloadIncomplete { .. } => 12,
            ClientError::VerificationFailed { .. } => 13,
            ClientError::MoveFailed { .. } => 14,
            ClientError::BackupFailed { .. } => 15,
            ClientError::NoReferrerForRelativeUrl { .. } => 12,
            ClientError::Io(_) => 10,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
