use std::path::PathBuf;

use thiserror::Error;

/// Reasons an archive extraction is aborted.
///
/// Every variant is fatal for the whole extraction. Files written before the
/// failing entry stay on disk; the caller removes the output directory.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Symlink entries are not allowed: '{entry}'")]
    SymlinkEntryRejected { entry: String },

    #[error(
        "Path traversal detected: entry '{entry}' resolved path escapes output directory ({})",
        .resolved.display()
    )]
    PathTraversalDetected { entry: String, resolved: PathBuf },

    #[error("Archive exceeds maximum decompressed size of {limit} bytes")]
    ArchiveTooLarge { limit: u64 },

    #[error("Entry '{entry}' exceeds maximum decompressed size of {limit} bytes")]
    EntryTooLarge { entry: String, limit: u64 },

    #[error("Archive has {count} entries, more than the allowed {limit}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("Invalid entry name: {0:?}")]
    InvalidEntryName(String),

    #[error("Entry '{entry}' is not under the root folder '{root}'")]
    EntryOutsideRoot { entry: String, root: String },

    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub(crate) fn traversal(entry: &str, resolved: impl Into<PathBuf>) -> Self {
        Self::PathTraversalDetected {
            entry: entry.to_string(),
            resolved: resolved.into(),
        }
    }

    /// True for the rejections raised by the security checks, as opposed to
    /// malformed input or I/O failures.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            Self::SymlinkEntryRejected { .. }
                | Self::PathTraversalDetected { .. }
                | Self::ArchiveTooLarge { .. }
                | Self::EntryTooLarge { .. }
                | Self::TooManyEntries { .. }
        )
    }
}
