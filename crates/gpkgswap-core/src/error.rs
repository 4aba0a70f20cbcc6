//! Failure taxonomy shared by every replacement component.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ReplaceError>;

#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    /// The origin or the new input was not selected.
    #[error("select both the origin container and the new file")]
    MissingSelection,

    #[error("file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    /// The driver could not open the file as a container.
    #[error("could not open container: {}", path.display())]
    UnreadableContainer {
        path: PathBuf,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Resolution or inspection of the new input failed.
    #[error("invalid new container '{input}'")]
    InvalidNewContainer {
        input: String,
        #[source]
        source: Box<ReplaceError>,
    },

    #[error("archive contains no .gpkg entry: {}", archive.display())]
    NoContainerInArchive { archive: PathBuf },

    #[error("unsupported file format, select a .zip or .gpkg: {}", input.display())]
    UnsupportedInputFormat { input: PathBuf },

    #[error("failed to read archive {}: {message}", archive.display())]
    ArchiveRead {
        archive: PathBuf,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The backup could not be completed; the destination was not modified.
    #[error("backup of {} failed: {message}", destination.display())]
    BackupFailed {
        destination: PathBuf,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The final copy could not be completed; any backup stays on disk.
    #[error("copying {} to {} failed", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Non-fatal: the host could not reread its project.
    #[error("reload warning: {0}")]
    ReloadWarning(String),

    #[error("replacement cancelled before {step}")]
    Cancelled { step: &'static str },
}

impl ReplaceError {
    pub fn unreadable(path: impl Into<PathBuf>) -> Self {
        Self::UnreadableContainer {
            path: path.into(),
            source: None,
        }
    }

    pub fn backup_failed(
        destination: impl Into<PathBuf>,
        message: impl Into<String>,
        source: Option<io::Error>,
    ) -> Self {
        Self::BackupFailed {
            destination: destination.into(),
            message: message.into(),
            source,
        }
    }

    pub fn invalid_new_container(input: impl Into<String>, source: ReplaceError) -> Self {
        Self::InvalidNewContainer {
            input: input.into(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSelection => "missing-selection",
            Self::NotFound { .. } => "not-found",
            Self::UnreadableContainer { .. } => "unreadable-container",
            Self::InvalidNewContainer { .. } => "invalid-new-container",
            Self::NoContainerInArchive { .. } => "no-container-in-archive",
            Self::UnsupportedInputFormat { .. } => "unsupported-input-format",
            Self::ArchiveRead { .. } => "archive-read",
            Self::BackupFailed { .. } => "backup-failed",
            Self::CopyFailed { .. } => "copy-failed",
            Self::ReloadWarning(_) => "reload-warning",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// This error followed by each of its causes, joined with `: `.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReloadWarning(_))
    }
}
