use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use gpkgswap_core::{ContainerPath, ReplaceError};
use serde::Serialize;

/// Opaque identifier of a host registry entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConsumerRef(String);

impl ConsumerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    /// Set when the backup was produced by this process and verified.
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceState {
    Idle,
    Validating,
    DetachingConsumers,
    BackingUp,
    Copying,
    Reloading,
    Done,
    Failed,
}

impl ReplaceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::DetachingConsumers => "detaching-consumers",
            Self::BackingUp => "backing-up",
            Self::Copying => "copying",
            Self::Reloading => "reloading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// The six determinate progress ticks of a replacement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStep {
    Preparing,
    Detaching,
    BackingUp,
    Copying,
    Reloading,
    Finishing,
}

impl ReplaceStep {
    pub const ALL: [ReplaceStep; 6] = [
        Self::Preparing,
        Self::Detaching,
        Self::BackingUp,
        Self::Copying,
        Self::Reloading,
        Self::Finishing,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Preparing => 0,
            Self::Detaching => 1,
            Self::BackingUp => 2,
            Self::Copying => 3,
            Self::Reloading => 4,
            Self::Finishing => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Preparing => "Preparing…",
            Self::Detaching => "Removing locked layers…",
            Self::BackingUp => "Creating backup…",
            Self::Copying => "Copying new GeoPackage…",
            Self::Reloading => "Reloading project…",
            Self::Finishing => "Finishing…",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Progress and log sink supplied by the caller.
pub trait ReplaceObserver {
    fn progress(&mut self, _step: ReplaceStep) {}

    fn log(&mut self, severity: Severity, message: &str);

    /// Checked only between steps; a copy in flight is never interrupted.
    fn cancel_requested(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ReplaceObserver for NullObserver {
    fn log(&mut self, _severity: Severity, _message: &str) {}
}

/// Transient record of one replacement run.
#[derive(Debug, Clone, Default)]
pub struct SwapOperation {
    pub origin_path: Option<ContainerPath>,
    pub resolved_new_path: Option<PathBuf>,
    pub consumers_detached: bool,
    pub backup: Option<BackupRecord>,
    pub copied: bool,
    /// True once a reload has been scheduled; the reread itself runs later.
    pub reloaded: bool,
}

#[derive(Debug)]
pub struct ReplaceOutcome {
    pub state: ReplaceState,
    pub operation: SwapOperation,
    pub error: Option<ReplaceError>,
}

impl ReplaceOutcome {
    pub fn success(&self) -> bool {
        self.state == ReplaceState::Done && self.error.is_none()
    }

    /// Present on failure too when the backup finished before the copy failed.
    pub fn backup_path(&self) -> Option<&Path> {
        self.operation
            .backup
            .as_ref()
            .map(|record| record.path.as_path())
    }
}
