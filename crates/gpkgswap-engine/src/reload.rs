use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use gpkgswap_core::ReplaceError;

use crate::types::{ReplaceObserver, Severity};

/// The host application's project.
pub trait HostProject {
    /// `None` when the project has never been saved.
    fn current_project_path(&self) -> Option<PathBuf>;

    /// Rebuilds the project state from `path`; `false` when the host could not.
    fn reread(&mut self, path: &Path) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub project_path: PathBuf,
    pub delay: Duration,
}

/// Deferral hook on the host's own event mechanism. `schedule` must return
/// without running the reload.
pub trait ReloadScheduler {
    fn schedule(&mut self, request: ReloadRequest);
}

/// Asks the host to reread its project after `delay`.
///
/// Returns whether a reload was scheduled; without a project path it only
/// logs a warning.
pub fn schedule_reload(
    project_path: Option<PathBuf>,
    delay: Duration,
    scheduler: &mut dyn ReloadScheduler,
    observer: &mut dyn ReplaceObserver,
) -> bool {
    let Some(project_path) = project_path.filter(|path| !path.as_os_str().is_empty()) else {
        observer.log(
            Severity::Warning,
            "Project has no file path; nothing to reload.",
        );
        return false;
    };

    observer.log(
        Severity::Info,
        &format!(
            "Project reload scheduled in {} ms: {}",
            delay.as_millis(),
            project_path.display()
        ),
    );
    scheduler.schedule(ReloadRequest {
        project_path,
        delay,
    });
    true
}

#[derive(Debug)]
pub enum ReloadOutcome {
    Reloaded { project_path: PathBuf },
    Failed { project_path: PathBuf, warning: ReplaceError },
}

impl ReloadOutcome {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Self::Reloaded { .. })
    }
}

/// A single-threaded timer queue for hosts without an event loop of their own.
#[derive(Debug, Default)]
pub struct ReloadQueue {
    pending: VecDeque<(Instant, PathBuf)>,
}

impl ReloadScheduler for ReloadQueue {
    fn schedule(&mut self, request: ReloadRequest) {
        let due = Instant::now() + request.delay;
        let position = self
            .pending
            .iter()
            .position(|(existing, _)| *existing > due)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, (due, request.project_path));
    }
}

impl ReloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|(due, _)| *due)
    }

    /// Runs every reload due at `now`, in deadline order.
    pub fn run_due<H>(
        &mut self,
        now: Instant,
        host: &mut H,
        observer: &mut dyn ReplaceObserver,
    ) -> Vec<ReloadOutcome>
    where
        H: HostProject + ?Sized,
    {
        let mut outcomes = Vec::new();
        while self.next_deadline().is_some_and(|due| due <= now) {
            let Some((_, project_path)) = self.pending.pop_front() else {
                break;
            };
            outcomes.push(run_reload(project_path, host, observer));
        }
        outcomes
    }

    /// Sleeps until each pending reload is due and runs it.
    pub fn run_until_idle<H>(
        &mut self,
        host: &mut H,
        observer: &mut dyn ReplaceObserver,
    ) -> Vec<ReloadOutcome>
    where
        H: HostProject + ?Sized,
    {
        let mut outcomes = Vec::new();
        while let Some(due) = self.next_deadline() {
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
            outcomes.extend(self.run_due(Instant::now(), host, observer));
        }
        outcomes
    }
}

fn run_reload<H>(
    project_path: PathBuf,
    host: &mut H,
    observer: &mut dyn ReplaceObserver,
) -> ReloadOutcome
where
    H: HostProject + ?Sized,
{
    if host.reread(&project_path) {
        observer.log(
            Severity::Info,
            &format!("Project reloaded from: {}", project_path.display()),
        );
        tracing::info!(project = %project_path.display(), "project reloaded");
        return ReloadOutcome::Reloaded { project_path };
    }

    let warning = ReplaceError::ReloadWarning(format!(
        "could not reload project from file: {}",
        project_path.display()
    ));
    observer.log(Severity::Warning, &warning.to_string());
    tracing::warn!(project = %project_path.display(), "project reload failed");
    ReloadOutcome::Failed {
        project_path,
        warning,
    }
}
