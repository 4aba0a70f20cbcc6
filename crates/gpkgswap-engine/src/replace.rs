use std::path::{Path, PathBuf};

use gpkgswap_core::{
    Catalog, ComparisonView, ContainerDriver, ContainerPath, ReplaceError, Result,
};

use crate::archive::resolve_input;
use crate::config::ReplaceOptions;
use crate::consumers::{detach_consumers, find_consumers, ConsumerRegistry};
use crate::inspect::inspect_container;
use crate::reload::{schedule_reload, HostProject, ReloadScheduler};
use crate::swap::{copy_over, create_backup};
use crate::types::{
    ReplaceObserver, ReplaceOutcome, ReplaceState, ReplaceStep, Severity, SwapOperation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRequest {
    /// The container currently referenced by the host.
    pub origin: String,
    /// A `.gpkg` file or a `.zip` holding one.
    pub new_input: String,
}

impl ReplaceRequest {
    pub fn new(origin: impl Into<String>, new_input: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            new_input: new_input.into(),
        }
    }
}

/// Host services a replacement run talks to.
pub struct ReplaceContext<'a, H: ?Sized> {
    pub driver: &'a dyn ContainerDriver,
    pub host: &'a mut H,
    pub scheduler: &'a mut dyn ReloadScheduler,
    pub options: &'a ReplaceOptions,
}

struct Run<'o> {
    state: ReplaceState,
    operation: SwapOperation,
    observer: &'o mut dyn ReplaceObserver,
}

impl Run<'_> {
    fn transition(&mut self, next: ReplaceState) {
        tracing::info!(from = self.state.as_str(), to = next.as_str(), "replace state change");
        self.observer
            .log(Severity::Info, &format!("State: {}", next.as_str()));
        self.state = next;
    }

    fn tick(&mut self, step: ReplaceStep) {
        self.observer.progress(step);
    }

    fn info(&mut self, message: &str) {
        self.observer.log(Severity::Info, message);
    }

    fn ensure_not_cancelled(&self, step: ReplaceStep) -> Result<()> {
        if self.observer.cancel_requested() {
            return Err(ReplaceError::Cancelled { step: step.label() });
        }
        Ok(())
    }

    fn fail(mut self, error: ReplaceError) -> ReplaceOutcome {
        let message = error.chain_message();
        tracing::warn!(state = self.state.as_str(), error = %message, "replacement failed");
        self.observer.log(Severity::Critical, &message);
        self.state = ReplaceState::Failed;
        ReplaceOutcome {
            state: self.state,
            operation: self.operation,
            error: Some(error),
        }
    }
}

/// Replaces the origin container with the new input.
///
/// Runs `Validating → DetachingConsumers → BackingUp → Copying → Reloading →
/// Done`, stopping in `Failed` on the first fatal error. Consumer detachment
/// problems are logged and the swap continues. Blocking; run it off any UI thread.
pub fn replace_container<H>(
    request: &ReplaceRequest,
    context: ReplaceContext<'_, H>,
    observer: &mut dyn ReplaceObserver,
) -> ReplaceOutcome
where
    H: ConsumerRegistry + HostProject + ?Sized,
{
    let mut run = Run {
        state: ReplaceState::Idle,
        operation: SwapOperation::default(),
        observer,
    };
    match drive(&mut run, request, context) {
        Ok(()) => ReplaceOutcome {
            state: run.state,
            operation: run.operation,
            error: None,
        },
        Err(error) => run.fail(error),
    }
}

fn drive<H>(run: &mut Run<'_>, request: &ReplaceRequest, context: ReplaceContext<'_, H>) -> Result<()>
where
    H: ConsumerRegistry + HostProject + ?Sized,
{
    let ReplaceContext {
        driver,
        host,
        scheduler,
        options,
    } = context;

    run.tick(ReplaceStep::Preparing);
    run.transition(ReplaceState::Validating);
    let origin_raw = request.origin.trim();
    let new_raw = request.new_input.trim();
    if origin_raw.is_empty() || new_raw.is_empty() {
        return Err(ReplaceError::MissingSelection);
    }
    run.info(&format!("Starting replacement: {origin_raw} -> {new_raw}"));

    let origin = ContainerPath::with_base(origin_raw, &current_dir_or_dot());
    run.operation.origin_path = Some(origin.clone());
    let (resolved, catalog) = resolve_and_inspect(driver, Path::new(new_raw), &options.scratch_root)
        .map_err(|err| ReplaceError::invalid_new_container(new_raw, err))?;
    run.info(&format!(
        "New GeoPackage validated: {} layers ({})",
        catalog.len(),
        resolved.display()
    ));
    run.operation.resolved_new_path = Some(resolved.clone());

    run.ensure_not_cancelled(ReplaceStep::Detaching)?;
    run.transition(ReplaceState::DetachingConsumers);
    run.tick(ReplaceStep::Detaching);
    let consumers = find_consumers(&*host, &origin);
    match detach_consumers(&mut *host, &consumers) {
        Ok(true) => {
            run.operation.consumers_detached = true;
            run.info(&format!(
                "Origin GeoPackage layers temporarily removed ({}).",
                consumers.len()
            ));
        }
        Ok(false) => run.info("No layers reference the origin GeoPackage."),
        Err(err) => run.observer.log(
            Severity::Warning,
            &format!("Could not remove layers using the origin GeoPackage, continuing: {err:#}"),
        ),
    }

    run.ensure_not_cancelled(ReplaceStep::BackingUp)?;
    run.transition(ReplaceState::BackingUp);
    run.tick(ReplaceStep::BackingUp);
    let backup = create_backup(origin.as_path(), &options.backup_dir_name)?;
    let backup_display = backup
        .as_ref()
        .map(|record| record.path.display().to_string())
        .unwrap_or_else(|| "(no previous file)".to_string());
    run.info(&format!("Backup created: {backup_display}"));
    run.operation.backup = backup;

    run.transition(ReplaceState::Copying);
    run.tick(ReplaceStep::Copying);
    copy_over(&resolved, origin.as_path())?;
    run.operation.copied = true;
    run.info("New GeoPackage copied to destination.");

    run.tick(ReplaceStep::Reloading);
    if options.auto_reload {
        run.transition(ReplaceState::Reloading);
        let project_path = host.current_project_path();
        run.operation.reloaded =
            schedule_reload(project_path, options.reload_delay, scheduler, &mut *run.observer);
    } else {
        run.info("Auto-reload disabled for this operation.");
    }

    run.tick(ReplaceStep::Finishing);
    run.transition(ReplaceState::Done);
    run.observer.log(
        Severity::Success,
        &format!("Replacement completed successfully. Backup: {backup_display}"),
    );
    Ok(())
}

fn resolve_and_inspect(
    driver: &dyn ContainerDriver,
    input: &Path,
    scratch_root: &Path,
) -> Result<(PathBuf, Catalog)> {
    let resolved = resolve_input(input, scratch_root)?;
    let catalog = inspect_container(driver, &resolved)?;
    Ok((resolved, catalog))
}

fn current_dir_or_dot() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug)]
pub enum PreviewSide {
    /// Nothing selected for this side.
    Empty,
    Loaded { path: PathBuf, catalog: Catalog },
    Failed(ReplaceError),
}

impl PreviewSide {
    pub fn catalog(&self) -> Option<&Catalog> {
        match self {
            Self::Loaded { catalog, .. } => Some(catalog),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PreviewReport {
    pub origin: PreviewSide,
    pub new: PreviewSide,
    /// Present when the new side loaded; marks layers only if the origin loaded too.
    pub comparison: Option<ComparisonView>,
}

/// Inspects both sides independently; a failure on one side leaves the other intact.
pub fn preview(
    driver: &dyn ContainerDriver,
    origin: Option<&str>,
    new_input: Option<&str>,
    scratch_root: &Path,
    observer: &mut dyn ReplaceObserver,
) -> PreviewReport {
    let origin = match origin.map(str::trim).filter(|value| !value.is_empty()) {
        None => PreviewSide::Empty,
        Some(raw) => {
            let path = PathBuf::from(raw);
            match inspect_container(driver, &path) {
                Ok(catalog) => {
                    observer.log(
                        Severity::Info,
                        &format!("Origin inspected: {} layers", catalog.len()),
                    );
                    PreviewSide::Loaded { path, catalog }
                }
                Err(err) => {
                    observer.log(
                        Severity::Critical,
                        &format!("Failed to inspect origin GeoPackage: {}", err.chain_message()),
                    );
                    PreviewSide::Failed(err)
                }
            }
        }
    };

    let new = match new_input.map(str::trim).filter(|value| !value.is_empty()) {
        None => PreviewSide::Empty,
        Some(raw) => match resolve_and_inspect(driver, Path::new(raw), scratch_root) {
            Ok((path, catalog)) => {
                observer.log(
                    Severity::Info,
                    &format!("New GeoPackage inspected: {} layers", catalog.len()),
                );
                PreviewSide::Loaded { path, catalog }
            }
            Err(err) => {
                let err = ReplaceError::invalid_new_container(raw, err);
                observer.log(
                    Severity::Critical,
                    &format!("Failed to inspect new GeoPackage: {}", err.chain_message()),
                );
                PreviewSide::Failed(err)
            }
        },
    };

    let comparison = new
        .catalog()
        .map(|catalog| ComparisonView::build(catalog, origin.catalog()));

    PreviewReport {
        origin,
        new,
        comparison,
    }
}
