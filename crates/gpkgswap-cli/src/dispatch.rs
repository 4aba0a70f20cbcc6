use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gpkgswap_core::{Catalog, ContainerPath, ReplaceError};
use gpkgswap_driver::GpkgDriver;
use gpkgswap_engine::{
    collect_origins, default_user_prefix, find_consumers, inspect_container, list_backups,
    preview, replace_container, resolve_input, PreviewReport, PreviewSide,
    ReloadOutcome, ReloadQueue, ReplaceContext, ReplaceObserver, ReplaceOptions, ReplaceOutcome,
    ReplaceRequest, SwapConfig, SwapLayout,
};
use serde_json::{json, Value};

use crate::completion::write_completions_script;
use crate::host::ProjectFileHost;
use crate::logging::{init_logging, log_file_path};
use crate::render::{
    current_output_style, format_catalog_lines, format_comparison_lines, render_section_header,
    render_status_line, CollectingObserver, OutputStyle, TerminalObserver,
};
use crate::{Cli, Commands, ReplaceArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let style = if cli.plain {
        OutputStyle::Plain
    } else {
        current_output_style()
    };
    let layout = resolve_layout(cli.prefix)?;

    match cli.command {
        Commands::Completions { shell } => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_completions_script(shell, &mut handle)?;
        }
        Commands::Config => {
            let config = SwapConfig::load(&layout.config_path())?;
            for line in format_config_lines(&layout, &config)? {
                println!("{line}");
            }
        }
        command => {
            layout.ensure_base_dirs()?;
            let _guard = init_logging(&layout)?;
            let config = SwapConfig::load(&layout.config_path())?;
            let options = config.replace_options(&layout);
            run_logged_command(command, style, &options)?;
        }
    }

    Ok(())
}

fn resolve_layout(prefix: Option<PathBuf>) -> Result<SwapLayout> {
    let prefix = match prefix {
        Some(prefix) => prefix,
        None => default_user_prefix()?,
    };
    Ok(SwapLayout::new(prefix))
}

fn run_logged_command(command: Commands, style: OutputStyle, options: &ReplaceOptions) -> Result<()> {
    match command {
        Commands::Inspect { input, json } => {
            let catalog = inspect_input(&input, &options.scratch_root)?;
            if json {
                print_json(&json!({ "input": input, "layers": catalog }))?;
            } else {
                for line in format_catalog_lines(&catalog) {
                    println!("{line}");
                }
            }
        }
        Commands::Preview {
            origin,
            new_input,
            json,
        } => {
            let report = if json {
                let mut observer = CollectingObserver::default();
                let report = preview(
                    &GpkgDriver,
                    origin.as_deref(),
                    new_input.as_deref(),
                    &options.scratch_root,
                    &mut observer,
                );
                print_json(&preview_json(&report))?;
                report
            } else {
                let mut observer = TerminalObserver::new(style);
                let report = preview(
                    &GpkgDriver,
                    origin.as_deref(),
                    new_input.as_deref(),
                    &options.scratch_root,
                    &mut observer,
                );
                for line in format_preview_lines(&report, style) {
                    println!("{line}");
                }
                report
            };
            ensure_preview_succeeded(&report)?;
        }
        Commands::Replace(args) => {
            let options = apply_replace_overrides(options.clone(), &args);
            let mut host = match &args.project {
                Some(project) => ProjectFileHost::open(project)?,
                None => ProjectFileHost::unsaved(),
            };
            let request = ReplaceRequest::new(args.origin.clone(), args.new_input.clone());

            let outcome = if args.json {
                let mut observer = CollectingObserver::default();
                let (outcome, reloads) = execute_replace(&request, &mut host, &options, &mut observer);
                print_json(&replace_json(&outcome, &reloads, &observer))?;
                outcome
            } else {
                let mut observer = TerminalObserver::with_progress(style, "replace");
                let (outcome, _) = execute_replace(&request, &mut host, &options, &mut observer);
                observer.finish(outcome.success());
                outcome
            };
            ensure_replace_succeeded(outcome)?;
        }
        Commands::Origins { project } => {
            let host = ProjectFileHost::open(&project)?;
            let origins = collect_origins(&host);
            if origins.is_empty() {
                println!(
                    "{}",
                    render_status_line(style, "warn", "no GeoPackage layers in project")
                );
            }
            for origin in origins {
                println!("{origin}");
            }
        }
        Commands::Consumers { container, project } => {
            let host = ProjectFileHost::open(&project)?;
            let target = ContainerPath::new(&container)
                .with_context(|| format!("failed to resolve container path: {container}"))?;
            for id in find_consumers(&host, &target) {
                println!("{id}\t{}", host.layer_name(&id).unwrap_or_default());
            }
        }
        Commands::Backups { container } => {
            let backups = list_backups(&container, &options.backup_dir_name)?;
            if backups.is_empty() {
                println!(
                    "{}",
                    render_status_line(
                        style,
                        "warn",
                        &format!("no backups found for {}", container.display())
                    )
                );
            }
            for backup in backups {
                println!(
                    "{}\t{}",
                    backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                    backup.path.display()
                );
            }
        }
        Commands::Config | Commands::Completions { .. } => {}
    }
    Ok(())
}

fn inspect_input(input: &str, scratch_root: &Path) -> Result<Catalog> {
    let resolved = resolve_input(Path::new(input), scratch_root)?;
    let catalog = inspect_container(&GpkgDriver, &resolved)?;
    Ok(catalog)
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{rendered}").context("failed to write JSON output")?;
    Ok(())
}

pub(crate) fn apply_replace_overrides(mut options: ReplaceOptions, args: &ReplaceArgs) -> ReplaceOptions {
    if args.no_reload {
        options.auto_reload = false;
    }
    if args.reload {
        options.auto_reload = true;
    }
    if let Some(delay) = args.reload_delay_ms {
        options.reload_delay = Duration::from_millis(delay);
    }
    options
}

/// Runs the orchestrator, then drains the reload queue so the project is
/// reread after the configured delay.
pub(crate) fn execute_replace(
    request: &ReplaceRequest,
    host: &mut ProjectFileHost,
    options: &ReplaceOptions,
    observer: &mut dyn ReplaceObserver,
) -> (ReplaceOutcome, Vec<ReloadOutcome>) {
    let mut queue = ReloadQueue::new();
    let outcome = replace_container(
        request,
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut *host,
            scheduler: &mut queue,
            options,
        },
        &mut *observer,
    );
    let reloads = queue.run_until_idle(host, observer);
    (outcome, reloads)
}

fn ensure_replace_succeeded(outcome: ReplaceOutcome) -> Result<()> {
    match outcome.error {
        None => Ok(()),
        Some(err) => Err(anyhow::Error::new(err).context(format!(
            "replacement failed in state {}",
            outcome.state.as_str()
        ))),
    }
}

fn ensure_preview_succeeded(report: &PreviewReport) -> Result<()> {
    let failed = [&report.origin, &report.new]
        .into_iter()
        .filter(|side| matches!(side, PreviewSide::Failed(_)))
        .count();
    if failed > 0 {
        return Err(anyhow!("preview failed for {failed} input(s)"));
    }
    Ok(())
}

pub(crate) fn format_preview_lines(report: &PreviewReport, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![render_section_header(style, "Origin GeoPackage")];
    match &report.origin {
        PreviewSide::Empty => lines.push(render_status_line(style, "warn", "no origin selected")),
        PreviewSide::Failed(err) => lines.push(render_status_line(style, "err", &err.chain_message())),
        PreviewSide::Loaded { catalog, .. } => lines.extend(format_catalog_lines(catalog)),
    }

    lines.push(String::new());
    lines.push(render_section_header(style, "New GeoPackage"));
    match (&report.new, &report.comparison) {
        (PreviewSide::Empty, _) => {
            lines.push(render_status_line(style, "warn", "no new file selected"))
        }
        (PreviewSide::Failed(err), _) => {
            lines.push(render_status_line(style, "err", &err.chain_message()))
        }
        (PreviewSide::Loaded { catalog, .. }, None) => lines.extend(format_catalog_lines(catalog)),
        (PreviewSide::Loaded { .. }, Some(view)) => lines.extend(format_comparison_lines(view)),
    }
    lines
}

fn error_json(err: &ReplaceError) -> Value {
    json!({ "code": err.code(), "message": err.chain_message() })
}

fn preview_side_json(side: &PreviewSide) -> Value {
    match side {
        PreviewSide::Empty => Value::Null,
        PreviewSide::Loaded { path, catalog } => json!({
            "path": path.display().to_string(),
            "layers": catalog,
        }),
        PreviewSide::Failed(err) => json!({ "error": error_json(err) }),
    }
}

pub(crate) fn preview_json(report: &PreviewReport) -> Value {
    json!({
        "origin": preview_side_json(&report.origin),
        "new": preview_side_json(&report.new),
        "comparison": report.comparison,
    })
}

pub(crate) fn replace_json(
    outcome: &ReplaceOutcome,
    reloads: &[ReloadOutcome],
    observer: &CollectingObserver,
) -> Value {
    let operation = &outcome.operation;
    let backup = operation.backup.as_ref().map(|record| {
        json!({
            "path": record.path.display().to_string(),
            "created_at": record.created_at.to_rfc3339(),
            "sha256": record.sha256,
        })
    });
    let reloads = reloads
        .iter()
        .map(|reload| match reload {
            ReloadOutcome::Reloaded { project_path } => json!({
                "project": project_path.display().to_string(),
                "reloaded": true,
            }),
            ReloadOutcome::Failed {
                project_path,
                warning,
            } => json!({
                "project": project_path.display().to_string(),
                "reloaded": false,
                "warning": warning.to_string(),
            }),
        })
        .collect::<Vec<_>>();

    json!({
        "state": outcome.state.as_str(),
        "success": outcome.success(),
        "origin": operation.origin_path.as_ref().map(|path| path.to_string()),
        "resolved_new": operation
            .resolved_new_path
            .as_ref()
            .map(|path| path.display().to_string()),
        "consumers_detached": operation.consumers_detached,
        "backup": backup,
        "copied": operation.copied,
        "reload_scheduled": operation.reloaded,
        "reloads": reloads,
        "error": outcome.error.as_ref().map(error_json),
        "log": observer.entries,
    })
}

fn format_config_lines(layout: &SwapLayout, config: &SwapConfig) -> Result<Vec<String>> {
    let options = config.replace_options(layout);
    let mut lines = vec![
        format!("prefix: {}", layout.prefix().display()),
        format!("config: {}", layout.config_path().display()),
        format!("log: {}", log_file_path(layout).display()),
        format!("scratch: {}", options.scratch_root.display()),
        String::new(),
    ];
    lines.extend(config.to_toml_string()?.lines().map(str::to_string));
    Ok(lines)
}

