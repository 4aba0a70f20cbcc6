use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use chrono::{DateTime, Local};
use gpkgswap_core::{Catalog, ComparisonView, LayerEntry};
use gpkgswap_engine::{ReplaceObserver, ReplaceStep, Severity};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal())
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "INFO",
        Severity::Success => "OK",
        Severity::Warning => "WARN",
        Severity::Critical => "ERR",
    }
}

fn severity_style(severity: Severity) -> Style {
    let color = match severity {
        Severity::Info => AnsiColor::BrightBlue,
        Severity::Success => AnsiColor::BrightGreen,
        Severity::Warning => AnsiColor::BrightYellow,
        Severity::Critical => AnsiColor::BrightRed,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

/// `HH:MM:SS [WARN] message`
pub(crate) fn format_log_line(
    style: OutputStyle,
    at: &DateTime<Local>,
    severity: Severity,
    message: &str,
) -> String {
    let badge = format!("[{}]", severity_label(severity));
    let badge = match style {
        OutputStyle::Plain => badge,
        OutputStyle::Rich => colorize(severity_style(severity), &badge),
    };
    format!("{} {badge} {message}", at.format("%H:%M:%S"))
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{title}:"),
        OutputStyle::Rich => colorize(section_style(), &format!("== {title} ==")),
    }
}

const CATALOG_HEADERS: [&str; 4] = ["Layer", "Features", "Geometry", "SRID"];
const EXISTS_HEADER: &str = "Exists in origin?";

fn layer_cells(entry: &LayerEntry) -> Vec<String> {
    vec![
        entry.name.clone(),
        entry.record_count.to_string(),
        entry.geometry_kind.clone(),
        entry.spatial_ref_id.clone(),
    ]
}

fn empty_row(columns: usize) -> Vec<String> {
    let mut row = vec!["(empty)".to_string()];
    row.extend((1..columns).map(|_| "-".to_string()));
    row
}

pub(crate) fn format_catalog_lines(catalog: &Catalog) -> Vec<String> {
    let rows = if catalog.is_empty() {
        vec![empty_row(CATALOG_HEADERS.len())]
    } else {
        catalog
            .sorted_for_display()
            .into_iter()
            .map(layer_cells)
            .collect()
    };
    render_table(&CATALOG_HEADERS, &rows)
}

/// The new-side table; the "Exists in origin?" column only appears when the
/// origin catalog was available.
pub(crate) fn format_comparison_lines(view: &ComparisonView) -> Vec<String> {
    let mut headers = CATALOG_HEADERS.to_vec();
    if view.origin_known {
        headers.push(EXISTS_HEADER);
    }
    let rows = if view.layers.is_empty() {
        vec![empty_row(headers.len())]
    } else {
        view.layers
            .iter()
            .map(|layer| {
                let mut cells = layer_cells(&layer.entry);
                if view.origin_known {
                    let exists = if layer.exists_in_origin { "Yes" } else { "No" };
                    cells.push(exists.to_string());
                }
                cells
            })
            .collect()
    };
    render_table(&headers, &rows)
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>();
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(headers, &widths));
    lines.push(format_row(&rule, &widths));
    for row in rows {
        lines.push(format_row(row, &widths));
    }
    lines
}

fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

pub(crate) struct TerminalProgress {
    label: String,
    total: u64,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalProgress {
    pub(crate) fn start(style: OutputStyle, label: &str, total: u64) -> Self {
        let progress_bar = if style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<24} [{bar:20.cyan/blue}] {pos:>1}/{len:1} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        Self {
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }

    fn set(&mut self, current: u64, message: &str) {
        self.current = current.min(self.total);
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(self.current);
            progress_bar.set_message(message.to_string());
        }
    }

    fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.println(line),
            None => println!("{line}"),
        }
    }

    fn finish(mut self, success: bool) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        if success {
            println!(
                "{} {}/{} steps complete in {}",
                self.label,
                self.current,
                self.total,
                format_elapsed(self.started_at.elapsed())
            );
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

/// Prints each log-sink message with a timestamp and drives a progress bar.
pub(crate) struct TerminalObserver {
    style: OutputStyle,
    progress: Option<TerminalProgress>,
}

impl TerminalObserver {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self {
            style,
            progress: None,
        }
    }

    pub(crate) fn with_progress(style: OutputStyle, label: &str) -> Self {
        Self {
            style,
            progress: Some(TerminalProgress::start(
                style,
                label,
                ReplaceStep::ALL.len() as u64,
            )),
        }
    }

    pub(crate) fn finish(&mut self, success: bool) {
        if let Some(progress) = self.progress.take() {
            progress.finish(success);
        }
    }
}

impl ReplaceObserver for TerminalObserver {
    fn progress(&mut self, step: ReplaceStep) {
        if let Some(progress) = &mut self.progress {
            progress.set(step.index() as u64 + 1, step.label());
        }
    }

    fn log(&mut self, severity: Severity, message: &str) {
        let line = format_log_line(self.style, &Local::now(), severity, message);
        match &self.progress {
            Some(progress) => progress.println(&line),
            None => println!("{line}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LogEntry {
    pub(crate) time: String,
    pub(crate) severity: &'static str,
    pub(crate) message: String,
}

/// Buffers log-sink messages for structured output.
#[derive(Debug, Default)]
pub(crate) struct CollectingObserver {
    pub(crate) steps: Vec<ReplaceStep>,
    pub(crate) entries: Vec<LogEntry>,
}

impl ReplaceObserver for CollectingObserver {
    fn progress(&mut self, step: ReplaceStep) {
        self.steps.push(step);
    }

    fn log(&mut self, severity: Severity, message: &str) {
        self.entries.push(LogEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            severity: severity.as_str(),
            message: message.to_string(),
        });
    }
}
