//! Per-task report artifacts.
//!
//! Each finished task is written to `<dir>/tasks/<task_id>.json`. Reports
//! are product output: they are always written, independent of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::session::TaskReport;

const TASKS_DIR: &str = "tasks";

/// Path of the report file for `task_id` under `dir`.
///
/// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`, so distinct ids
/// always get distinct files.
pub fn report_path(dir: &Path, task_id: &str) -> PathBuf {
    let mut file_stem = String::with_capacity(task_id.len());
    for byte in task_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            file_stem.push(char::from(byte));
        } else {
            file_stem.push_str(&format!("%{byte:02X}"));
        }
    }
    dir.join(TASKS_DIR).join(format!("{file_stem}.json"))
}

pub fn write_task_report(dir: &Path, report: &TaskReport) -> Result<PathBuf> {
    let path = report_path(dir, &report.task_id);
    let mut buf = serde_json::to_string_pretty(report).context("serialize task report")?;
    buf.push('\n');
    super::write_atomic(&path, &buf)?;
    debug!(path = %path.display(), "task report written");
    Ok(path)
}

/// Load every report under `dir`, sorted by file name.
///
/// Unreadable files are skipped and described in the returned warnings.
pub fn load_task_reports(dir: &Path) -> Result<(Vec<TaskReport>, Vec<String>)> {
    let tasks_dir = dir.join(TASKS_DIR);
    if !tasks_dir.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut paths = Vec::new();
    for entry in
        fs::read_dir(&tasks_dir).with_context(|| format!("read {}", tasks_dir.display()))?
    {
        let path = entry.context("read entry")?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut reports = Vec::with_capacity(paths.len());
    let mut warnings = Vec::new();
    for path in paths {
        match fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse task report"))
        {
            Ok(report) => reports.push(report),
            Err(err) => warnings.push(format!("skip {}: {err:#}", path.display())),
        }
    }
    Ok((reports, warnings))
}
