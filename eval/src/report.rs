use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use engine::io::results::load_task_reports;
use engine::session::{SessionMetrics, TaskReport};

use crate::results::{RunMeta, read_meta};

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub metrics: SessionMetrics,
    /// Failed prerequisite → tasks it preempted.
    pub blocked: BTreeMap<String, Vec<String>>,
    /// Tasks whose sequence check failed, with the check's message.
    pub sequence_failures: Vec<(String, String)>,
    pub meta: Option<RunMeta>,
}

impl ReportSummary {
    /// Every evaluated task was correct.
    pub fn all_correct(&self) -> bool {
        self.metrics.correct == self.metrics.evaluated
    }
}

pub fn summarize(reports: &[TaskReport]) -> ReportSummary {
    let mut summary = ReportSummary {
        metrics: SessionMetrics::from_reports(reports),
        ..ReportSummary::default()
    };
    for report in reports {
        if let Some(prerequisite) = &report.blocked_by {
            summary
                .blocked
                .entry(prerequisite.clone())
                .or_default()
                .push(report.task_id.clone());
        }
        if let Some(sequence) = &report.sequence
            && !sequence.passed
        {
            summary
                .sequence_failures
                .push((report.task_id.clone(), sequence.message.clone()));
        }
    }
    summary
}

/// Aggregate every report under `out_dir`.
///
/// Unreadable reports and a missing `meta.json` become warnings.
pub fn aggregate(out_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let (reports, mut warnings) = load_task_reports(out_dir)?;
    let mut summary = summarize(&reports);
    match read_meta(out_dir) {
        Ok(meta) => summary.meta = Some(meta),
        Err(err) => warnings.push(format!("meta.json unavailable ({err:#})")),
    }
    Ok((summary, warnings))
}
