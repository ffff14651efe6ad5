//! Replay orchestration.
//!
//! Loads the dataset and transcripts, drives each task through an
//! [`EvaluationSession`], and persists a report and checkpoint after every
//! task so an interrupted run can continue with `--resume`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use engine::io::checkpoint::{load_checkpoint, write_checkpoint};
use engine::io::config::{EngineConfig, load_config};
use engine::io::dataset::load_dataset;
use engine::io::results::write_task_report;
use engine::session::EvaluationSession;

use crate::judge::ReplayJudge;
use crate::report::{ReportSummary, aggregate};
use crate::results::{
    CHECKPOINT_FILE, LEDGER_FILE, META_FILE, RunInputs, append_ledger, read_ledger, write_meta,
};
use crate::world::{LedgerFactory, ReplayAgent, load_transcripts};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dataset: PathBuf,
    pub transcripts: PathBuf,
    pub config: Option<PathBuf>,
    pub out: PathBuf,
    pub resume: bool,
}

/// What a replay run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub tasks_run: usize,
    pub resumed: bool,
    /// Summary over every report in the output directory, including tasks
    /// completed by an earlier run.
    pub summary: ReportSummary,
    pub warnings: Vec<String>,
}

#[instrument(skip_all, fields(dataset = %options.dataset.display(), out = %options.out.display()))]
pub fn run_replay(options: &RunOptions) -> Result<RunOutcome> {
    let config = match &options.config {
        Some(path) => load_config(path).context("load config")?,
        None => EngineConfig::default(),
    };
    let tasks = load_dataset(&options.dataset).context("load dataset")?;
    let transcripts = load_transcripts(&options.transcripts).context("load transcripts")?;
    let inputs = RunInputs::hash(&options.dataset, &options.transcripts)?;

    let checkpoint_path = options.out.join(CHECKPOINT_FILE);
    let state = if options.resume {
        load_checkpoint(&checkpoint_path)?
    } else {
        clear_previous_run(&options.out)?;
        None
    };
    let resumed = state.is_some();
    let (mut session, mut factory) = match state {
        Some(state) => {
            info!(completed = state.completed_tasks.len(), "resuming session");
            let ledger = read_ledger(&options.out)?;
            (
                EvaluationSession::resume(config, state),
                LedgerFactory::resume(ledger),
            )
        }
        None => (EvaluationSession::new(config), LedgerFactory::new()),
    };

    let mut agent = ReplayAgent::new(&transcripts);
    let mut judge = ReplayJudge::new(factory.ledger());

    let started_at = Utc::now();
    let mut tasks_run = 0;
    for task in &tasks {
        if session.is_completed(&task.task_id) {
            debug!(task_id = %task.task_id, "completed in an earlier run");
            continue;
        }
        let transcript = transcripts.get(&task.task_id);
        if transcript.is_none() && !task.is_trigger {
            warn!(task_id = %task.task_id, "no transcript for task");
        }
        factory.begin_task(&task.task_id, transcript);

        let report = session
            .run_task(task, &mut agent, &mut factory, &mut judge)
            .with_context(|| format!("run task {}", task.task_id))?;
        write_task_report(&options.out, &report)?;
        append_ledger(&options.out, &factory.unflushed_entries())?;
        write_checkpoint(&checkpoint_path, session.state())?;
        tasks_run += 1;
    }
    let finished_at = Utc::now();

    write_meta(
        &options.out,
        &inputs.into_meta(started_at, finished_at, tasks_run, resumed),
    )?;
    let (summary, warnings) = aggregate(&options.out)?;
    info!(
        tasks_run,
        evaluated = summary.metrics.evaluated,
        correct = summary.metrics.correct,
        "replay finished"
    );
    Ok(RunOutcome {
        tasks_run,
        resumed,
        summary,
        warnings,
    })
}

/// Remove artifacts of an earlier run so reports from different runs never
/// mix. Only report files are removed from `tasks/`; anything else there is
/// left alone.
fn clear_previous_run(out_dir: &Path) -> Result<()> {
    let tasks_dir = out_dir.join("tasks");
    if tasks_dir.is_dir() {
        let entries =
            fs::read_dir(&tasks_dir).with_context(|| format!("read {}", tasks_dir.display()))?;
        for entry in entries {
            let path = entry.with_context(|| format!("read {}", tasks_dir.display()))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            }
        }
    }
    for name in [CHECKPOINT_FILE, LEDGER_FILE, META_FILE] {
        let path = out_dir.join(name);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    Ok(())
}
