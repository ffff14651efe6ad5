//! Run-level artifacts written next to the per-task reports.
//!
//! Layout of an output directory:
//! - `tasks/<task_id>.json`: one report per task (see `engine::io::results`)
//! - `checkpoint.json`: session state for `--resume`
//! - `ledger.json`: operations the simulated world accepted
//! - `meta.json`: inputs and timing of the most recent run

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::world::LedgerEntry;

pub const META_FILE: &str = "meta.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const LEDGER_FILE: &str = "ledger.json";

/// Metadata for a replay run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunMeta {
    pub dataset: String,
    /// SHA-256 of the dataset file, for reproducibility tracking.
    pub dataset_hash: String,
    pub transcripts: String,
    pub transcripts_hash: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    /// Tasks run by this invocation (resumed tasks are not counted).
    pub tasks_run: usize,
    pub resumed: bool,
}

/// Inputs of a run, hashed when the run starts.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub dataset: PathBuf,
    pub dataset_hash: String,
    pub transcripts: PathBuf,
    pub transcripts_hash: String,
}

impl RunInputs {
    pub fn hash(dataset: &Path, transcripts: &Path) -> Result<Self> {
        Ok(Self {
            dataset: dataset.to_path_buf(),
            dataset_hash: file_sha256(dataset)?,
            transcripts: transcripts.to_path_buf(),
            transcripts_hash: file_sha256(transcripts)?,
        })
    }

    pub fn into_meta(
        self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        tasks_run: usize,
        resumed: bool,
    ) -> RunMeta {
        let duration = finished_at - started_at;
        RunMeta {
            dataset: self.dataset.display().to_string(),
            dataset_hash: self.dataset_hash,
            transcripts: self.transcripts.display().to_string(),
            transcripts_hash: self.transcripts_hash,
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            tasks_run,
            resumed,
        }
    }
}

pub fn write_meta(out_dir: &Path, meta: &RunMeta) -> Result<()> {
    write_json(&out_dir.join(META_FILE), meta, "meta")
}

pub fn read_meta(out_dir: &Path) -> Result<RunMeta> {
    let path = out_dir.join(META_FILE);
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse meta")
}

/// Ledger left in `out_dir`, empty when there is none.
pub fn read_ledger(out_dir: &Path) -> Result<Vec<LedgerEntry>> {
    let path = out_dir.join(LEDGER_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse ledger")
}

/// Append this run's ledger to any ledger left by an earlier run.
pub fn append_ledger(out_dir: &Path, entries: &[LedgerEntry]) -> Result<()> {
    let path = out_dir.join(LEDGER_FILE);
    let mut ledger = read_ledger(out_dir)?;
    ledger.extend_from_slice(entries);
    write_json(&path, &ledger, "ledger")?;
    debug!(entries = ledger.len(), "ledger written");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T, label: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let contents =
        serde_json::to_string_pretty(value).with_context(|| format!("serialize {label}"))?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {label} {}", path.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}
