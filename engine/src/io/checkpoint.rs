//! Session checkpoints for resuming an interrupted run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::session::SessionState;

/// Load a checkpoint, or `None` when no checkpoint exists yet.
pub fn load_checkpoint(path: &Path) -> Result<Option<SessionState>> {
    if !path.exists() {
        debug!(path = %path.display(), "no checkpoint");
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read checkpoint {}", path.display()))?;
    let state: SessionState = serde_json::from_str(&contents)
        .with_context(|| format!("parse checkpoint {}", path.display()))?;
    debug!(
        completed = state.completed_tasks.len(),
        failed_prerequisites = state.failed_prerequisites.len(),
        "checkpoint loaded"
    );
    Ok(Some(state))
}

/// Atomically write a checkpoint (temp file + rename).
pub fn write_checkpoint(path: &Path, state: &SessionState) -> Result<()> {
    debug!(path = %path.display(), completed = state.completed_tasks.len(), "writing checkpoint");
    let mut buf = serde_json::to_string_pretty(state).context("serialize checkpoint")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
