//! Append-only log of dispatched actions for one task.

use std::time::Instant;

use crate::core::types::{ActionRecord, ToolResult};

/// Subsystem id used when an action names no `subsystem.` prefix.
pub const UNKNOWN_SUBSYSTEM: &str = "unknown";

/// Subsystem prefix of raw action text: the text before `(`, then before
/// the first `.`.
pub fn subsystem_of(action_text: &str) -> &str {
    let head = action_text
        .split_once('(')
        .map_or(action_text, |(head, _)| head)
        .trim();
    match head.split_once('.') {
        Some((subsystem, _)) if !subsystem.is_empty() => subsystem,
        _ => UNKNOWN_SUBSYSTEM,
    }
}

/// Records every dispatch of a task in call order.
#[derive(Debug, Clone)]
pub struct ExecutionRecorder {
    started: Instant,
    records: Vec<ActionRecord>,
}

impl Default for ExecutionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, action_text: &str, result: &ToolResult) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let timestamp = self
            .records
            .last()
            .map_or(elapsed, |last| last.timestamp.max(elapsed));
        self.records.push(ActionRecord {
            timestamp,
            subsystem: subsystem_of(action_text).to_string(),
            success: result.is_success(),
            action: action_text.to_string(),
            message: result.message.clone(),
        });
    }

    pub fn history(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn into_history(self) -> Vec<ActionRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
