//! Shared deterministic types for engine core logic.
//!
//! These types define stable contracts between the parser, dispatcher,
//! recorder and evaluation flow. They carry no I/O and serialize to stable
//! snake_case JSON for result artifacts.

use serde::{Deserialize, Serialize};

/// Status of a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    /// The operation ran but was refused (bad input, not permitted, domain rule).
    Failure,
}

/// Why a dispatch did not succeed.
///
/// Kinds are reported as data so callers and tests can tell a scoping
/// rejection apart from a syntax or argument problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The action-call text could not be decoded.
    Decode,
    /// The operation's subsystem is not enabled for the task, or the
    /// operation does not exist.
    NotAvailable,
    /// Arguments do not satisfy the operation's parameter contract.
    Argument,
    /// The subsystem collaborator reported a domain failure.
    Subsystem,
}

/// Uniform result returned by every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    /// Observation text returned to the agent.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: None,
            error_kind: None,
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(message)
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failure,
            message: message.into(),
            data: None,
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// One dispatched action as seen by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Seconds since the recorder was created; non-decreasing within a task.
    pub timestamp: f64,
    /// Operation prefix before the first `.`, or `unknown`.
    pub subsystem: String,
    pub success: bool,
    /// Raw action-call text as emitted by the agent.
    pub action: String,
    /// Observation returned for the action.
    pub message: String,
}

/// Evaluation outcome for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Correct,
    Incorrect,
    /// Not evaluated (trigger tasks) or not decidable by the evaluator.
    Unknown,
}

/// Terminal state of one task in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The agent finished within the round budget and the task was evaluated.
    Executed,
    /// The round budget ran out before the agent finished.
    Incomplete,
    /// A failed prerequisite forced the task incorrect; no actions ran.
    PreemptedByPrerequisiteFailure,
    /// World-advancing task with no instruction; never evaluated.
    Trigger,
}

impl TaskStatus {
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Executed => "executed",
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::PreemptedByPrerequisiteFailure => "preempted_by_prerequisite_failure",
            TaskStatus::Trigger => "trigger",
        }
    }
}
