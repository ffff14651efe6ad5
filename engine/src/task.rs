//! Task descriptors as delivered by the dataset loader.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::prerequisites::parse_pre_task_for;
use crate::core::sequence::{Family, expected_order};

/// Task type marking multiple-choice questions answered with `Answer: X`.
pub const QUIZ_TASK_TYPE: &str = "quiz_question";

/// One benchmark task. The engine reads these fields and never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    #[serde(default)]
    pub task_type: Option<String>,
    /// Empty for trigger tasks.
    #[serde(default)]
    pub instruction: String,
    /// Subsystem-keyed expectation; quiz tasks may carry a bare string.
    #[serde(default = "empty_object")]
    pub ground_truth: serde_json::Value,
    /// `None` enables every subsystem.
    #[serde(default)]
    pub available_systems: Option<Vec<String>>,
    /// Comma-separated ids of tasks that depend on this one.
    #[serde(default)]
    pub pre_task_for: Option<String>,
    #[serde(default)]
    pub is_trigger: bool,
    #[serde(default)]
    pub require_time: Option<String>,
    #[serde(default = "default_true")]
    pub require_sequence: bool,
    /// Fail the task when its ground truth already holds before the agent
    /// acts.
    #[serde(default)]
    pub require_precheck: bool,
    /// Choice letter → option text for quiz tasks.
    #[serde(default)]
    pub options: Option<IndexMap<String, String>>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_true() -> bool {
    true
}

impl TaskDescriptor {
    /// Minimal descriptor with defaults for every optional field.
    pub fn new(task_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: None,
            instruction: instruction.into(),
            ground_truth: empty_object(),
            available_systems: None,
            pre_task_for: None,
            is_trigger: false,
            require_time: None,
            require_sequence: true,
            require_precheck: false,
            options: None,
        }
    }

    /// Task ids this task is a prerequisite for.
    pub fn dependents(&self) -> Vec<String> {
        self.pre_task_for
            .as_deref()
            .map(parse_pre_task_for)
            .unwrap_or_default()
    }

    pub fn is_quiz(&self) -> bool {
        self.task_type.as_deref() == Some(QUIZ_TASK_TYPE)
    }

    /// Families the ground truth requires, in key declaration order.
    pub fn expected_families(&self) -> Vec<Family> {
        match &self.ground_truth {
            serde_json::Value::Object(map) => expected_order(map.keys().map(String::as_str)),
            _ => Vec::new(),
        }
    }

    /// Expected quiz letter, from `{"answer": "B"}` or a bare `"B"`.
    pub fn expected_answer(&self) -> Option<&str> {
        let value = match &self.ground_truth {
            serde_json::Value::Object(map) => map.get("answer")?,
            other => other,
        };
        value.as_str().map(str::trim)
    }
}
