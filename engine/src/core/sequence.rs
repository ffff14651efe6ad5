//! Execution-order validation for multi-subsystem tasks.
//!
//! Ground-truth keys and recorded subsystem identifiers are both reduced to a
//! [`Family`]. Only the first successful touch of each family matters; repeats
//! and interleavings after that point are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::ActionRecord;

/// Coarse subsystem grouping used for ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Email,
    Calendar,
    Reservation,
    Geography,
    Map,
    Course,
    Information,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Email => "email",
            Family::Calendar => "calendar",
            Family::Reservation => "reservation",
            Family::Geography => "geography",
            Family::Map => "map",
            Family::Course => "course",
            Family::Information => "information",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family implied by a ground-truth key, judged by its first `_` segment.
///
/// Keys such as `answer` carry no ordering constraint and map to `None`.
pub fn ground_truth_family(key: &str) -> Option<Family> {
    let head = key.split('_').next().unwrap_or(key);
    match head {
        "email" => Some(Family::Email),
        "reservation" => Some(Family::Reservation),
        "calendar" => Some(Family::Calendar),
        "location" | "walk" => Some(Family::Geography),
        "course" => Some(Family::Course),
        _ => None,
    }
}

/// Family a recorded subsystem identifier belongs to.
pub fn record_family(subsystem: &str) -> Option<Family> {
    match subsystem {
        "email" => Some(Family::Email),
        "calendar" => Some(Family::Calendar),
        "reservation" => Some(Family::Reservation),
        "geography" => Some(Family::Geography),
        "map" => Some(Family::Map),
        "draft" | "registration" | "course_selection" => Some(Family::Course),
        "bibliography" | "data_system" => Some(Family::Information),
        _ => None,
    }
}

/// Ordered, de-duplicated families implied by ground-truth keys in
/// declaration order.
pub fn expected_order<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<Family> {
    let mut order = Vec::new();
    for family in keys.into_iter().filter_map(ground_truth_family) {
        if !order.contains(&family) {
            order.push(family);
        }
    }
    order
}

/// Why a sequence check failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceViolation {
    /// A required family was never touched successfully.
    Missing { family: Family },
    /// First touches diverge from the required order at `position` (1-based).
    OutOfOrder {
        position: usize,
        expected: Family,
        observed: Family,
    },
}

impl fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceViolation::Missing { family } => {
                write!(f, "Missing execution of {family} system")
            }
            SequenceViolation::OutOfOrder {
                position,
                expected,
                observed,
            } => write!(
                f,
                "Wrong execution order: expected {expected} at position {position}, but got {observed}"
            ),
        }
    }
}

/// Result of validating one task's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceVerdict {
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<SequenceViolation>,
}

impl SequenceVerdict {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            violation: None,
        }
    }

    fn fail(violation: SequenceViolation) -> Self {
        Self {
            passed: false,
            message: violation.to_string(),
            violation: Some(violation),
        }
    }

    /// Verdict for tasks that opt out of ordering checks.
    pub fn not_required() -> Self {
        Self::pass("Sequence validation not required")
    }
}

/// Validate that successful first touches follow `order`.
pub fn validate_sequence(history: &[ActionRecord], order: &[Family]) -> SequenceVerdict {
    if order.len() <= 1 {
        return SequenceVerdict::pass("No sequence validation required");
    }

    let mut observed: Vec<Family> = Vec::new();
    for family in history
        .iter()
        .filter(|record| record.success)
        .filter_map(|record| record_family(&record.subsystem))
    {
        if order.contains(&family) && !observed.contains(&family) {
            observed.push(family);
        }
    }

    if let Some(&family) = order.iter().find(|family| !observed.contains(*family)) {
        return SequenceVerdict::fail(SequenceViolation::Missing { family });
    }

    for (index, (&expected, &actual)) in order.iter().zip(&observed).enumerate() {
        if expected != actual {
            return SequenceVerdict::fail(SequenceViolation::OutOfOrder {
                position: index + 1,
                expected,
                observed: actual,
            });
        }
    }

    let path: Vec<&str> = observed.iter().map(|family| family.as_str()).collect();
    SequenceVerdict::pass(format!("Execution sequence is correct: {}", path.join(" -> ")))
}
