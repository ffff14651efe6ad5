//! Replay judge: scores a task from the evidence the engine recorded.
//!
//! Quiz tasks compare the submitted letter with `ground_truth.answer`.
//! Other tasks must be finished, and every family named by the ground truth
//! must have been touched by at least one successful action.
//!
//! Prechecks read the ledger of earlier tasks: a ground-truth component that
//! some earlier accepted operation already satisfies is a finding.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use engine::core::sequence::{Family, record_family};
use engine::core::types::TaskOutcome;
use engine::session::{Evaluator, PrecheckFinding, TaskEvidence};
use engine::task::TaskDescriptor;

use crate::world::{Ledger, LedgerEntry};

#[derive(Debug, Default)]
pub struct ReplayJudge {
    ledger: Ledger,
}

impl ReplayJudge {
    /// Judge whose prechecks read `ledger`.
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }
}

impl Evaluator for ReplayJudge {
    fn evaluate(&mut self, evidence: &TaskEvidence<'_>) -> Result<TaskOutcome> {
        let task = evidence.task;
        if task.is_quiz() {
            return Ok(judge_quiz(evidence));
        }
        if evidence.finish.is_none() {
            debug!(task_id = %task.task_id, "not finished");
            return Ok(TaskOutcome::Incorrect);
        }

        let touched = touched_families(evidence);
        let missing: Vec<Family> = task
            .expected_families()
            .into_iter()
            .filter(|family| !touched.contains(family))
            .collect();
        if missing.is_empty() {
            Ok(TaskOutcome::Correct)
        } else {
            debug!(task_id = %task.task_id, missing = ?missing, "families not touched");
            Ok(TaskOutcome::Incorrect)
        }
    }

    fn precheck(&mut self, task: &TaskDescriptor) -> Result<Vec<PrecheckFinding>> {
        let ledger = self.ledger.borrow();
        let truth = &task.ground_truth;
        let mut findings = Vec::new();

        let recipient = str_at(truth, &["email_sent", "recipient"])
            .or_else(|| str_at(truth, &["recipient"]));
        if let Some(recipient) = recipient
            && let Some(latest) = latest(&ledger, "email.send_email")
            && str_at(&latest.args, &["recipient"]) == Some(recipient)
        {
            findings.push(finding(
                "email_sent",
                format!("latest email already went to {recipient}"),
            ));
        }

        if let Some(expected) = truth.get("reservation_made")
            && let Some(entry) = first_match(&ledger, "reservation.make_booking", |args| {
                fields_match(expected, args, &["item_name", "location_id"])
            })
        {
            findings.push(finding(
                "reservation_made",
                format!("booking already made by {}", entry.task_id),
            ));
        }

        if let Some(expected) = truth.get("calendar_event")
            && let Some(entry) = first_match(&ledger, "calendar.add_event", |args| {
                calendar_matches(expected, args)
            })
        {
            findings.push(finding(
                "calendar_event",
                format!("event already added by {}", entry.task_id),
            ));
        }

        if let Some(code) = str_at(truth, &["course_selected", "course_code"])
            && let Some(entry) = first_match(&ledger, "draft.add_course", |args| {
                str_at(args, &["section_id"]).is_some_and(|section| section.starts_with(code))
            })
        {
            findings.push(finding(
                "course_selected",
                format!("{code} already in the draft from {}", entry.task_id),
            ));
        }

        if let Some(building) = str_at(truth, &["location_reached", "current_location"])
            && let Some(latest) = latest(&ledger, "geography.set_location")
            && str_at(&latest.args, &["building_id"]) == Some(building)
        {
            findings.push(finding("location_reached", format!("already at {building}")));
        }

        Ok(findings)
    }
}

fn finding(component: &str, description: String) -> PrecheckFinding {
    PrecheckFinding {
        component: component.to_string(),
        description,
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |value, key| value.get(key))
        .and_then(Value::as_str)
}

fn latest<'a>(ledger: &'a [LedgerEntry], operation: &str) -> Option<&'a LedgerEntry> {
    ledger.iter().rev().find(|entry| entry.operation == operation)
}

fn first_match<'a>(
    ledger: &'a [LedgerEntry],
    operation: &str,
    matches: impl Fn(&Value) -> bool,
) -> Option<&'a LedgerEntry> {
    ledger
        .iter()
        .find(|entry| entry.operation == operation && matches(&entry.args))
}

/// Every listed field the ground truth names equals the recorded argument.
fn fields_agree(expected: &Value, args: &Value, fields: &[&str]) -> bool {
    fields.iter().all(|&field| match str_at(expected, &[field]) {
        Some(want) => str_at(args, &[field]) == Some(want),
        None => true,
    })
}

/// Like [`fields_agree`], but the ground truth must name at least one field.
fn fields_match(expected: &Value, args: &Value, fields: &[&str]) -> bool {
    fields.iter().any(|&field| str_at(expected, &[field]).is_some())
        && fields_agree(expected, args, fields)
}

fn calendar_matches(expected: &Value, args: &Value) -> bool {
    let Some(fragment) = str_at(expected, &["event_title_contains"]) else {
        return fields_match(expected, args, &["time", "location"]);
    };
    let title = str_at(args, &["event_title"]).unwrap_or_default().to_lowercase();
    title.contains(&fragment.to_lowercase()) && fields_agree(expected, args, &["time", "location"])
}
