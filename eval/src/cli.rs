//! CLI command implementations.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use engine::core::decode::decode_action_call;
use engine::core::directive::{ParsedDirective, parse_directive};
use engine::exit_codes;

use crate::report::{ReportSummary, aggregate};
use crate::run::{RunOptions, run_replay};

/// Replay transcripts against the dataset and print a summary.
pub fn run(options: &RunOptions) -> Result<i32> {
    let outcome = run_replay(options)?;
    println!(
        "run: tasks_run={} resumed={} results={}",
        outcome.tasks_run,
        outcome.resumed,
        options.out.display()
    );
    print_summary(&outcome.summary);
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(exit_code(&outcome.summary))
}

/// Parse agent text from stdin and print the directive as JSON.
pub fn parse_stdin() -> Result<i32> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read stdin")?;
    let rendered = serde_json::to_string_pretty(&describe(&input)).context("serialize")?;
    println!("{rendered}");
    Ok(exit_codes::OK)
}

/// Show aggregated results for an output directory.
pub fn report(out_dir: &Path) -> Result<i32> {
    let (summary, warnings) = aggregate(out_dir)?;
    if let Some(meta) = &summary.meta {
        println!(
            "report: dataset={} hash={} duration_secs={:.2}",
            meta.dataset, meta.dataset_hash, meta.duration_secs
        );
    }
    print_summary(&summary);
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(exit_code(&summary))
}

/// Directive plus, for an execute, the decoded call or the decode error.
fn describe(input: &str) -> serde_json::Value {
    let directive = parse_directive(input);
    let mut described = json!({ "directive": directive });
    if let ParsedDirective::Execute { content } = &directive {
        match decode_action_call(content) {
            Ok(call) => described["call"] = json!(call),
            Err(err) => described["call_error"] = json!(err.to_string()),
        }
    }
    described
}

fn print_summary(summary: &ReportSummary) {
    let metrics = &summary.metrics;
    println!(
        "report: tasks={} evaluated={} triggers={}",
        metrics.total, metrics.evaluated, metrics.triggers
    );
    println!(
        "report: correct={} incorrect={} unknown={} incomplete={} preempted={}",
        metrics.correct, metrics.incorrect, metrics.unknown, metrics.incomplete, metrics.preempted
    );
    if metrics.precheck_failed > 0 {
        println!("report: precheck_failed={}", metrics.precheck_failed);
    }
    println!("report: accuracy={:.4}", metrics.accuracy);
    for (prerequisite, blocked) in &summary.blocked {
        println!("report: {prerequisite} blocked {}", blocked.join(", "));
    }
    for (task_id, message) in &summary.sequence_failures {
        println!("report: sequence {task_id}: {message}");
    }
}

fn exit_code(summary: &ReportSummary) -> i32 {
    if summary.all_correct() {
        exit_codes::OK
    } else {
        exit_codes::TASKS_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_decoded_call() {
        let described =
            describe("Action: email.send_email(to=\"a@b.edu\", subject=\"Hi\", body=\"x\")");
        assert_eq!(described["directive"]["directive"], "execute");
        assert_eq!(described["call"]["operation"], "email.send_email");
        assert_eq!(described["call"]["args"]["to"], "a@b.edu");
    }

    #[test]
    fn describe_reports_decode_errors() {
        let described = describe("Action: email.send_email(to=\"unterminated)");
        assert_eq!(described["directive"]["directive"], "execute");
        assert!(described.get("call").is_none());
        assert!(described["call_error"].is_string());
    }

    #[test]
    fn describe_finish_and_invalid() {
        let finish = describe("Answer: b");
        assert_eq!(finish["directive"]["directive"], "finish");
        assert_eq!(finish["directive"]["reason"], "quiz_answer");
        assert_eq!(finish["directive"]["content"], "Answer: B");

        let invalid = describe("I am not sure.");
        assert_eq!(invalid["directive"]["directive"], "invalid");
        assert!(invalid.get("call").is_none());
    }
}
