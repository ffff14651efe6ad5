//! Session-level tests for the task lifecycle.
//!
//! These tests drive `EvaluationSession` over several tasks with scripted
//! agents and recording subsystems to verify dispatch gating, sequence
//! validation, prerequisite propagation, round budgets and resume.

use engine::core::catalog::SubsystemId;
use engine::core::decode::Value;
use engine::core::directive::FinishReason;
use engine::core::sequence::{Family, SequenceViolation};
use engine::core::types::{TaskOutcome, TaskStatus};
use engine::io::checkpoint::{load_checkpoint, write_checkpoint};
use engine::io::config::EngineConfig;
use engine::session::{EvaluationSession, INVALID_FORMAT_MESSAGE, SessionMetrics, TaskReport};
use engine::task::TaskDescriptor;
use engine::test_support::{
    FixedEvaluator, RecordingFactory, ScriptedAgent, prerequisite, scratch_dir, task, trigger,
    with_systems,
};

fn run_all(
    session: &mut EvaluationSession,
    tasks: &[TaskDescriptor],
    agent: &mut ScriptedAgent,
    factory: &mut RecordingFactory,
    evaluator: &mut FixedEvaluator,
) -> Vec<TaskReport> {
    session
        .run_tasks(tasks, agent, factory, evaluator, |_, _| Ok(()))
        .expect("run tasks")
}

/// A prerequisite failure preempts every declared dependent, however late
/// it runs, and leaves unrelated tasks alone.
///
/// Order: P (fails, pre_task_for="D1,D2") → D3 → D1 → filler → D2.
/// D1 and D2 never reach the agent; D3 and filler run normally.
#[test]
fn failed_prerequisite_preempts_dependents_only() {
    let tasks = vec![
        prerequisite("P", "D1, D2"),
        task("D3", "unrelated"),
        task("D1", "depends on P"),
        task("filler", "something else"),
        task("D2", "also depends on P"),
    ];
    let mut agent = ScriptedAgent::new()
        .script("P", &["Action: finish()"])
        .script("D3", &["Action: finish()"])
        .script("D1", &["Action: draft.view()", "Action: finish()"])
        .script("filler", &["Action: finish()"])
        .script("D2", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct).with("P", TaskOutcome::Incorrect);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert_eq!(reports[0].outcome, TaskOutcome::Incorrect);
    assert_eq!(reports[0].affects_downstream, vec!["D1", "D2"]);

    for (index, id) in [(2, "D1"), (4, "D2")] {
        let report = &reports[index];
        assert_eq!(report.task_id, id);
        assert_eq!(report.status, TaskStatus::PreemptedByPrerequisiteFailure);
        assert_eq!(report.outcome, TaskOutcome::Incorrect);
        assert_eq!(report.blocked_by.as_deref(), Some("P"));
        assert!(report.turns.is_empty() && report.history.is_empty());
        assert!(agent.observations_for(id).is_empty(), "{id} reached the agent");
    }

    assert_eq!(reports[1].status, TaskStatus::Executed);
    assert_eq!(reports[1].outcome, TaskOutcome::Correct);
    assert_eq!(reports[3].outcome, TaskOutcome::Correct);
    assert_eq!(evaluator.evaluated, vec!["P", "D3", "filler"]);
    assert!(factory.calls().is_empty());
}

/// A passing prerequisite blocks nothing.
#[test]
fn passing_prerequisite_blocks_nothing() {
    let tasks = vec![prerequisite("P", "D1"), task("D1", "x")];
    let mut agent = ScriptedAgent::new()
        .script("P", &["Action: finish()"])
        .script("D1", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert!(session.failures().is_empty());
    assert_eq!(reports[1].status, TaskStatus::Executed);
    assert!(reports[0].affects_downstream.is_empty());
}

/// Preemption cascades: a preempted task that is itself a prerequisite
/// blocks its own dependents.
#[test]
fn preemption_cascades_through_chains() {
    let tasks = vec![
        prerequisite("A", "B"),
        prerequisite("B", "C"),
        task("C", "leaf"),
    ];
    let mut agent = ScriptedAgent::new().script("A", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Incorrect);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert_eq!(reports[1].blocked_by.as_deref(), Some("A"));
    assert_eq!(reports[1].affects_downstream, vec!["C"]);
    assert_eq!(reports[2].blocked_by.as_deref(), Some("B"));
}

/// A task whose ground truth already holds before the agent acts still
/// runs, is reported incorrect without consulting the evaluator, and
/// preempts its dependents. Tasks without the flag are never prechecked.
#[test]
fn satisfied_precheck_fails_task_and_blocks_dependents() {
    let mut checked = prerequisite("P", "D1");
    checked.require_precheck = true;
    let tasks = vec![checked, task("D1", "depends on P"), task("free", "no precheck")];
    let mut agent = ScriptedAgent::new()
        .script("P", &["Action: email.view_inbox()", "Action: finish()"])
        .script("D1", &["Action: finish()"])
        .script("free", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct)
        .satisfied_before("P", "email_sent")
        .satisfied_before("free", "email_sent");
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert_eq!(reports[0].status, TaskStatus::Executed);
    assert_eq!(reports[0].outcome, TaskOutcome::Incorrect);
    assert_eq!(reports[0].evaluator_outcome, None);
    assert_eq!(reports[0].precheck_failures.len(), 1);
    assert_eq!(reports[0].precheck_failures[0].component, "email_sent");
    assert_eq!(reports[0].rounds, 2);
    assert_eq!(reports[0].affects_downstream, vec!["D1"]);
    assert_eq!(reports[1].status, TaskStatus::PreemptedByPrerequisiteFailure);
    assert_eq!(reports[1].blocked_by.as_deref(), Some("P"));
    assert_eq!(reports[2].outcome, TaskOutcome::Correct);
    assert!(reports[2].precheck_failures.is_empty());

    assert_eq!(evaluator.prechecked, vec!["P"]);
    assert_eq!(evaluator.evaluated, vec!["free"]);

    let metrics = SessionMetrics::from_reports(&reports);
    assert_eq!(metrics.precheck_failed, 1);
    assert_eq!(metrics.incorrect, 2);
}

/// Trigger tasks skip the agent and the evaluator entirely.
#[test]
fn trigger_tasks_are_not_evaluated() {
    let tasks = vec![trigger("tick")];
    let mut agent = ScriptedAgent::new();
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert_eq!(reports[0].status, TaskStatus::Trigger);
    assert_eq!(reports[0].outcome, TaskOutcome::Unknown);
    assert!(agent.observations.is_empty());
    assert!(evaluator.evaluated.is_empty());
    assert!(session.is_completed("tick"));
}

/// Actions reach only the enabled subsystems; disabled ones are rejected as
/// not available and recorded as failed touches.
#[test]
fn dispatch_is_gated_by_available_systems() {
    let tasks = vec![with_systems(task("T", "send a mail"), &["email"])];
    let mut agent = ScriptedAgent::new().script(
        "T",
        &[
            r#"Action: calendar.add_event(calendar_id="self", event_title="x", location="y", time="z")"#,
            r#"<action>Action: email.send_email(to="advisor@campus.edu", subject="Hi", body="Office hours?")</action>"#,
            "Action: finish()",
        ],
    );
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);
    let report = &reports[0];

    assert_eq!(factory.created, vec![SubsystemId::Email]);
    let calls = factory.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "send_email");
    assert_eq!(
        calls[0].args.get("recipient"),
        Some(&Value::Str("advisor@campus.edu".to_string()))
    );

    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history[0].subsystem, "calendar");
    assert!(!report.history[0].success);
    assert!(report.history[1].success);

    let observations = agent.observations_for("T");
    assert!(observations[1].starts_with("System 'calendar' is not available for this task."));
    assert_eq!(observations[2], "email.send_email ok");
    assert_eq!(
        report.finish.as_ref().map(|finish| finish.reason),
        Some(FinishReason::Normal)
    );
    assert_eq!(report.outcome, TaskOutcome::Correct);
}

/// Invalid replies consume rounds; running out of rounds leaves the task
/// incomplete but still evaluated.
#[test]
fn exhausted_round_budget_is_incomplete_but_evaluated() {
    let tasks = vec![task("T", "do something")];
    let mut agent = ScriptedAgent::new().script("T", &["hmm", "Action: draft.view()", "still thinking"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Incorrect);
    let config = EngineConfig {
        max_rounds: 3,
        ..EngineConfig::default()
    };
    let mut session = EvaluationSession::new(config);

    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);
    let report = &reports[0];

    assert_eq!(report.status, TaskStatus::Incomplete);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.turns.len(), 3);
    assert_eq!(report.turns[0].observation.as_deref(), Some(INVALID_FORMAT_MESSAGE));
    assert_eq!(evaluator.evaluated, vec!["T"]);
    assert_eq!(report.outcome, TaskOutcome::Incorrect);
}

/// The first observation carries the task time; later ones are tool output.
#[test]
fn first_observation_includes_time() {
    let mut timed = task("T", "Reserve a seat.");
    timed.require_time = Some("Week 2, Tuesday 10:00".to_string());
    let mut agent = ScriptedAgent::new().script("T", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    session
        .run_task(&timed, &mut agent, &mut factory, &mut evaluator)
        .expect("run");

    assert_eq!(
        agent.observations_for("T"),
        vec!["Current time: Week 2, Tuesday 10:00\nReserve a seat."]
    );
}

fn ordered_task(id: &str) -> TaskDescriptor {
    let mut task = task(id, "book, mail, then schedule");
    task.ground_truth = serde_json::json!({
        "reservation_made": {"location_id": "L1"},
        "email_sent": {"recipient": "a@b.edu"},
        "calendar_event": {"event_title": "Study"}
    });
    task
}

const RESERVE: &str = r#"Action: reservation.make_booking(location_id="L1", item_name="Seat", date="Week 1, Monday", time_slot="10:00-12:00")"#;
const MAIL: &str = r#"Action: email.send_email(recipient="a@b.edu", subject="s", body="b")"#;
const SCHEDULE: &str = r#"Action: calendar.add_event(calendar_id="self", event_title="Study", location="Library", time="Week 1, Monday, 10:00-12:00")"#;

/// Out-of-order first touches make an otherwise correct task incorrect.
#[test]
fn sequence_violation_overrides_evaluator() {
    let mut agent = ScriptedAgent::new()
        .script("good", &[RESERVE, MAIL, RESERVE, SCHEDULE, "Action: finish()"])
        .script("bad", &[MAIL, RESERVE, SCHEDULE, "Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let tasks = vec![ordered_task("good"), ordered_task("bad")];
    let reports = run_all(&mut session, &tasks, &mut agent, &mut factory, &mut evaluator);

    assert_eq!(reports[0].outcome, TaskOutcome::Correct);
    let bad = &reports[1];
    assert_eq!(bad.evaluator_outcome, Some(TaskOutcome::Correct));
    assert_eq!(bad.outcome, TaskOutcome::Incorrect);
    let sequence = bad.sequence.as_ref().expect("sequence verdict");
    assert!(matches!(
        sequence.violation,
        Some(SequenceViolation::OutOfOrder { position: 1, .. })
    ));
}

/// With enforcement off, the verdict is reported but does not change the
/// outcome.
#[test]
fn sequence_enforcement_can_be_disabled() {
    let mut agent = ScriptedAgent::new().script("bad", &[MAIL, RESERVE, SCHEDULE, "Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let config = EngineConfig {
        enforce_sequence: false,
        ..EngineConfig::default()
    };
    let mut session = EvaluationSession::new(config);

    let report = session
        .run_task(&ordered_task("bad"), &mut agent, &mut factory, &mut evaluator)
        .expect("run");

    assert_eq!(report.outcome, TaskOutcome::Correct);
    assert!(!report.sequence.as_ref().expect("verdict").passed);
}

/// Failed dispatches are not touches: a refused booking leaves the
/// reservation family missing.
#[test]
fn refused_operations_do_not_satisfy_sequence() {
    let mut agent = ScriptedAgent::new().script("T", &[RESERVE, MAIL, SCHEDULE, "Action: finish()"]);
    let mut factory = RecordingFactory::new().failing(&["reservation.make_booking"]);
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let report = session
        .run_task(&ordered_task("T"), &mut agent, &mut factory, &mut evaluator)
        .expect("run");

    assert_eq!(report.outcome, TaskOutcome::Incorrect);
    assert_eq!(
        report.sequence.as_ref().and_then(|verdict| verdict.violation.clone()),
        Some(SequenceViolation::Missing {
            family: Family::Reservation
        })
    );
    let observations = agent.observations_for("T");
    assert_eq!(observations[1], "reservation.make_booking refused");
}

/// Quiz answers finish the task with the normalised answer line.
#[test]
fn quiz_answer_finishes_task() {
    let mut quiz = task("Q", "Which building? A) Library B) Gym");
    quiz.task_type = Some("quiz_question".to_string());
    let mut agent = ScriptedAgent::new().script("Q", &["I think it is the gym.\nAnswer: b"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let report = session
        .run_task(&quiz, &mut agent, &mut factory, &mut evaluator)
        .expect("run");

    let finish = report.finish.expect("finished");
    assert_eq!(finish.reason, FinishReason::QuizAnswer);
    assert_eq!(finish.content.as_deref(), Some("Answer: B"));
    assert_eq!(report.status, TaskStatus::Executed);
}

/// Argument problems are surfaced as observations naming the parameter.
#[test]
fn argument_errors_are_observations() {
    let mut agent = ScriptedAgent::new().script(
        "T",
        &["Action: draft.assign_pass(section_id=\"X(1)\")", "Action: finish()"],
    );
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let report = session
        .run_task(&task("T", "x"), &mut agent, &mut factory, &mut evaluator)
        .expect("run");

    assert!(!report.history[0].success);
    assert!(report.history[0].message.contains("`pass_type`"));
    assert!(factory.calls().is_empty());
}

/// Agent failures abort the task with context instead of being scored.
#[test]
fn agent_errors_propagate() {
    let mut agent = ScriptedAgent::new().failing_on("T");
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let mut session = EvaluationSession::new(EngineConfig::default());

    let err = session
        .run_task(&task("T", "x"), &mut agent, &mut factory, &mut evaluator)
        .expect_err("agent failure");
    assert!(format!("{err:#}").contains("agent reply for task T round 1"));
    assert!(!session.is_completed("T"));
}

/// A checkpointed session resumes with its prerequisite failures intact and
/// skips tasks it already completed.
#[test]
fn resumed_session_keeps_failures_and_skips_completed() {
    let dir = scratch_dir();
    let checkpoint = dir.path().join("checkpoint.json");
    let tasks = vec![prerequisite("P", "D"), task("other", "x"), task("D", "y")];

    let mut agent = ScriptedAgent::new().script("P", &["Action: finish()"]);
    let mut factory = RecordingFactory::new();
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Incorrect);
    let mut first = EvaluationSession::new(EngineConfig::default());
    first
        .run_tasks(&tasks[..1], &mut agent, &mut factory, &mut evaluator, |session, _| {
            write_checkpoint(&checkpoint, session.state())
        })
        .expect("first half");

    let state = load_checkpoint(&checkpoint).expect("load").expect("present");
    let mut resumed = EvaluationSession::resume(EngineConfig::default(), state);
    let mut agent = ScriptedAgent::new().script("other", &["Action: finish()"]);
    let mut evaluator = FixedEvaluator::new(TaskOutcome::Correct);
    let reports = run_all(&mut resumed, &tasks, &mut agent, &mut factory, &mut evaluator);

    let ids: Vec<&str> = reports.iter().map(|report| report.task_id.as_str()).collect();
    assert_eq!(ids, ["other", "D"]);
    assert_eq!(reports[1].status, TaskStatus::PreemptedByPrerequisiteFailure);
    assert_eq!(reports[1].blocked_by.as_deref(), Some("P"));
}
