//! Session orchestration: the per-task turn loop and prerequisite
//! propagation across tasks.
//!
//! Tasks run one at a time in dataset order. Each task gets its own
//! [`CapabilityRegistry`] and [`ExecutionRecorder`]; the only state shared
//! across tasks is the [`SessionState`] owned by [`EvaluationSession`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::directive::{FinishReason, ParsedDirective, parse_directive};
use crate::core::prerequisites::PrerequisiteFailureMap;
use crate::core::sequence::{SequenceVerdict, validate_sequence};
use crate::core::types::{ActionRecord, TaskOutcome, TaskStatus};
use crate::io::config::EngineConfig;
use crate::recorder::ExecutionRecorder;
use crate::registry::{CapabilityRegistry, SubsystemFactory};
use crate::task::TaskDescriptor;

/// Observation sent back when a reply carries no recognisable directive.
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid action format. Reply with a line \
`Action: subsystem.operation(name=\"value\")`, `Action: finish()` or `Answer: <letter>`.";

/// The model under test.
pub trait Agent {
    /// Reply to the latest observation for `task`.
    fn respond(&mut self, task: &TaskDescriptor, observation: &str) -> Result<String>;
}

/// Judges the world state a task left behind.
pub trait Evaluator {
    fn evaluate(&mut self, evidence: &TaskEvidence<'_>) -> Result<TaskOutcome>;

    /// Ground-truth conditions that already hold before the agent acts.
    ///
    /// Called only for tasks with `require_precheck`; any finding makes the
    /// task incorrect.
    fn precheck(&mut self, _task: &TaskDescriptor) -> Result<Vec<PrecheckFinding>> {
        Ok(Vec::new())
    }
}

/// A ground-truth condition found satisfied before the task ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckFinding {
    /// Ground-truth key that already holds, e.g. `email_sent`.
    pub component: String,
    pub description: String,
}

/// How the agent ended a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishSignal {
    pub reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Everything an [`Evaluator`] may look at.
#[derive(Debug, Clone, Copy)]
pub struct TaskEvidence<'a> {
    pub task: &'a TaskDescriptor,
    pub status: TaskStatus,
    pub history: &'a [ActionRecord],
    pub finish: Option<&'a FinishSignal>,
    pub sequence: &'a SequenceVerdict,
}

/// One agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub round: u32,
    pub reply: String,
    pub directive: ParsedDirective,
    /// Observation returned to the agent; absent on the finishing turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// Final result of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    pub status: TaskStatus,
    pub outcome: TaskOutcome,
    /// Outcome reported by the evaluator before the sequence verdict applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_outcome: Option<TaskOutcome>,
    #[serde(default)]
    pub rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<FinishSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceVerdict>,
    /// Failed prerequisite that forced this task incorrect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    /// Dependents this task blocked by failing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affects_downstream: Vec<String>,
    /// Ground-truth conditions that held before the agent acted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precheck_failures: Vec<PrecheckFinding>,
    #[serde(default)]
    pub history: Vec<ActionRecord>,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
}

impl TaskReport {
    /// Report with no run details attached.
    pub fn new(task: &TaskDescriptor, status: TaskStatus, outcome: TaskOutcome) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type.clone(),
            status,
            outcome,
            evaluator_outcome: None,
            rounds: 0,
            finish: None,
            sequence: None,
            blocked_by: None,
            affects_downstream: Vec::new(),
            precheck_failures: Vec::new(),
            history: Vec::new(),
            turns: Vec::new(),
        }
    }

    fn with_run(mut self, run: TaskRun) -> Self {
        self.rounds = run.rounds;
        self.finish = run.finish;
        self.history = run.history;
        self.turns = run.turns;
        self
    }
}

/// Session state that survives across tasks and can be checkpointed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub failed_prerequisites: PrerequisiteFailureMap,
    #[serde(default)]
    pub completed_tasks: Vec<String>,
}

/// Owns session-scoped state and drives tasks through the engine.
#[derive(Debug, Clone)]
pub struct EvaluationSession {
    config: EngineConfig,
    state: SessionState,
}

impl EvaluationSession {
    pub fn new(config: EngineConfig) -> Self {
        Self::resume(config, SessionState::default())
    }

    /// Continue a session from previously saved state.
    pub fn resume(config: EngineConfig, state: SessionState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn failures(&self) -> &PrerequisiteFailureMap {
        &self.state.failed_prerequisites
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.state.completed_tasks.iter().any(|id| id == task_id)
    }

    /// Run one task to its terminal state.
    ///
    /// Trigger tasks are reported without evaluation. Tasks blocked by a
    /// failed prerequisite are preempted before any action runs. Tasks whose
    /// precheck finds the ground truth already satisfied still run, but are
    /// reported incorrect without consulting the evaluator. Errors are
    /// returned only for agent failures; dispatch problems are observations.
    #[instrument(skip_all, fields(task_id = %task.task_id))]
    pub fn run_task<A, F, E>(
        &mut self,
        task: &TaskDescriptor,
        agent: &mut A,
        factory: &mut F,
        evaluator: &mut E,
    ) -> Result<TaskReport>
    where
        A: Agent + ?Sized,
        F: SubsystemFactory + ?Sized,
        E: Evaluator + ?Sized,
    {
        let report = if task.is_trigger {
            info!("trigger task, skipping evaluation");
            TaskReport::new(task, TaskStatus::Trigger, TaskOutcome::Unknown)
        } else if let Some(prerequisite) = self.blocking_prerequisite(task) {
            preempted(task, prerequisite, TaskRun::default())
        } else {
            let precheck = run_precheck(task, evaluator);
            let run = run_actions(task, &self.config, agent, factory)?;
            self.evaluate(task, run, precheck, evaluator)
        };

        let report = self.register_outcome(task, report);
        self.state.completed_tasks.push(task.task_id.clone());
        Ok(report)
    }

    /// Run `tasks` in order, skipping ones already completed in this session.
    ///
    /// `on_report` sees each report as soon as its task finishes.
    pub fn run_tasks<A, F, E>(
        &mut self,
        tasks: &[TaskDescriptor],
        agent: &mut A,
        factory: &mut F,
        evaluator: &mut E,
        mut on_report: impl FnMut(&Self, &TaskReport) -> Result<()>,
    ) -> Result<Vec<TaskReport>>
    where
        A: Agent + ?Sized,
        F: SubsystemFactory + ?Sized,
        E: Evaluator + ?Sized,
    {
        let mut reports = Vec::new();
        for task in tasks {
            if self.is_completed(&task.task_id) {
                debug!(task_id = %task.task_id, "already completed, skipping");
                continue;
            }
            let report = self.run_task(task, agent, factory, evaluator)?;
            on_report(self, &report)?;
            reports.push(report);
        }
        Ok(reports)
    }

    fn blocking_prerequisite(&self, task: &TaskDescriptor) -> Option<String> {
        self.state
            .failed_prerequisites
            .blocking_prerequisite(&task.task_id)
            .map(str::to_string)
    }

    fn evaluate<E: Evaluator + ?Sized>(
        &self,
        task: &TaskDescriptor,
        run: TaskRun,
        precheck: Vec<PrecheckFinding>,
        evaluator: &mut E,
    ) -> TaskReport {
        let status = if run.finish.is_some() {
            TaskStatus::Executed
        } else {
            TaskStatus::Incomplete
        };
        if !precheck.is_empty() {
            info!(status = status.label(), "incorrect: ground truth held before the task ran");
            let mut report = TaskReport::new(task, status, TaskOutcome::Incorrect).with_run(run);
            report.precheck_failures = precheck;
            return report;
        }
        let sequence = if task.require_sequence {
            validate_sequence(&run.history, &task.expected_families())
        } else {
            SequenceVerdict::not_required()
        };
        if !sequence.passed {
            info!(message = %sequence.message, "sequence validation failed");
        }

        let evidence = TaskEvidence {
            task,
            status,
            history: &run.history,
            finish: run.finish.as_ref(),
            sequence: &sequence,
        };
        let evaluator_outcome = evaluator.evaluate(&evidence).unwrap_or_else(|err| {
            warn!("evaluator failed: {err:#}");
            TaskOutcome::Unknown
        });

        let sequence_ok = sequence.passed || !self.config.enforce_sequence;
        let outcome = match evaluator_outcome {
            TaskOutcome::Correct if sequence_ok => TaskOutcome::Correct,
            TaskOutcome::Correct | TaskOutcome::Incorrect => TaskOutcome::Incorrect,
            TaskOutcome::Unknown => TaskOutcome::Unknown,
        };
        info!(status = status.label(), outcome = ?outcome, "task evaluated");

        let mut report = TaskReport::new(task, status, outcome).with_run(run);
        report.evaluator_outcome = Some(evaluator_outcome);
        report.sequence = Some(sequence);
        report
    }

    /// Record an incorrect task's dependents as blocked.
    fn register_outcome(&mut self, task: &TaskDescriptor, mut report: TaskReport) -> TaskReport {
        if report.outcome != TaskOutcome::Incorrect {
            return report;
        }
        let dependents = task.dependents();
        if dependents.is_empty() {
            return report;
        }
        self.state
            .failed_prerequisites
            .register_failure(&task.task_id, &dependents);
        info!(
            dependents = %dependents.join(", "),
            "prerequisite failed, blocking dependents"
        );
        report.affects_downstream = dependents;
        report
    }
}

#[derive(Debug, Default)]
struct TaskRun {
    rounds: u32,
    finish: Option<FinishSignal>,
    history: Vec<ActionRecord>,
    turns: Vec<TurnRecord>,
}

fn run_precheck<E: Evaluator + ?Sized>(
    task: &TaskDescriptor,
    evaluator: &mut E,
) -> Vec<PrecheckFinding> {
    if !task.require_precheck {
        return Vec::new();
    }
    match evaluator.precheck(task) {
        Ok(findings) => {
            for finding in &findings {
                info!(component = %finding.component, "{}", finding.description);
            }
            findings
        }
        Err(err) => {
            warn!("precheck failed: {err:#}");
            Vec::new()
        }
    }
}

fn preempted(task: &TaskDescriptor, prerequisite: String, run: TaskRun) -> TaskReport {
    info!(prerequisite = %prerequisite, "preempted by failed prerequisite");
    let mut report = TaskReport::new(
        task,
        TaskStatus::PreemptedByPrerequisiteFailure,
        TaskOutcome::Incorrect,
    )
    .with_run(run);
    report.blocked_by = Some(prerequisite);
    report
}

/// First observation: the instruction, prefixed with the task time.
pub fn initial_observation(task: &TaskDescriptor) -> String {
    match task.require_time.as_deref().map(str::trim) {
        Some(time) if !time.is_empty() => format!("Current time: {time}\n{}", task.instruction),
        _ => task.instruction.clone(),
    }
}

fn run_actions<A, F>(
    task: &TaskDescriptor,
    config: &EngineConfig,
    agent: &mut A,
    factory: &mut F,
) -> Result<TaskRun>
where
    A: Agent + ?Sized,
    F: SubsystemFactory + ?Sized,
{
    let mut registry = CapabilityRegistry::new(task.available_systems.as_deref(), factory)
        .with_operation_listing(config.list_operations_on_rejection);
    let mut recorder = ExecutionRecorder::new();
    let mut run = TaskRun::default();
    let mut observation = initial_observation(task);

    for round in 1..=config.max_rounds {
        run.rounds = round;
        let reply = agent
            .respond(task, &observation)
            .with_context(|| format!("agent reply for task {} round {round}", task.task_id))?;
        let directive = parse_directive(&reply);

        let next = match &directive {
            ParsedDirective::Execute { content } => {
                let result = registry.execute(content);
                recorder.record(content, &result);
                debug!(round, success = result.is_success(), "action executed");
                Some(result.message)
            }
            ParsedDirective::Finish { content, reason } => {
                run.finish = Some(FinishSignal {
                    reason: *reason,
                    content: content.clone(),
                });
                None
            }
            ParsedDirective::Invalid { .. } => {
                debug!(round, "invalid directive");
                Some(INVALID_FORMAT_MESSAGE.to_string())
            }
        };

        run.turns.push(TurnRecord {
            round,
            reply,
            directive,
            observation: next.clone(),
        });
        match next {
            Some(text) => observation = text,
            None => break,
        }
    }

    if run.finish.is_none() {
        warn!(rounds = run.rounds, "round budget exhausted");
    }
    run.history = recorder.into_history();
    Ok(run)
}

/// Aggregate counts over task reports. Trigger tasks are excluded from
/// accuracy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total: usize,
    pub triggers: usize,
    pub evaluated: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unknown: usize,
    pub incomplete: usize,
    pub preempted: usize,
    /// Tasks failed because their ground truth held before they ran.
    pub precheck_failed: usize,
    pub accuracy: f64,
}

impl SessionMetrics {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a TaskReport>) -> Self {
        let mut metrics = Self::default();
        for report in reports {
            metrics.total += 1;
            match report.status {
                TaskStatus::Trigger => {
                    metrics.triggers += 1;
                    continue;
                }
                TaskStatus::Incomplete => metrics.incomplete += 1,
                TaskStatus::PreemptedByPrerequisiteFailure => metrics.preempted += 1,
                TaskStatus::Executed => {}
            }
            metrics.evaluated += 1;
            if !report.precheck_failures.is_empty() {
                metrics.precheck_failed += 1;
            }
            match report.outcome {
                TaskOutcome::Correct => metrics.correct += 1,
                TaskOutcome::Incorrect => metrics.incorrect += 1,
                TaskOutcome::Unknown => metrics.unknown += 1,
            }
        }
        if metrics.evaluated > 0 {
            metrics.accuracy = metrics.correct as f64 / metrics.evaluated as f64;
        }
        metrics
    }
}
