//! Test-only helpers: scripted agents, recording subsystems and task
//! builders.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::core::catalog::{BoundArgs, SubsystemId};
use crate::core::types::{ErrorKind, TaskOutcome, ToolResult};
use crate::registry::{Subsystem, SubsystemFactory};
use crate::session::{Agent, Evaluator, PrecheckFinding, TaskEvidence};
use crate::task::TaskDescriptor;

/// Create a non-trigger task with default fields.
pub fn task(id: &str, instruction: &str) -> TaskDescriptor {
    TaskDescriptor::new(id, instruction)
}

/// Create a trigger task (no instruction, never evaluated).
pub fn trigger(id: &str) -> TaskDescriptor {
    let mut task = TaskDescriptor::new(id, "");
    task.is_trigger = true;
    task
}

/// Create a task that is a prerequisite for `dependents` (comma-separated).
pub fn prerequisite(id: &str, dependents: &str) -> TaskDescriptor {
    let mut task = TaskDescriptor::new(id, format!("{id} instruction"));
    task.pre_task_for = Some(dependents.to_string());
    task
}

/// Restrict `task` to the named subsystems.
pub fn with_systems(mut task: TaskDescriptor, systems: &[&str]) -> TaskDescriptor {
    task.available_systems = Some(systems.iter().map(|name| name.to_string()).collect());
    task
}

/// Create a scratch directory removed on drop.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

/// Agent that replays scripted replies per task and records what it saw.
///
/// A task whose script is exhausted (or missing) gets an empty reply, which
/// parses as an invalid directive.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    scripts: HashMap<String, VecDeque<String>>,
    /// `(task_id, observation)` pairs in the order they were shown.
    pub observations: Vec<(String, String)>,
    fail_on: Option<String>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, task_id: &str, replies: &[&str]) -> Self {
        self.scripts.insert(
            task_id.to_string(),
            replies.iter().map(|reply| reply.to_string()).collect(),
        );
        self
    }

    /// Make every reply for `task_id` an error.
    pub fn failing_on(mut self, task_id: &str) -> Self {
        self.fail_on = Some(task_id.to_string());
        self
    }

    pub fn observations_for(&self, task_id: &str) -> Vec<&str> {
        self.observations
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, observation)| observation.as_str())
            .collect()
    }
}

impl Agent for ScriptedAgent {
    fn respond(&mut self, task: &TaskDescriptor, observation: &str) -> Result<String> {
        self.observations
            .push((task.task_id.clone(), observation.to_string()));
        if self.fail_on.as_deref() == Some(task.task_id.as_str()) {
            return Err(anyhow!("scripted agent failure"));
        }
        Ok(self
            .scripts
            .get_mut(&task.task_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }
}

/// One invocation seen by a [`RecordingSubsystem`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub subsystem: SubsystemId,
    pub method: String,
    pub args: BoundArgs,
}

/// Shared log of calls across every subsystem a factory builds.
pub type CallLog = Rc<RefCell<Vec<RecordedCall>>>;

/// Subsystem that accepts every call, logs it, and fails chosen methods.
#[derive(Debug)]
pub struct RecordingSubsystem {
    id: SubsystemId,
    log: CallLog,
    failing: Rc<HashSet<String>>,
}

impl Subsystem for RecordingSubsystem {
    fn invoke(&mut self, method: &str, args: &BoundArgs) -> ToolResult {
        self.log.borrow_mut().push(RecordedCall {
            subsystem: self.id,
            method: method.to_string(),
            args: args.clone(),
        });
        let qualified = format!("{}.{method}", self.id);
        if self.failing.contains(&qualified) {
            return ToolResult::failure(ErrorKind::Subsystem, format!("{qualified} refused"));
        }
        ToolResult::success(format!("{qualified} ok"))
    }
}

/// Factory producing [`RecordingSubsystem`]s that share one [`CallLog`].
#[derive(Debug, Default)]
pub struct RecordingFactory {
    pub log: CallLog,
    failing: Rc<HashSet<String>>,
    /// Subsystems created so far, in creation order.
    pub created: Vec<SubsystemId>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the listed qualified operations (`subsystem.method`).
    pub fn failing(mut self, operations: &[&str]) -> Self {
        self.failing = Rc::new(operations.iter().map(|op| op.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log.borrow().clone()
    }
}

impl SubsystemFactory for RecordingFactory {
    fn create(&mut self, subsystem: SubsystemId) -> Box<dyn Subsystem> {
        self.created.push(subsystem);
        Box::new(RecordingSubsystem {
            id: subsystem,
            log: Rc::clone(&self.log),
            failing: Rc::clone(&self.failing),
        })
    }
}

/// Evaluator returning fixed outcomes per task, with a default.
#[derive(Debug)]
pub struct FixedEvaluator {
    outcomes: HashMap<String, TaskOutcome>,
    default: TaskOutcome,
    satisfied: HashMap<String, Vec<PrecheckFinding>>,
    /// Task ids in the order they were evaluated.
    pub evaluated: Vec<String>,
    /// Task ids in the order they were prechecked.
    pub prechecked: Vec<String>,
}

impl FixedEvaluator {
    pub fn new(default: TaskOutcome) -> Self {
        Self {
            outcomes: HashMap::new(),
            default,
            satisfied: HashMap::new(),
            evaluated: Vec::new(),
            prechecked: Vec::new(),
        }
    }

    pub fn with(mut self, task_id: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task_id.to_string(), outcome);
        self
    }

    /// Report `component` as already satisfied when `task_id` is prechecked.
    pub fn satisfied_before(mut self, task_id: &str, component: &str) -> Self {
        self.satisfied
            .entry(task_id.to_string())
            .or_default()
            .push(PrecheckFinding {
                component: component.to_string(),
                description: format!("{component} already held"),
            });
        self
    }
}

impl Evaluator for FixedEvaluator {
    fn evaluate(&mut self, evidence: &TaskEvidence<'_>) -> Result<TaskOutcome> {
        let task_id = &evidence.task.task_id;
        self.evaluated.push(task_id.clone());
        Ok(self.outcomes.get(task_id).copied().unwrap_or(self.default))
    }

    fn precheck(&mut self, task: &TaskDescriptor) -> Result<Vec<PrecheckFinding>> {
        self.prechecked.push(task.task_id.clone());
        Ok(self.satisfied.get(&task.task_id).cloned().unwrap_or_default())
    }
}
