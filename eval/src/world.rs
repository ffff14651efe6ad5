//! Simulated campus world for replaying recorded agent transcripts.
//!
//! Every catalogued operation succeeds and is appended to a shared ledger,
//! except the operations a transcript lists under `fail_operations`. The
//! ledger spans the whole run so later prechecks can see earlier work.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use engine::core::catalog::{BoundArgs, SubsystemId};
use engine::core::types::{ErrorKind, ToolResult};
use engine::registry::{Subsystem, SubsystemFactory};
use engine::session::Agent;
use engine::task::TaskDescriptor;

/// Scripted replies for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub replies: Vec<String>,
    /// Qualified operations (`subsystem.method`) the world refuses.
    #[serde(default)]
    pub fail_operations: Vec<String>,
}

/// Transcripts keyed by task id.
pub type Transcripts = HashMap<String, Transcript>;

#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_transcripts(path: &Path) -> Result<Transcripts> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let transcripts: Transcripts = serde_json::from_str(&contents)
        .with_context(|| format!("parse transcripts {}", path.display()))?;
    debug!(tasks = transcripts.len(), "transcripts loaded");
    Ok(transcripts)
}

/// Agent that answers with the next recorded reply for the task.
///
/// Once a task's replies run out it answers with empty text, which the
/// engine treats as an invalid directive until the round budget ends.
#[derive(Debug, Default)]
pub struct ReplayAgent {
    pending: HashMap<String, VecDeque<String>>,
}

impl ReplayAgent {
    pub fn new(transcripts: &Transcripts) -> Self {
        let pending = transcripts
            .iter()
            .map(|(task_id, transcript)| {
                (task_id.clone(), transcript.replies.iter().cloned().collect())
            })
            .collect();
        Self { pending }
    }
}

impl Agent for ReplayAgent {
    fn respond(&mut self, task: &TaskDescriptor, _observation: &str) -> Result<String> {
        let reply = self
            .pending
            .get_mut(&task.task_id)
            .and_then(VecDeque::pop_front);
        if reply.is_none() {
            debug!(task_id = %task.task_id, "no replies left");
        }
        Ok(reply.unwrap_or_default())
    }
}

/// One operation the simulated world accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_id: String,
    pub operation: String,
    pub args: serde_json::Value,
}

pub type Ledger = Rc<RefCell<Vec<LedgerEntry>>>;

#[derive(Debug, Default)]
struct TaskScope {
    task_id: String,
    failing: HashSet<String>,
}

/// A subsystem backed by the shared ledger.
#[derive(Debug)]
pub struct LedgerSubsystem {
    id: SubsystemId,
    ledger: Ledger,
    scope: Rc<RefCell<TaskScope>>,
}

impl Subsystem for LedgerSubsystem {
    fn invoke(&mut self, method: &str, args: &BoundArgs) -> ToolResult {
        let operation = format!("{}.{method}", self.id);
        let scope = self.scope.borrow();
        if scope.failing.contains(&operation) {
            debug!(operation = %operation, "simulated refusal");
            return ToolResult::failure(
                ErrorKind::Subsystem,
                format!("{operation} could not be completed"),
            );
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.push(LedgerEntry {
            task_id: scope.task_id.clone(),
            operation: operation.clone(),
            args: serde_json::to_value(args).unwrap_or_default(),
        });
        ToolResult::success_with_data(
            format!("{operation} completed"),
            serde_json::json!({ "ledger_index": ledger.len() - 1 }),
        )
    }
}

/// Builds [`LedgerSubsystem`]s scoped to the task currently being replayed.
#[derive(Debug, Default)]
pub struct LedgerFactory {
    ledger: Ledger,
    flushed: usize,
    scope: Rc<RefCell<TaskScope>>,
}

impl LedgerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a ledger persisted by an earlier run; its entries count as
    /// already flushed.
    pub fn resume(entries: Vec<LedgerEntry>) -> Self {
        Self {
            flushed: entries.len(),
            ledger: Rc::new(RefCell::new(entries)),
            scope: Rc::default(),
        }
    }

    /// Shared handle to every entry recorded so far.
    pub fn ledger(&self) -> Ledger {
        Rc::clone(&self.ledger)
    }

    /// Scope subsequently created subsystems to `task_id`.
    pub fn begin_task(&mut self, task_id: &str, transcript: Option<&Transcript>) {
        let mut scope = self.scope.borrow_mut();
        scope.task_id = task_id.to_string();
        scope.failing = transcript
            .map(|transcript| transcript.fail_operations.iter().cloned().collect())
            .unwrap_or_default();
    }

    /// Entries recorded since the last call.
    pub fn unflushed_entries(&mut self) -> Vec<LedgerEntry> {
        let ledger = self.ledger.borrow();
        let fresh = ledger[self.flushed..].to_vec();
        self.flushed = ledger.len();
        fresh
    }
}

impl SubsystemFactory for LedgerFactory {
    fn create(&mut self, subsystem: SubsystemId) -> Box<dyn Subsystem> {
        Box::new(LedgerSubsystem {
            id: subsystem,
            ledger: Rc::clone(&self.ledger),
            scope: Rc::clone(&self.scope),
        })
    }
}
