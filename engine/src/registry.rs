//! Capability-gated dispatch of decoded actions to subsystem collaborators.
//!
//! A [`CapabilityRegistry`] is built once per task from the task's
//! `available_systems`. Gating happens before argument binding, so an
//! operation on a disabled subsystem is always reported as
//! [`ErrorKind::NotAvailable`], whatever its arguments look like.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::core::catalog::{BoundArgs, SubsystemId, bind_arguments, find_operation, operations_for};
use crate::core::decode::{Value, decode_action_call};
use crate::core::types::{ErrorKind, ToolResult};

/// A simulated service that executes catalogued operations.
///
/// Arguments arrive already bound to the operation's contract, keyed by
/// canonical parameter name. Domain failures are reported in the returned
/// [`ToolResult`]; the registry tags them [`ErrorKind::Subsystem`].
pub trait Subsystem {
    fn invoke(&mut self, method: &str, args: &BoundArgs) -> ToolResult;
}

/// Builds the collaborator for each enabled subsystem of a task.
pub trait SubsystemFactory {
    fn create(&mut self, subsystem: SubsystemId) -> Box<dyn Subsystem>;
}

impl<F> SubsystemFactory for F
where
    F: FnMut(SubsystemId) -> Box<dyn Subsystem>,
{
    fn create(&mut self, subsystem: SubsystemId) -> Box<dyn Subsystem> {
        self(subsystem)
    }
}

/// Resolve a task's `available_systems` list.
///
/// `None` or an empty list enables every subsystem. Unknown names are
/// logged and ignored.
pub fn enabled_subsystems(available: Option<&[String]>) -> BTreeSet<SubsystemId> {
    let Some(names) = available.filter(|names| !names.is_empty()) else {
        return SubsystemId::ALL.into_iter().collect();
    };
    let mut enabled = BTreeSet::new();
    for name in names {
        match name.trim().parse::<SubsystemId>() {
            Ok(id) => {
                enabled.insert(id);
            }
            Err(err) => warn!(name = %name, "{err}; ignoring"),
        }
    }
    enabled
}

/// Per-task registry of enabled subsystems.
pub struct CapabilityRegistry {
    subsystems: BTreeMap<SubsystemId, Box<dyn Subsystem>>,
    list_operations_on_rejection: bool,
}

impl CapabilityRegistry {
    /// Build a registry enabling the subsystems named in `available`.
    pub fn new<F: SubsystemFactory + ?Sized>(available: Option<&[String]>, factory: &mut F) -> Self {
        let subsystems = enabled_subsystems(available)
            .into_iter()
            .map(|id| (id, factory.create(id)))
            .collect();
        Self {
            subsystems,
            list_operations_on_rejection: true,
        }
    }

    /// Whether "not available" failures enumerate what is available.
    pub fn with_operation_listing(mut self, enabled: bool) -> Self {
        self.list_operations_on_rejection = enabled;
        self
    }

    pub fn enabled(&self) -> impl Iterator<Item = SubsystemId> + '_ {
        self.subsystems.keys().copied()
    }

    /// True when the subsystem prefix is enabled and the method is catalogued.
    pub fn is_available(&self, operation: &str) -> bool {
        let Some((subsystem, method)) = operation.split_once('.') else {
            return false;
        };
        match subsystem.parse::<SubsystemId>() {
            Ok(id) => self.subsystems.contains_key(&id) && find_operation(id, method).is_some(),
            Err(_) => false,
        }
    }

    /// Qualified names of every operation this task may call.
    pub fn available_operations(&self) -> Vec<String> {
        self.enabled()
            .flat_map(operations_for)
            .map(|spec| spec.qualified_name())
            .collect()
    }

    /// Decode `action_text` and dispatch it.
    pub fn execute(&mut self, action_text: &str) -> ToolResult {
        match decode_action_call(action_text) {
            Ok(call) => self.dispatch(&call.operation, &call.args),
            Err(err) => {
                debug!(error = %err, "action call failed to decode");
                ToolResult::failure(ErrorKind::Decode, format!("Invalid action call: {err}"))
            }
        }
    }

    /// Gate, bind and invoke one operation.
    #[instrument(skip_all, fields(operation = %operation))]
    pub fn dispatch(&mut self, operation: &str, args: &IndexMap<String, Value>) -> ToolResult {
        let (subsystem_name, method) = operation.split_once('.').unwrap_or((operation, ""));

        let enabled_id = subsystem_name
            .parse::<SubsystemId>()
            .ok()
            .filter(|id| self.subsystems.contains_key(id));
        let Some(id) = enabled_id else {
            debug!(subsystem = subsystem_name, "subsystem not enabled");
            return self.reject_subsystem(subsystem_name);
        };

        let Some(spec) = find_operation(id, method) else {
            debug!(method, "operation not catalogued");
            return self.reject_operation(operation);
        };

        let bound = match bind_arguments(spec, args) {
            Ok(bound) => bound,
            Err(err) => {
                debug!(param = err.param(), "argument binding failed");
                return ToolResult::failure(ErrorKind::Argument, err.to_string());
            }
        };

        let Some(collaborator) = self.subsystems.get_mut(&id) else {
            return self.reject_subsystem(subsystem_name);
        };
        let mut result = collaborator.invoke(method, &bound);
        if !result.is_success() && result.error_kind.is_none() {
            result.error_kind = Some(ErrorKind::Subsystem);
        }
        debug!(status = ?result.status, "operation dispatched");
        result
    }

    fn reject_subsystem(&self, subsystem: &str) -> ToolResult {
        let mut message = format!("System '{subsystem}' is not available for this task.");
        if self.list_operations_on_rejection {
            let names: Vec<&str> = self.enabled().map(SubsystemId::as_str).collect();
            message.push_str(&format!(" Available systems: {}", names.join(", ")));
        }
        ToolResult::failure(ErrorKind::NotAvailable, message)
    }

    fn reject_operation(&self, operation: &str) -> ToolResult {
        let mut message = format!("Action '{operation}' is not available.");
        if self.list_operations_on_rejection {
            message.push_str(&format!(
                " Available actions: {}",
                self.available_operations().join(", ")
            ));
        }
        ToolResult::failure(ErrorKind::NotAvailable, message)
    }
}
