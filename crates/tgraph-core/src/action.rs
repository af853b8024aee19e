//! Graph actions: single operations scheduled as part of a synapse.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Operation name that marks a cluster action as fencing.
pub const FENCING_OPERATION: &str = "stonith";

/// What kind of operation an action is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Internal ordering step with no real work behind it.
    Pseudo,
    /// Operation on a cluster resource (start, stop, monitor, ...).
    Resource,
    /// Cluster-wide operation (node shutdown, fencing, ...).
    Cluster,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Pseudo => "pseudo",
            ActionKind::Resource => "resource",
            ActionKind::Cluster => "cluster",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which executor path handles an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRoute {
    Pseudo,
    Resource,
    Cluster,
    Fencing,
}

impl ActionRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionRoute::Pseudo => "pseudo",
            ActionRoute::Resource => "resource",
            ActionRoute::Cluster => "cluster",
            ActionRoute::Fencing => "fencing",
        }
    }
}

impl fmt::Display for ActionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient status flags of an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    /// Handed to the executor.
    pub executed: bool,
    /// Completed successfully.
    pub confirmed: bool,
    /// Completed unsuccessfully (including timeouts and forced termination).
    pub failed: bool,
}

/// Lifecycle position of an action, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Pending,
    Dispatched,
    Confirmed,
    Failed,
}

/// A single operation in a transition graph.
#[derive(Debug, Clone)]
pub struct Action {
    /// Unique within the graph.
    pub id: i32,
    pub kind: ActionKind,
    /// Operation name, e.g. `start`, `monitor`, `stonith`.
    pub task: String,
    /// Operation key, e.g. `db_start_0`.
    pub task_key: Option<String>,
    /// Node the action runs on.
    pub target: Option<String>,
    /// Node that relays the action when the target cannot be reached directly.
    pub router: Option<String>,
    pub resource: Option<String>,
    /// Opaque attributes passed through to the executor.
    pub params: BTreeMap<String, String>,
    /// Planner-supplied timeout, including any start delay.
    pub timeout: Duration,
    /// Recurring interval for monitor operations; zero for one-shot actions.
    pub interval: Duration,
    /// A failure of this action does not block synapses that depend on it.
    pub can_fail: bool,
    flags: ActionFlags,
}

impl Action {
    pub fn new(id: i32, kind: ActionKind, task: &str) -> Self {
        Self {
            id,
            kind,
            task: task.to_string(),
            task_key: None,
            target: None,
            router: None,
            resource: None,
            params: BTreeMap::new(),
            timeout: Duration::ZERO,
            interval: Duration::ZERO,
            can_fail: false,
            flags: ActionFlags::default(),
        }
    }

    pub fn pseudo(id: i32, task: &str) -> Self {
        Self::new(id, ActionKind::Pseudo, task)
    }

    pub fn resource(id: i32, resource: &str, task: &str, target: &str) -> Self {
        Self::new(id, ActionKind::Resource, task)
            .with_resource(resource)
            .with_target(target)
            .with_key(&format!("{resource}_{task}_0"))
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.task_key = Some(key.to_string());
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_router(mut self, router: &str) -> Self {
        self.router = Some(router.to_string());
        self
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.can_fail = true;
        self
    }

    /// Executor path for this action. Cluster actions named `stonith` fence.
    pub fn route(&self) -> ActionRoute {
        match self.kind {
            ActionKind::Pseudo => ActionRoute::Pseudo,
            ActionKind::Resource => ActionRoute::Resource,
            ActionKind::Cluster if self.task == FENCING_OPERATION => ActionRoute::Fencing,
            ActionKind::Cluster => ActionRoute::Cluster,
        }
    }

    /// The operation key if known, else the bare operation name.
    pub fn key(&self) -> &str {
        self.task_key.as_deref().unwrap_or(&self.task)
    }

    pub fn flags(&self) -> ActionFlags {
        self.flags
    }

    pub fn state(&self) -> ActionState {
        if self.flags.failed {
            ActionState::Failed
        } else if self.flags.confirmed {
            ActionState::Confirmed
        } else if self.flags.executed {
            ActionState::Dispatched
        } else {
            ActionState::Pending
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.flags.confirmed || self.flags.failed
    }

    pub(crate) fn mark_executed(&mut self) {
        self.flags.executed = true;
    }

    pub(crate) fn mark_confirmed(&mut self) {
        self.flags.confirmed = true;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.flags.failed = true;
    }
}
