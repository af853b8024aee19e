//! Synapses: actions that start together once their inputs are satisfied.

use std::fmt;

use crate::action::{Action, ActionKind};

/// Reference to an action that a synapse waits on.
///
/// Only `action_id` is used for lookup. The descriptive fields are what the
/// planner recorded for the input, so an input whose action is absent from
/// the graph can still be reported meaningfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynapseInput {
    pub action_id: i32,
    pub kind: ActionKind,
    pub task_key: Option<String>,
    pub target: Option<String>,
}

impl SynapseInput {
    pub fn new(action_id: i32, kind: ActionKind) -> Self {
        Self {
            action_id,
            kind,
            task_key: None,
            target: None,
        }
    }

    /// Reference an existing action, copying its description.
    pub fn from_action(action: &Action) -> Self {
        Self {
            action_id: action.id,
            kind: action.kind,
            task_key: Some(action.key().to_string()),
            target: action.target.clone(),
        }
    }
}

/// Transient status flags of a synapse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynapseFlags {
    /// Every input was satisfied at the last scheduling pass.
    pub ready: bool,
    /// Actions handed to the executor.
    pub executed: bool,
    /// Every action completed successfully.
    pub confirmed: bool,
    /// Some action failed. Permanent for the transition.
    pub failed: bool,
}

/// Display state of a synapse, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SynapseState {
    Pending,
    Ready,
    InFlight,
    Completed,
    Failed,
}

impl SynapseState {
    pub fn label(self) -> &'static str {
        match self {
            SynapseState::Pending => "Pending",
            SynapseState::Ready => "Ready",
            SynapseState::InFlight => "In-flight",
            SynapseState::Completed => "Completed",
            SynapseState::Failed => "Failed",
        }
    }
}

impl fmt::Display for SynapseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A unit of scheduling.
#[derive(Debug, Clone)]
pub struct Synapse {
    pub id: i32,
    /// Bounded score. `+INFINITY` marks a synapse that runs even when an
    /// input failed.
    pub priority: i32,
    pub actions: Vec<Action>,
    pub inputs: Vec<SynapseInput>,
    flags: SynapseFlags,
}

impl Synapse {
    pub fn new(id: i32, priority: i32) -> Self {
        Self {
            id,
            priority,
            actions: Vec::new(),
            inputs: Vec::new(),
            flags: SynapseFlags::default(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_input(mut self, input: SynapseInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Wait on `action` before starting.
    pub fn after(self, action: &Action) -> Self {
        self.with_input(SynapseInput::from_action(action))
    }

    pub fn flags(&self) -> SynapseFlags {
        self.flags
    }

    /// Failed beats confirmed beats executed beats ready.
    pub fn state(&self) -> SynapseState {
        if self.flags.failed {
            SynapseState::Failed
        } else if self.flags.confirmed {
            SynapseState::Completed
        } else if self.flags.executed {
            SynapseState::InFlight
        } else if self.flags.ready {
            SynapseState::Ready
        } else {
            SynapseState::Pending
        }
    }

    /// Confirmed or failed; nothing more will happen to it.
    pub fn is_resolved(&self) -> bool {
        self.flags.confirmed || self.flags.failed
    }

    pub fn has_input(&self, action_id: i32) -> bool {
        self.inputs.iter().any(|input| input.action_id == action_id)
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.flags.ready = ready;
    }

    pub(crate) fn mark_executed(&mut self) {
        self.flags.executed = true;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.flags.failed = true;
    }

    /// Mark confirmed if every action confirmed and nothing failed.
    pub(crate) fn refresh_confirmed(&mut self) -> bool {
        if !self.flags.failed
            && !self.flags.confirmed
            && self.actions.iter().all(|a| a.flags().confirmed)
        {
            self.flags.confirmed = true;
        }
        self.flags.confirmed
    }
}
