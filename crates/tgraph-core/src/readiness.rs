//! Readiness: which synapses may start, and what the rest wait on.
//!
//! A synapse is ready when it has not started, has not failed, and every
//! input is satisfied. An input is satisfied when its action confirmed
//! successfully. An input that is still pending or in flight always
//! blocks, so two synapses linked by a dependency can never be in flight
//! together.

use tgraph_score::SCORE_INFINITY;
use tracing::trace;

use crate::graph::Graph;
use crate::synapse::{Synapse, SynapseInput};

/// How inputs that are not plainly confirmed are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Inputs naming actions absent from the graph were satisfied by an
    /// earlier transition.
    pub missing_inputs_satisfied: bool,
    /// Failed inputs never block.
    pub continue_on_failed_inputs: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            missing_inputs_satisfied: true,
            continue_on_failed_inputs: false,
        }
    }
}

/// Status of one synapse input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// Confirmed successful.
    Satisfied,
    /// Pending or in flight.
    Waiting,
    /// Failed and blocking.
    Failed,
    /// Failed, but an override lets dependents proceed.
    FailedOverridden,
    /// Names an action that is not in this graph.
    Unresolved,
}

/// Classify one input of `synapse`.
pub fn input_status(
    graph: &Graph,
    synapse: &Synapse,
    input: &SynapseInput,
    policy: &ReadinessPolicy,
) -> InputStatus {
    let Some(action) = graph.find_action(input.action_id) else {
        return InputStatus::Unresolved;
    };

    let flags = action.flags();
    if flags.failed {
        if action.can_fail
            || synapse.priority >= SCORE_INFINITY
            || policy.continue_on_failed_inputs
        {
            InputStatus::FailedOverridden
        } else {
            InputStatus::Failed
        }
    } else if flags.confirmed {
        InputStatus::Satisfied
    } else {
        InputStatus::Waiting
    }
}

/// Whether `synapse` may start now.
pub fn is_ready(graph: &Graph, synapse: &Synapse, policy: &ReadinessPolicy) -> bool {
    let flags = synapse.flags();
    if flags.executed || flags.failed || flags.confirmed {
        return false;
    }

    for input in &synapse.inputs {
        let ok = match input_status(graph, synapse, input, policy) {
            InputStatus::Satisfied | InputStatus::FailedOverridden => true,
            InputStatus::Unresolved => policy.missing_inputs_satisfied,
            InputStatus::Waiting | InputStatus::Failed => false,
        };
        if !ok {
            trace!(
                synapse = synapse.id,
                input = input.action_id,
                "input not yet satisfied"
            );
            return false;
        }
    }
    true
}

/// Indices of every ready synapse, in declaration order.
pub fn ready_synapses(graph: &Graph, policy: &ReadinessPolicy) -> Vec<usize> {
    graph
        .synapses()
        .iter()
        .enumerate()
        .filter(|(_, s)| is_ready(graph, s, policy))
        .map(|(i, _)| i)
        .collect()
}

/// Ids of inputs that still hold `synapse` back: waiting ones and failed
/// ones without an override. Unresolved inputs are reported separately.
pub fn pending_inputs(graph: &Graph, synapse: &Synapse, policy: &ReadinessPolicy) -> Vec<i32> {
    synapse
        .inputs
        .iter()
        .filter(|input| {
            matches!(
                input_status(graph, synapse, input, policy),
                InputStatus::Waiting | InputStatus::Failed
            )
        })
        .map(|input| input.action_id)
        .collect()
}

/// Inputs naming actions that are not in the graph at all.
pub fn unresolved_inputs<'a>(graph: &Graph, synapse: &'a Synapse) -> Vec<&'a SynapseInput> {
    synapse
        .inputs
        .iter()
        .filter(|input| !graph.contains_action(input.action_id))
        .collect()
}
