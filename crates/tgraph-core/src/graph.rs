//! The transition graph: an arena of synapses with an action index.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::action::Action;
use crate::error::{GraphError, GraphResult};
use crate::synapse::Synapse;

/// Position of an action inside the synapse arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionLocation {
    pub synapse: usize,
    pub action: usize,
}

/// A transition graph.
///
/// Structure is fixed once built. Only status flags change afterwards, and
/// only through [`Transition`](crate::Transition).
#[derive(Debug, Clone)]
pub struct Graph {
    id: i32,
    source: String,
    synapses: Vec<Synapse>,
    index: HashMap<i32, ActionLocation>,
    batch_limit: u32,
    network_delay: Duration,
    stonith_timeout: Duration,
}

impl Graph {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Where the graph came from (planner input name), for logs.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Synapses in declaration order.
    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn synapse(&self, index: usize) -> Option<&Synapse> {
        self.synapses.get(index)
    }

    pub fn action_count(&self) -> usize {
        self.index.len()
    }

    /// Maximum in-flight actions; 0 means unlimited.
    pub fn batch_limit(&self) -> u32 {
        self.batch_limit
    }

    pub fn set_batch_limit(&mut self, limit: u32) {
        self.batch_limit = limit;
    }

    /// Inter-node delay budget added to every action timer.
    pub fn network_delay(&self) -> Duration {
        self.network_delay
    }

    pub fn set_network_delay(&mut self, delay: Duration) {
        self.network_delay = delay;
    }

    pub fn stonith_timeout(&self) -> Duration {
        self.stonith_timeout
    }

    pub fn locate(&self, action_id: i32) -> Option<ActionLocation> {
        self.index.get(&action_id).copied()
    }

    pub fn contains_action(&self, action_id: i32) -> bool {
        self.index.contains_key(&action_id)
    }

    pub fn find_action(&self, action_id: i32) -> Option<&Action> {
        let loc = self.locate(action_id)?;
        self.synapses
            .get(loc.synapse)
            .and_then(|s| s.actions.get(loc.action))
    }

    /// The synapse that owns `action_id`.
    pub fn owning_synapse(&self, action_id: i32) -> Option<&Synapse> {
        let loc = self.locate(action_id)?;
        self.synapses.get(loc.synapse)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.synapses.iter().flat_map(|s| s.actions.iter())
    }

    pub(crate) fn synapse_mut(&mut self, index: usize) -> &mut Synapse {
        &mut self.synapses[index]
    }

    pub(crate) fn action_mut(&mut self, loc: ActionLocation) -> &mut Action {
        &mut self.synapses[loc.synapse].actions[loc.action]
    }
}

/// Assembles a [`Graph`], indexing every action.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    id: i32,
    source: String,
    synapses: Vec<Synapse>,
    batch_limit: u32,
    network_delay: Duration,
    stonith_timeout: Option<Duration>,
}

impl GraphBuilder {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            source: "unknown".to_string(),
            synapses: Vec::new(),
            batch_limit: 0,
            network_delay: Duration::ZERO,
            stonith_timeout: None,
        }
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn batch_limit(mut self, limit: u32) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn network_delay(mut self, delay: Duration) -> Self {
        self.network_delay = delay;
        self
    }

    /// Defaults to the network delay when unset.
    pub fn stonith_timeout(mut self, timeout: Duration) -> Self {
        self.stonith_timeout = Some(timeout);
        self
    }

    pub fn synapse(mut self, synapse: Synapse) -> Self {
        self.synapses.push(synapse);
        self
    }

    /// Build the graph. Fails if two actions share an id.
    pub fn build(self) -> GraphResult<Graph> {
        let mut index = HashMap::new();
        for (s, synapse) in self.synapses.iter().enumerate() {
            for (a, action) in synapse.actions.iter().enumerate() {
                let loc = ActionLocation {
                    synapse: s,
                    action: a,
                };
                if index.insert(action.id, loc).is_some() {
                    return Err(GraphError::DuplicateAction(action.id));
                }
            }
        }

        debug!(
            transition = self.id,
            source = %self.source,
            actions = index.len(),
            synapses = self.synapses.len(),
            "built transition graph"
        );

        Ok(Graph {
            id: self.id,
            source: self.source,
            synapses: self.synapses,
            index,
            batch_limit: self.batch_limit,
            network_delay: self.network_delay,
            stonith_timeout: self.stonith_timeout.unwrap_or(self.network_delay),
        })
    }
}
