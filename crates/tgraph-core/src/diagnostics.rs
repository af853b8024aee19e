//! Diagnostics: read-only rendering of graph state.
//!
//! Lines are built as `String`s so they can be logged, printed, or shipped
//! elsewhere. Nothing here mutates the graph.

use std::collections::BTreeMap;

use tgraph_score::Score;
use tracing::{Level, debug, error, info, trace, warn};

use crate::graph::Graph;
use crate::readiness::{ReadinessPolicy, pending_inputs, unresolved_inputs};
use crate::synapse::Synapse;

/// Log one line at a level chosen at runtime.
pub fn emit(level: Level, line: &str) {
    if level == Level::ERROR {
        error!("{line}");
    } else if level == Level::WARN {
        warn!("{line}");
    } else if level == Level::INFO {
        info!("{line}");
    } else if level == Level::DEBUG {
        debug!("{line}");
    } else {
        trace!("{line}");
    }
}

fn on_host(host: Option<&str>) -> String {
    host.map(|h| format!(" on {h}")).unwrap_or_default()
}

/// Header line: id, action count, batch limit and network delay.
pub fn summary_line(graph: &Graph) -> String {
    let limit = match graph.batch_limit() {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    format!(
        "Graph {} with {} actions: batch-limit={} jobs, network-delay={}ms",
        graph.id(),
        graph.action_count(),
        limit,
        graph.network_delay().as_millis()
    )
}

/// Space-separated ids of inputs still holding `synapse` back, or `none`.
pub fn pending_inputs_text(graph: &Graph, synapse: &Synapse, policy: &ReadinessPolicy) -> String {
    let pending = pending_inputs(graph, synapse, policy);
    if pending.is_empty() {
        "none".to_string()
    } else {
        pending
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One line per action of `synapse`, followed by its unresolved inputs
/// when the synapse has not started.
pub fn render_synapse(graph: &Graph, synapse: &Synapse, policy: &ReadinessPolicy) -> Vec<String> {
    let started = synapse.flags().executed;
    let waiting = if started {
        "none".to_string()
    } else {
        pending_inputs_text(graph, synapse, policy)
    };
    let state = synapse.state().label();

    let mut lines: Vec<String> = synapse
        .actions
        .iter()
        .map(|action| {
            let desc = format!("{} {} op {}", state, action.kind, action.key());
            format!(
                "[Action {:>4}]: {:<50}{} (priority: {}, waiting: {})",
                action.id,
                desc,
                on_host(action.target.as_deref()),
                Score::from(synapse.priority),
                waiting
            )
        })
        .collect();

    if !started {
        for input in unresolved_inputs(graph, synapse) {
            lines.push(format!(
                " * [Input {:>2}]: Unresolved dependency {} op {}{}",
                input.action_id,
                input.kind,
                input.task_key.as_deref().unwrap_or("unknown"),
                on_host(input.target.as_deref())
            ));
        }
    }
    lines
}

/// Render the synapse that owns `action_id`. `None` if no such action.
pub fn render_action(graph: &Graph, action_id: i32, policy: &ReadinessPolicy) -> Option<Vec<String>> {
    graph
        .owning_synapse(action_id)
        .map(|synapse| render_synapse(graph, synapse, policy))
}

/// Summary line plus every synapse. Empty for a graph with no actions.
pub fn render_graph(graph: &Graph, policy: &ReadinessPolicy) -> Vec<String> {
    if graph.action_count() == 0 {
        return Vec::new();
    }
    let mut lines = vec![summary_line(graph)];
    for synapse in graph.synapses() {
        lines.extend(render_synapse(graph, synapse, policy));
    }
    lines
}

pub fn log_graph(level: Level, graph: &Graph, policy: &ReadinessPolicy) {
    let lines = render_graph(graph, policy);
    if lines.is_empty() {
        debug!(transition = graph.id(), "Empty transition graph");
        return;
    }
    for line in &lines {
        emit(level, line);
    }
}

pub fn log_action(level: Level, graph: &Graph, action_id: i32, policy: &ReadinessPolicy) {
    match render_action(graph, action_id, policy) {
        Some(lines) => lines.iter().for_each(|line| emit(level, line)),
        None => warn!(action = action_id, "cannot log unknown action"),
    }
}

/// Machine-readable summary for telemetry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphSummary {
    pub transition_id: i32,
    pub source: String,
    pub actions: usize,
    pub synapses: usize,
    pub batch_limit: u32,
    pub network_delay_ms: u64,
    /// Synapse count per state label.
    pub states: BTreeMap<&'static str, usize>,
    pub failed_actions: Vec<i32>,
}

pub fn summarize(graph: &Graph) -> GraphSummary {
    let mut states = BTreeMap::new();
    for synapse in graph.synapses() {
        *states.entry(synapse.state().label()).or_insert(0) += 1;
    }
    GraphSummary {
        transition_id: graph.id(),
        source: graph.source().to_string(),
        actions: graph.action_count(),
        synapses: graph.synapses().len(),
        batch_limit: graph.batch_limit(),
        network_delay_ms: graph.network_delay().as_millis() as u64,
        states,
        failed_actions: graph
            .actions()
            .filter(|a| a.flags().failed)
            .map(|a| a.id)
            .collect(),
    }
}
