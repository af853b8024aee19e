//! Unpacking the planner's graph document.
//!
//! The planner serializes a transition as JSON:
//!
//! ```text
//! { "transition_id": 7, "cluster_delay": "60s", "batch_limit": 10,
//!   "synapses": [
//!     { "id": 0, "priority": "INFINITY",
//!       "actions": [ { "id": 3, "type": "rsc_op", "operation": "start", ... } ],
//!       "inputs":  [ { "id": 1, "type": "pseudo_event", ... } ] } ] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use tgraph_score::{ScoreBands, clamp_score, parse_score};

use crate::action::{Action, ActionKind};
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, GraphBuilder};
use crate::interval::{parse_interval, parse_millis};
use crate::synapse::{Synapse, SynapseInput};

const RESOURCE_ELEMENT: &str = "rsc_op";
const PSEUDO_ELEMENT: &str = "pseudo_event";
const CLUSTER_ELEMENT: &str = "crm_event";

/// Top-level graph document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub transition_id: Option<i32>,
    #[serde(default)]
    pub source: Option<String>,
    /// Inter-node delay budget, e.g. `60s`. Required.
    pub cluster_delay: Option<String>,
    #[serde(default)]
    pub stonith_timeout: Option<String>,
    /// Number or numeric string; missing or invalid means unlimited.
    #[serde(default)]
    pub batch_limit: Option<serde_json::Value>,
    #[serde(default)]
    pub synapses: Vec<SynapseDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseDocument {
    pub id: i32,
    /// Number or score text (`INFINITY`, `red`, ...).
    #[serde(default)]
    pub priority: Option<serde_json::Value>,
    #[serde(default)]
    pub actions: Vec<ActionDocument>,
    #[serde(default)]
    pub inputs: Vec<ActionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDocument {
    pub id: i32,
    /// `rsc_op`, `pseudo_event` or `crm_event`.
    #[serde(rename = "type")]
    pub element: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub operation_key: Option<String>,
    #[serde(default)]
    pub on_node: Option<String>,
    #[serde(default)]
    pub router_node: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl GraphDocument {
    pub fn parse(text: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Convert into a [`Graph`]. `bands` resolves colour-keyword priorities.
    pub fn into_graph(self, bands: &ScoreBands) -> GraphResult<Graph> {
        let id = self
            .transition_id
            .ok_or(GraphError::MissingAttribute("transition_id"))?;
        let delay_text = self
            .cluster_delay
            .ok_or(GraphError::MissingAttribute("cluster_delay"))?;
        let network_delay =
            parse_interval(&delay_text).ok_or_else(|| GraphError::InvalidAttribute {
                attribute: "cluster_delay",
                value: delay_text.clone(),
            })?;

        let mut builder = GraphBuilder::new(id)
            .source(self.source.as_deref().unwrap_or("unknown"))
            .network_delay(network_delay)
            .batch_limit(batch_limit_from(self.batch_limit.as_ref()));

        if let Some(text) = self.stonith_timeout {
            let timeout = parse_interval(&text).ok_or_else(|| GraphError::InvalidAttribute {
                attribute: "stonith_timeout",
                value: text.clone(),
            })?;
            builder = builder.stonith_timeout(timeout);
        }

        for doc in self.synapses {
            if let Some(synapse) = unpack_synapse(doc, bands) {
                builder = builder.synapse(synapse);
            }
        }

        builder.build()
    }
}

/// Parse and convert a JSON graph document in one step.
pub fn unpack_graph(text: &str, bands: &ScoreBands) -> GraphResult<Graph> {
    GraphDocument::parse(text)?.into_graph(bands)
}

fn batch_limit_from(value: Option<&serde_json::Value>) -> u32 {
    let limit = match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    limit
        .filter(|l| *l > 0)
        .map(|l| u32::try_from(l).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn priority_from(value: Option<&serde_json::Value>, bands: &ScoreBands) -> i32 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().map(clamp_score).unwrap_or(0),
        Some(serde_json::Value::String(s)) => parse_score(Some(s.as_str()), bands),
        _ => 0,
    }
}

fn kind_from(element: &str) -> Option<ActionKind> {
    match element {
        RESOURCE_ELEMENT => Some(ActionKind::Resource),
        PSEUDO_ELEMENT => Some(ActionKind::Pseudo),
        CLUSTER_ELEMENT => Some(ActionKind::Cluster),
        _ => None,
    }
}

fn unpack_synapse(doc: SynapseDocument, bands: &ScoreBands) -> Option<Synapse> {
    if doc.id < 0 {
        error!(synapse = doc.id, "ignoring synapse with negative id");
        return None;
    }

    let mut synapse = Synapse::new(doc.id, priority_from(doc.priority.as_ref(), bands));
    trace!(synapse = doc.id, priority = synapse.priority, "unpacking synapse");

    for action_doc in doc.actions {
        if let Some(action) = unpack_action(action_doc) {
            trace!(action = action.id, synapse = doc.id, "adding action to synapse");
            synapse = synapse.with_action(action);
        }
    }

    for input_doc in doc.inputs {
        let Some(kind) = kind_from(&input_doc.element) else {
            error!(
                input = input_doc.id,
                element = %input_doc.element,
                "ignoring synapse input of unknown type"
            );
            continue;
        };
        trace!(input = input_doc.id, synapse = doc.id, "adding input to synapse");
        synapse = synapse.with_input(SynapseInput {
            action_id: input_doc.id,
            kind,
            task_key: input_doc.operation_key.or(input_doc.operation),
            target: input_doc.on_node,
        });
    }

    Some(synapse)
}

fn unpack_action(doc: ActionDocument) -> Option<Action> {
    let Some(kind) = kind_from(&doc.element) else {
        error!(action = doc.id, element = %doc.element, "ignoring action of unknown type");
        return None;
    };

    let mut action = Action::new(doc.id, kind, doc.operation.as_deref().unwrap_or_default());
    action.task_key = doc.operation_key;
    action.target = doc.on_node;
    action.router = doc.router_node;
    action.resource = doc.resource;

    // The timer covers the start delay as well as the operation itself.
    action.timeout = parse_millis(doc.meta.get("timeout").map(String::as_str))
        + parse_millis(doc.meta.get("start_delay").map(String::as_str));
    action.interval = parse_millis(doc.meta.get("interval").map(String::as_str));

    if let Some(value) = doc.meta.get("can_fail") {
        action.can_fail = parse_boolean(value);
        if action.can_fail {
            warn!(
                action = action.id,
                "can_fail is deprecated and will be removed in a future release"
            );
        }
    }

    action.params = doc.meta;
    debug!(
        action = action.id,
        timeout_ms = action.timeout.as_millis() as u64,
        "unpacked action"
    );
    Some(action)
}

fn parse_boolean(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "y" | "1"
    )
}
