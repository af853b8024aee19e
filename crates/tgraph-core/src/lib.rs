//! tgraph-core: transition graph model and execution state machine.
//!
//! A transition graph is the plan the placement engine hands over once per
//! transition: synapses (groups of actions that start together) whose
//! inputs are actions in other synapses. This crate owns the in-memory
//! model and the single-writer state machine that decides what may run.
//! It performs no I/O; `tgraph-exec` drives it against a real executor.
//!
//! # Components
//!
//! - **`action`** / **`synapse`** / **`graph`**: the arena model
//! - **`document`**: unpacking the planner's JSON graph document
//! - **`readiness`**: which synapses may start, and what they wait on
//! - **`transition`**: the dispatch / completion / abort state machine
//! - **`diagnostics`**: read-only rendering of graph state for logs
//! - **`interval`**: duration text such as `60s` or `500ms`
//!
//! # Architecture
//!
//! ```text
//! Transition (sole mutator)
//!   └── Graph
//!       ├── synapses: Vec<Synapse>        (declaration order)
//!       │   ├── actions: Vec<Action>      (owned)
//!       │   └── inputs: Vec<SynapseInput> (action ids, never owned)
//!       └── index: action id → (synapse, action) position
//! ```

pub mod action;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod graph;
pub mod interval;
pub mod readiness;
pub mod synapse;
pub mod transition;

pub use action::{Action, ActionFlags, ActionKind, ActionRoute, ActionState};
pub use diagnostics::GraphSummary;
pub use document::{GraphDocument, unpack_graph};
pub use error::{DispatchError, GraphError, GraphResult};
pub use graph::{ActionLocation, Graph, GraphBuilder};
pub use interval::parse_interval;
pub use readiness::{InputStatus, ReadinessPolicy};
pub use synapse::{Synapse, SynapseFlags, SynapseInput, SynapseState};
pub use transition::{
    AbortMode, ActionResult, DispatchRequest, Dispatcher, ExecutionPolicy, FailurePolicy,
    Transition, TransitionStatus, timeout_budget,
};
