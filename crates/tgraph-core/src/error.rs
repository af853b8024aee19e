//! Graph and dispatch error types.

use thiserror::Error;

/// Errors raised while building a graph or applying results to it.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid graph document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("graph document missing required attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("invalid value for {attribute}: {value}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    #[error("duplicate action id {0} in graph")]
    DuplicateAction(i32),

    #[error("action {0} is not part of the graph")]
    UnknownAction(i32),

    #[error("action {0} is not in flight")]
    NotInFlight(i32),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors an executor returns when it cannot even start an action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("executor rejected action {action_id}: {reason}")]
    Rejected { action_id: i32, reason: String },
}
