//! The executor seam: whatever actually runs resource, cluster and fencing
//! actions on cluster nodes.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use tgraph_core::{AbortMode, ActionResult, DispatchError, DispatchRequest};

/// Events serialized into the driver's single event loop.
#[derive(Debug)]
pub(crate) enum DriverEvent {
    Completed { action_id: i32, result: ActionResult },
    Timeout { action_id: i32, budget: Duration },
    Abort { mode: AbortMode, reason: String },
}

/// Reports the outcome of one dispatched action back to the driver.
///
/// Consumed on use, so each action reports at most once. Dropping the handle
/// without reporting leaves the action to its timer.
#[derive(Debug)]
pub struct CompletionHandle {
    action_id: i32,
    events: mpsc::UnboundedSender<DriverEvent>,
}

impl CompletionHandle {
    pub(crate) fn new(action_id: i32, events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self { action_id, events }
    }

    pub fn action_id(&self) -> i32 {
        self.action_id
    }

    pub fn confirm(self) {
        self.complete(ActionResult::Confirmed);
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(ActionResult::Failed {
            reason: reason.into(),
        });
    }

    pub fn complete(self, result: ActionResult) {
        let event = DriverEvent::Completed {
            action_id: self.action_id,
            result,
        };
        if self.events.send(event).is_err() {
            debug!(action = self.action_id, "driver gone, result dropped");
        }
    }
}

/// Runs actions on behalf of the driver.
///
/// `dispatch` must return as soon as the action is handed off; the outcome
/// is reported later through the [`CompletionHandle`]. Returning an error
/// means the action never started and fails immediately.
///
/// Pseudo actions are confirmed by the driver itself and never reach the
/// executor.
pub trait ActionExecutor: Send + Sync {
    fn dispatch(
        &self,
        request: DispatchRequest,
        completion: CompletionHandle,
    ) -> Result<(), DispatchError>;

    /// Stop a running action after a forced abort or a timeout. Any result
    /// it reports afterwards is ignored.
    fn cancel(&self, action_id: i32) {
        debug!(action = action_id, "executor has no cancel support");
    }
}
