//! A simulated executor for dry runs and tests.
//!
//! Every action "runs" for a fixed delay and then confirms, except that
//! actions listed as failing report failure and actions listed as hanging
//! never report at all (they are left to their timers).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use tgraph_core::{DispatchError, DispatchRequest};

use crate::executor::{ActionExecutor, CompletionHandle};

/// What the simulated executor has seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionLog {
    /// Action ids in dispatch order.
    pub dispatched: Vec<i32>,
    pub cancelled: Vec<i32>,
    /// Most actions ever running at once.
    pub peak_running: usize,
}

enum Running {
    Task(JoinHandle<()>),
    Held(CompletionHandle),
}

#[derive(Default)]
struct SimState {
    log: ExecutionLog,
    running: HashMap<i32, Running>,
}

#[derive(Clone)]
pub struct SimulatedExecutor {
    delay: Duration,
    fail: HashSet<i32>,
    hang: HashSet<i32>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: HashSet::new(),
            hang: HashSet::new(),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Report failure for these action ids.
    pub fn fail<I: IntoIterator<Item = i32>>(mut self, ids: I) -> Self {
        self.fail.extend(ids);
        self
    }

    /// Never report a result for these action ids.
    pub fn hang<I: IntoIterator<Item = i32>>(mut self, ids: I) -> Self {
        self.hang.extend(ids);
        self
    }

    pub fn log(&self) -> ExecutionLog {
        self.lock().log.clone()
    }

    /// Actions dispatched and not yet finished or cancelled.
    pub fn running(&self) -> usize {
        self.lock().running.len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActionExecutor for SimulatedExecutor {
    fn dispatch(
        &self,
        request: DispatchRequest,
        completion: CompletionHandle,
    ) -> Result<(), DispatchError> {
        let action_id = request.action_id;
        info!(
            transition = request.transition_id,
            action = action_id,
            route = %request.route,
            operation = request.task_key.as_deref().unwrap_or(&request.task),
            node = request.target.as_deref().unwrap_or("local"),
            interval_ms = request.interval.as_millis() as u64,
            "executing simulated action"
        );

        // Hold the lock across spawn so a zero-delay task cannot finish
        // before it is registered.
        let mut state = self.lock();
        let running = if self.hang.contains(&action_id) {
            Running::Held(completion)
        } else {
            let delay = self.delay;
            let fails = self.fail.contains(&action_id);
            let shared = Arc::clone(&self.state);
            Running::Task(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .running
                    .remove(&action_id);
                if fails {
                    completion.fail("simulated failure");
                } else {
                    completion.confirm();
                }
            }))
        };

        state.log.dispatched.push(action_id);
        state.running.insert(action_id, running);
        state.log.peak_running = state.log.peak_running.max(state.running.len());
        Ok(())
    }

    fn cancel(&self, action_id: i32) {
        let mut state = self.lock();
        state.log.cancelled.push(action_id);
        match state.running.remove(&action_id) {
            Some(Running::Task(task)) => task.abort(),
            Some(Running::Held(_)) => {}
            None => debug!(action = action_id, "cancel for finished action"),
        }
    }
}
