//! The async execution driver.
//!
//! One task owns the [`Transition`] and is its only writer. Executor
//! results, timer expiries and abort requests all arrive as events on one
//! channel and are applied one at a time between scheduling passes, while
//! the actions themselves run concurrently wherever the executor puts them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, trace, warn};

use tgraph_core::diagnostics::{self, GraphSummary};
use tgraph_core::{
    AbortMode, ActionResult, ActionRoute, DispatchError, DispatchRequest, Dispatcher,
    ExecutionPolicy, Graph, SynapseState, Transition, TransitionStatus,
};

use crate::executor::{ActionExecutor, CompletionHandle, DriverEvent};

/// Final outcome of a driven transition.
#[derive(Debug)]
pub struct TransitionReport {
    pub status: TransitionStatus,
    pub abort_reason: Option<String>,
    pub summary: GraphSummary,
    /// Rendered graph state at the end of the run.
    pub diagnostics: Vec<String>,
    pub graph: Graph,
}

impl TransitionReport {
    pub fn is_complete(&self) -> bool {
        self.status == TransitionStatus::Complete
    }

    pub fn failed_actions(&self) -> &[i32] {
        &self.summary.failed_actions
    }
}

/// Cheap, cloneable access to a running driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    events: mpsc::UnboundedSender<DriverEvent>,
    status: watch::Receiver<TransitionStatus>,
}

impl DriverHandle {
    /// Request an abort. Returns `false` if the driver has already exited.
    pub fn abort(&self, mode: AbortMode, reason: &str) -> bool {
        self.events
            .send(DriverEvent::Abort {
                mode,
                reason: reason.to_string(),
            })
            .is_ok()
    }

    /// Status reported by the most recent pass.
    pub fn status(&self) -> TransitionStatus {
        *self.status.borrow()
    }

    /// Wait until the transition reaches a terminal status.
    pub async fn finished(&mut self) -> TransitionStatus {
        let done = self
            .status
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status);
        done.unwrap_or_else(|_| *self.status.borrow())
    }
}

/// Connects one scheduling pass to the executor and arms action timers.
struct Bridge<'a> {
    transition_id: i32,
    executor: &'a dyn ActionExecutor,
    events: &'a mpsc::UnboundedSender<DriverEvent>,
    timers: &'a mut HashMap<i32, JoinHandle<()>>,
}

impl Dispatcher for Bridge<'_> {
    fn dispatch(&mut self, request: DispatchRequest) -> Result<(), DispatchError> {
        let action_id = request.action_id;
        let budget = request.timeout;
        let completion = CompletionHandle::new(action_id, self.events.clone());

        if request.route == ActionRoute::Pseudo {
            debug!(
                transition = self.transition_id,
                action = action_id,
                task = %request.task,
                "pseudo action fired"
            );
            completion.confirm();
            return Ok(());
        }

        self.executor.dispatch(request, completion)?;

        if !budget.is_zero() {
            let events = self.events.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                let _ = events.send(DriverEvent::Timeout { action_id, budget });
            });
            if let Some(previous) = self.timers.insert(action_id, timer) {
                previous.abort();
            }
            trace!(
                transition = self.transition_id,
                action = action_id,
                budget_ms = budget.as_millis() as u64,
                "action timer armed"
            );
        }
        Ok(())
    }
}

/// Drives one transition against an [`ActionExecutor`].
pub struct Driver {
    transition: Transition,
    executor: Arc<dyn ActionExecutor>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    timers: HashMap<i32, JoinHandle<()>>,
    status_tx: watch::Sender<TransitionStatus>,
}

impl Driver {
    pub fn new(graph: Graph, policy: ExecutionPolicy, executor: Arc<dyn ActionExecutor>) -> Self {
        let transition = Transition::new(graph, policy);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(transition.status());
        Self {
            transition,
            executor,
            events_tx,
            events_rx,
            timers: HashMap::new(),
            status_tx,
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            events: self.events_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    /// Run until the transition reaches a terminal status.
    pub async fn run(mut self) -> TransitionReport {
        let graph = self.transition.graph();
        info!(
            transition = graph.id(),
            source = graph.source(),
            actions = graph.action_count(),
            synapses = graph.synapses().len(),
            batch_limit = graph.batch_limit(),
            "transition started"
        );
        diagnostics::log_graph(Level::TRACE, graph, &self.transition.policy().readiness);

        let status = loop {
            self.drain_events();

            let status = self.pass();
            if status.is_terminal() {
                break status;
            }
            if self.transition.in_flight() == 0 {
                continue;
            }

            match self.events_rx.recv().await {
                Some(event) => self.apply(event),
                None => {
                    warn!(transition = self.transition.graph().id(), "event channel closed");
                    break status;
                }
            }
        };

        self.finish(status)
    }

    fn pass(&mut self) -> TransitionStatus {
        let mut bridge = Bridge {
            transition_id: self.transition.graph().id(),
            executor: self.executor.as_ref(),
            events: &self.events_tx,
            timers: &mut self.timers,
        };
        let status = self.transition.execute_pass(&mut bridge);
        self.status_tx.send_replace(status);
        status
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Completed { action_id, result } => {
                self.disarm(action_id);
                self.record(action_id, result);
            }
            DriverEvent::Timeout { action_id, budget } => {
                self.timers.remove(&action_id);
                if !self.transition.is_in_flight(action_id) {
                    trace!(action = action_id, "timer fired for settled action");
                    return;
                }
                if let Some(action) = self.transition.graph().find_action(action_id) {
                    error!(
                        transition = self.transition.graph().id(),
                        action = action_id,
                        node = action.target.as_deref().unwrap_or("local"),
                        operation = action.key(),
                        budget_ms = budget.as_millis() as u64,
                        "action timer expired"
                    );
                }
                self.executor.cancel(action_id);
                self.record(action_id, ActionResult::TimedOut);
            }
            DriverEvent::Abort { mode, reason } => {
                for action_id in self.transition.request_abort(mode, &reason) {
                    self.disarm(action_id);
                    self.executor.cancel(action_id);
                }
            }
        }
    }

    fn record(&mut self, action_id: i32, result: ActionResult) {
        match self.transition.record_result(action_id, result) {
            Ok(SynapseState::Failed) => diagnostics::log_action(
                Level::WARN,
                self.transition.graph(),
                action_id,
                &self.transition.policy().readiness,
            ),
            Ok(state) => trace!(action = action_id, synapse_state = state.label(), "result applied"),
            Err(err) => warn!(
                transition = self.transition.graph().id(),
                action = action_id,
                error = %err,
                "ignoring stale result"
            ),
        }
    }

    fn disarm(&mut self, action_id: i32) {
        if let Some(timer) = self.timers.remove(&action_id) {
            timer.abort();
        }
    }

    fn finish(mut self, status: TransitionStatus) -> TransitionReport {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        self.status_tx.send_replace(status);

        let graph = self.transition.graph();
        let diagnostics = diagnostics::render_graph(graph, &self.transition.policy().readiness);
        let level = if status == TransitionStatus::Complete {
            Level::DEBUG
        } else {
            Level::INFO
        };
        for line in &diagnostics {
            diagnostics::emit(level, line);
        }

        let summary = diagnostics::summarize(graph);
        let abort_reason = self.transition.abort_reason().map(str::to_string);
        info!(
            transition = graph.id(),
            %status,
            failed = summary.failed_actions.len(),
            "transition finished"
        );

        TransitionReport {
            status,
            abort_reason,
            summary,
            diagnostics,
            graph: self.transition.into_graph(),
        }
    }
}

/// Convenience: drive `graph` to completion with a fresh driver.
pub async fn drive(
    graph: Graph,
    policy: ExecutionPolicy,
    executor: Arc<dyn ActionExecutor>,
) -> TransitionReport {
    Driver::new(graph, policy, executor).run().await
}

