//! Transition: the execution state machine for one graph.
//!
//! `Transition` is the only writer of graph status flags. Each call to
//! [`Transition::execute_pass`] dispatches whatever is ready (within the
//! batch limit) and reports where the transition stands; results flow back
//! through [`Transition::record_result`] one at a time.
//!
//! Per action: `pending -> dispatched -> {confirmed | failed}`.
//! Per synapse: `pending -> ready -> executed -> {confirmed | failed}`.
//! Per transition: `active | pending -> {complete | stopped | terminated |
//! action_failed | failed}`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use tgraph_score::SCORE_INFINITY;
use tracing::{Level, debug, error, info, trace, warn};

use crate::action::{Action, ActionKind, ActionRoute};
use crate::diagnostics::emit;
use crate::error::{DispatchError, GraphError, GraphResult};
use crate::graph::{ActionLocation, Graph};
use crate::readiness::{self, ReadinessPolicy};
use crate::synapse::SynapseState;

/// Where a transition stands after a scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    /// The last pass dispatched something.
    Active,
    /// Nothing dispatched, but actions are still in flight.
    Pending,
    /// Every synapse confirmed.
    Complete,
    /// Gracefully aborted; in-flight work finished first.
    Stopped,
    /// Forcibly aborted, or no further progress was possible.
    Terminated,
    /// A failure stopped further dispatch.
    ActionFailed,
    /// Ran to the end with failures.
    Failed,
}

impl TransitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionStatus::Active => "active",
            TransitionStatus::Pending => "pending",
            TransitionStatus::Complete => "complete",
            TransitionStatus::Stopped => "stopped",
            TransitionStatus::Terminated => "terminated",
            TransitionStatus::ActionFailed => "action_failed",
            TransitionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransitionStatus::Active | TransitionStatus::Pending)
    }
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to undispatched work once a synapse fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Once an action without `can_fail` fails, start only must-run
    /// (`+INFINITY` priority) synapses; report `action_failed` once in-flight
    /// work settles.
    #[default]
    FailFast,
    /// Keep dispatching anything not blocked by the failure.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    pub failure: FailurePolicy,
    pub readiness: ReadinessPolicy,
}

/// How an abort treats in-flight actions. `Terminate` outranks `Stop`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AbortMode {
    /// Let in-flight actions finish.
    Stop,
    /// Cancel in-flight actions.
    Terminate,
}

/// Outcome of one dispatched action, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Confirmed,
    Failed { reason: String },
    TimedOut,
}

/// Everything the executor needs to run one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub transition_id: i32,
    pub synapse_id: i32,
    pub action_id: i32,
    pub kind: ActionKind,
    pub route: ActionRoute,
    pub task: String,
    pub task_key: Option<String>,
    pub target: Option<String>,
    pub router: Option<String>,
    pub resource: Option<String>,
    pub params: BTreeMap<String, String>,
    /// Recurring interval for monitors; zero for one-shot actions.
    pub interval: Duration,
    /// Time allowed before the action counts as failed. Zero arms no timer.
    pub timeout: Duration,
}

impl DispatchRequest {
    fn for_action(transition_id: i32, synapse_id: i32, action: &Action, timeout: Duration) -> Self {
        Self {
            transition_id,
            synapse_id,
            action_id: action.id,
            kind: action.kind,
            route: action.route(),
            task: action.task.clone(),
            task_key: action.task_key.clone(),
            target: action.target.clone(),
            router: action.router.clone(),
            resource: action.resource.clone(),
            params: action.params.clone(),
            interval: action.interval,
            timeout,
        }
    }
}

/// Hands actions to whatever runs them. Must not wait for the result.
pub trait Dispatcher {
    fn dispatch(&mut self, request: DispatchRequest) -> Result<(), DispatchError>;
}

impl<F> Dispatcher for F
where
    F: FnMut(DispatchRequest) -> Result<(), DispatchError>,
{
    fn dispatch(&mut self, request: DispatchRequest) -> Result<(), DispatchError> {
        self(request)
    }
}

/// Synapse counts from the most recent pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PassCounters {
    /// Confirmed before the pass began.
    completed: usize,
    /// Executed and not yet resolved before the pass began.
    pending: usize,
    /// Dispatched during the pass.
    fired: usize,
    /// Failed, or passed over after a failure.
    skipped: usize,
    /// Not ready, throttled, or failed to dispatch.
    incomplete: usize,
}

#[derive(Debug, Clone)]
struct AbortRequest {
    mode: AbortMode,
    reason: String,
}

/// Timer budget for an action: its own timeout (the fencing timeout for
/// fencing) plus the network delay. Pseudo actions carry no timer.
pub fn timeout_budget(action: &Action, network_delay: Duration, stonith_timeout: Duration) -> Duration {
    match action.route() {
        ActionRoute::Pseudo => Duration::ZERO,
        ActionRoute::Fencing => stonith_timeout + network_delay,
        ActionRoute::Resource | ActionRoute::Cluster => action.timeout + network_delay,
    }
}

/// Execution state of one transition graph.
#[derive(Debug)]
pub struct Transition {
    graph: Graph,
    policy: ExecutionPolicy,
    in_flight: BTreeSet<i32>,
    abort: Option<AbortRequest>,
    status: TransitionStatus,
}

impl Transition {
    pub fn new(graph: Graph, policy: ExecutionPolicy) -> Self {
        Self {
            graph,
            policy,
            in_flight: BTreeSet::new(),
            abort: None,
            status: TransitionStatus::Pending,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Status reported by the most recent pass.
    pub fn status(&self) -> TransitionStatus {
        self.status
    }

    /// Number of actions dispatched and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_actions(&self) -> impl Iterator<Item = i32> + '_ {
        self.in_flight.iter().copied()
    }

    pub fn is_in_flight(&self, action_id: i32) -> bool {
        self.in_flight.contains(&action_id)
    }

    pub fn abort_mode(&self) -> Option<AbortMode> {
        self.abort.as_ref().map(|a| a.mode)
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort.as_ref().map(|a| a.reason.as_str())
    }

    /// Run one scheduling pass: dispatch what is ready, then report status.
    ///
    /// Once a terminal status is reached, further passes return it
    /// unchanged and dispatch nothing.
    pub fn execute_pass<D>(&mut self, dispatcher: &mut D) -> TransitionStatus
    where
        D: Dispatcher + ?Sized,
    {
        if self.status.is_terminal() {
            return self.status;
        }

        let mut counters = PassCounters::default();
        for synapse in self.graph.synapses() {
            let flags = synapse.flags();
            if flags.confirmed {
                counters.completed += 1;
            } else if flags.executed && !flags.failed {
                counters.pending += 1;
            }
        }
        trace!(
            transition = self.graph.id(),
            completed = counters.completed,
            pending = counters.pending,
            "executing graph"
        );

        if self.abort.is_none() {
            self.dispatch_ready(dispatcher, &mut counters);
        } else {
            self.clear_ready();
        }

        let status = self.conclude(&counters);
        self.status = status;
        self.log_pass(&counters);
        status
    }

    /// Apply an executor result to the action and its synapse.
    ///
    /// Results for actions that are unknown or not in flight (duplicates,
    /// late results after termination) are rejected without changing state.
    pub fn record_result(
        &mut self,
        action_id: i32,
        result: ActionResult,
    ) -> GraphResult<SynapseState> {
        let loc = self
            .graph
            .locate(action_id)
            .ok_or(GraphError::UnknownAction(action_id))?;
        if !self.in_flight.remove(&action_id) {
            return Err(GraphError::NotInFlight(action_id));
        }

        let transition = self.graph.id();
        let action = self.graph.action_mut(loc);
        match &result {
            ActionResult::Confirmed => {
                action.mark_confirmed();
                debug!(transition, action = action_id, "action confirmed");
            }
            ActionResult::Failed { reason } => {
                action.mark_failed();
                warn!(transition, action = action_id, %reason, "action failed");
            }
            ActionResult::TimedOut => {
                action.mark_failed();
                error!(transition, action = action_id, "action timed out");
            }
        }
        let failed = action.flags().failed;

        let synapse = self.graph.synapse_mut(loc.synapse);
        if failed {
            if !synapse.flags().failed {
                warn!(transition, synapse = synapse.id, "synapse failed");
            }
            synapse.mark_failed();
        } else if synapse.refresh_confirmed() {
            debug!(transition, synapse = synapse.id, "synapse confirmed");
        }
        Ok(synapse.state())
    }

    /// Abort the transition. No further actions are dispatched.
    ///
    /// `Terminate` also fails every in-flight action immediately and returns
    /// their ids so the caller can cancel them at the executor. Requests
    /// never downgrade an earlier `Terminate`.
    pub fn request_abort(&mut self, mode: AbortMode, reason: &str) -> Vec<i32> {
        let transition = self.graph.id();
        if self.status.is_terminal() {
            info!(transition, %reason, status = %self.status, "abort ignored: transition already finished");
            return Vec::new();
        }

        match &mut self.abort {
            None => {
                info!(transition, ?mode, %reason, "transition aborted");
                self.abort = Some(AbortRequest {
                    mode,
                    reason: reason.to_string(),
                });
            }
            Some(current) if mode > current.mode => {
                info!(
                    transition,
                    ?mode,
                    superseded = %current.reason,
                    %reason,
                    "abort upgraded"
                );
                current.mode = mode;
                current.reason = reason.to_string();
            }
            Some(current) => {
                debug!(transition, ?mode, current = ?current.mode, %reason, "abort already requested");
            }
        }

        if self.abort_mode() != Some(AbortMode::Terminate) {
            return Vec::new();
        }

        let cancelled: Vec<i32> = self.in_flight.iter().copied().collect();
        for &action_id in &cancelled {
            let result = ActionResult::Failed {
                reason: "terminated".to_string(),
            };
            if let Err(err) = self.record_result(action_id, result) {
                warn!(transition, action = action_id, error = %err, "could not terminate action");
            }
        }
        cancelled
    }

    /// Fail-fast applies once an action without `can_fail` has failed.
    fn fail_fast_tripped(&self) -> bool {
        self.policy.failure == FailurePolicy::FailFast
            && self.graph.actions().any(|a| a.flags().failed && !a.can_fail)
    }

    fn any_failed(&self) -> bool {
        self.graph.synapses().iter().any(|s| s.flags().failed)
    }

    /// Synapses that never started lose their `ready` mark once nothing more
    /// will be dispatched.
    fn clear_ready(&mut self) {
        for idx in 0..self.graph.synapses().len() {
            if !self.graph.synapses()[idx].flags().executed {
                self.graph.synapse_mut(idx).set_ready(false);
            }
        }
    }

    fn batch_full(&self) -> bool {
        let limit = self.graph.batch_limit() as usize;
        limit > 0 && self.in_flight.len() >= limit
    }

    fn dispatch_ready<D>(&mut self, dispatcher: &mut D, counters: &mut PassCounters)
    where
        D: Dispatcher + ?Sized,
    {
        let mut tripped = self.fail_fast_tripped();
        let mut throttled = false;

        for idx in 0..self.graph.synapses().len() {
            if !throttled && self.batch_full() {
                debug!(
                    transition = self.graph.id(),
                    batch_limit = self.graph.batch_limit(),
                    "throttling graph execution: batch limit reached"
                );
                throttled = true;
            }

            let synapse = &self.graph.synapses()[idx];
            let flags = synapse.flags();
            if flags.failed {
                counters.skipped += 1;
                continue;
            }
            if flags.confirmed {
                continue;
            }
            if flags.executed {
                // Started on an earlier pass with more actions than free slots.
                if !throttled && self.has_undispatched(idx) && !self.send(idx, dispatcher) {
                    tripped = self.fail_fast_tripped();
                }
                continue;
            }

            let ready = readiness::is_ready(&self.graph, synapse, &self.policy.readiness);
            let synapse_id = synapse.id;
            let priority = synapse.priority;

            if !ready {
                trace!(synapse = synapse_id, "synapse cannot fire");
                self.graph.synapse_mut(idx).set_ready(false);
                counters.incomplete += 1;
                continue;
            }

            // After a failure only must-run synapses still start.
            if tripped && priority < SCORE_INFINITY {
                trace!(synapse = synapse_id, priority, "skipping synapse after failure");
                self.graph.synapse_mut(idx).set_ready(false);
                counters.skipped += 1;
                continue;
            }

            self.graph.synapse_mut(idx).set_ready(true);
            if throttled {
                counters.incomplete += 1;
                continue;
            }

            self.graph.synapse_mut(idx).mark_executed();
            if self.send(idx, dispatcher) {
                counters.fired += 1;
            } else {
                counters.incomplete += 1;
                tripped = self.fail_fast_tripped();
            }
        }
    }

    fn has_undispatched(&self, idx: usize) -> bool {
        let synapse = &self.graph.synapses()[idx];
        !synapse.flags().failed && synapse.actions.iter().any(|a| !a.flags().executed)
    }

    /// Hand the synapse's undispatched actions to the dispatcher while batch
    /// slots remain. A rejected dispatch fails the action and its synapse;
    /// later actions of that synapse are not sent.
    fn send<D>(&mut self, idx: usize, dispatcher: &mut D) -> bool
    where
        D: Dispatcher + ?Sized,
    {
        let transition = self.graph.id();
        let network_delay = self.graph.network_delay();
        let stonith_timeout = self.graph.stonith_timeout();
        let width = self.graph.synapses()[idx].actions.len();

        for a in 0..width {
            if self.batch_full() {
                break;
            }
            let loc = ActionLocation {
                synapse: idx,
                action: a,
            };
            let synapse = &self.graph.synapses()[idx];
            let action = &synapse.actions[a];
            if action.flags().executed {
                continue;
            }
            let timeout = timeout_budget(action, network_delay, stonith_timeout);
            let request = DispatchRequest::for_action(transition, synapse.id, action, timeout);
            let action_id = request.action_id;
            let synapse_id = request.synapse_id;

            self.graph.action_mut(loc).mark_executed();
            trace!(transition, action = action_id, route = %request.route, "initiating action");

            match dispatcher.dispatch(request) {
                Ok(()) => {
                    self.in_flight.insert(action_id);
                }
                Err(err) => {
                    error!(
                        transition,
                        action = action_id,
                        synapse = synapse_id,
                        error = %err,
                        "failed initiating action"
                    );
                    let action = self.graph.action_mut(loc);
                    action.mark_confirmed();
                    action.mark_failed();
                    self.graph.synapse_mut(idx).mark_failed();
                    return false;
                }
            }
        }

        if width == 0 {
            self.graph.synapse_mut(idx).refresh_confirmed();
        }
        true
    }

    fn conclude(&self, counters: &PassCounters) -> TransitionStatus {
        let in_flight = !self.in_flight.is_empty();

        if let Some(abort) = &self.abort {
            return match (in_flight, abort.mode) {
                (true, _) => TransitionStatus::Pending,
                (false, AbortMode::Stop) => TransitionStatus::Stopped,
                (false, AbortMode::Terminate) => TransitionStatus::Terminated,
            };
        }

        let any_failed = self.any_failed();
        if self.fail_fast_tripped() {
            return if counters.fired > 0 {
                TransitionStatus::Active
            } else if in_flight {
                TransitionStatus::Pending
            } else {
                TransitionStatus::ActionFailed
            };
        }

        if counters.fired > 0 {
            TransitionStatus::Active
        } else if in_flight {
            TransitionStatus::Pending
        } else if self.graph.synapses().iter().all(|s| s.is_resolved()) {
            if any_failed {
                TransitionStatus::Failed
            } else {
                TransitionStatus::Complete
            }
        } else if any_failed {
            TransitionStatus::Failed
        } else {
            TransitionStatus::Terminated
        }
    }

    fn log_pass(&self, counters: &PassCounters) {
        let (level, label) = match self.status {
            TransitionStatus::Active | TransitionStatus::Pending => (Level::DEBUG, "In progress"),
            TransitionStatus::Complete => (Level::INFO, "Complete"),
            TransitionStatus::Stopped => (Level::INFO, "Stopped"),
            TransitionStatus::Terminated => (Level::WARN, "Terminated"),
            TransitionStatus::ActionFailed => (Level::WARN, "Failed (action)"),
            TransitionStatus::Failed => (Level::WARN, "Failed"),
        };
        emit(
            level,
            &format!(
                "Transition {} (Complete={}, Pending={}, Fired={}, Skipped={}, Incomplete={}, Source={}): {}",
                self.graph.id(),
                counters.completed,
                counters.pending,
                counters.fired,
                counters.skipped,
                counters.incomplete,
                self.graph.source(),
                label
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::graph::GraphBuilder;
    use crate::readiness::pending_inputs;
    use crate::synapse::Synapse;

    /// Records dispatch order; rejects the listed action ids.
    #[derive(Default)]
    struct Recorder {
        order: Vec<i32>,
        reject: Vec<i32>,
    }

    impl Dispatcher for Recorder {
        fn dispatch(&mut self, request: DispatchRequest) -> Result<(), DispatchError> {
            if self.reject.contains(&request.action_id) {
                return Err(DispatchError::Rejected {
                    action_id: request.action_id,
                    reason: "agent missing".to_string(),
                });
            }
            self.order.push(request.action_id);
            Ok(())
        }
    }

    /// A -> B -> C, one action each (ids 1, 2, 3).
    fn chain(batch_limit: u32) -> Graph {
        let a = Action::resource(1, "db", "start", "node1");
        let b = Action::resource(2, "app", "start", "node1");
        let c = Action::resource(3, "web", "start", "node2");
        GraphBuilder::new(10)
            .batch_limit(batch_limit)
            .synapse(Synapse::new(0, 0).with_action(a.clone()))
            .synapse(Synapse::new(1, 0).with_action(b.clone()).after(&a))
            .synapse(Synapse::new(2, 0).with_action(c).after(&b))
            .build()
            .unwrap()
    }

    fn independent(count: i32, batch_limit: u32) -> Graph {
        let mut builder = GraphBuilder::new(20).batch_limit(batch_limit);
        for i in 0..count {
            builder = builder.synapse(
                Synapse::new(i, 0).with_action(Action::resource(i + 1, "r", "start", "n1")),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn linear_chain_runs_in_order() {
        let mut t = Transition::new(chain(1), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(rec.order, vec![1]);
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Pending);
        assert_eq!(rec.order, vec![1]);

        t.record_result(1, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(rec.order, vec![1, 2]);

        t.record_result(2, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(rec.order, vec![1, 2, 3]);

        t.record_result(3, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Complete);
        assert_eq!(rec.order, vec![1, 2, 3]);
        assert_eq!(t.in_flight(), 0);
        assert!(t.graph().synapses().iter().all(|s| s.state() == SynapseState::Completed));
    }

    #[test]
    fn dependent_never_ready_before_input_confirms() {
        let mut t = Transition::new(chain(0), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        // Dispatched but not confirmed: B stays pending on every pass.
        for _ in 0..3 {
            t.execute_pass(&mut rec);
            assert_eq!(t.graph().synapses()[1].state(), SynapseState::Pending);
        }
        assert_eq!(rec.order, vec![1]);

        t.record_result(1, ActionResult::Confirmed).unwrap();
        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1, 2]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::InFlight);
    }

    #[test]
    fn failure_in_chain_stops_dependents() {
        let mut t = Transition::new(chain(1), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        let state = t
            .record_result(
                1,
                ActionResult::Failed {
                    reason: "not installed".to_string(),
                },
            )
            .unwrap();
        assert_eq!(state, SynapseState::Failed);

        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::ActionFailed);
        assert_eq!(rec.order, vec![1]);

        let graph = t.graph();
        let policy = ReadinessPolicy::default();
        assert_eq!(pending_inputs(graph, &graph.synapses()[1], &policy), vec![1]);
        assert_eq!(pending_inputs(graph, &graph.synapses()[2], &policy), vec![2]);
        assert!(!graph.synapses()[1].flags().executed);
        assert!(!graph.synapses()[2].flags().executed);
        assert_eq!(graph.actions().filter(|a| a.flags().failed).count(), 1);
    }

    #[test]
    fn graceful_abort_leaves_rest_pending() {
        let mut t = Transition::new(chain(1), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        t.record_result(1, ActionResult::Confirmed).unwrap();
        assert!(t.request_abort(AbortMode::Stop, "new cluster event").is_empty());

        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Stopped);
        assert_eq!(rec.order, vec![1]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::Pending);
        assert_eq!(t.graph().synapses()[2].state(), SynapseState::Pending);
        assert_eq!(t.abort_reason(), Some("new cluster event"));
    }

    #[test]
    fn graceful_abort_waits_for_in_flight() {
        let mut t = Transition::new(independent(2, 0), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        t.request_abort(AbortMode::Stop, "operator");
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Pending);

        t.record_result(1, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Pending);
        t.record_result(2, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Stopped);
    }

    #[test]
    fn terminate_cancels_in_flight() {
        let mut t = Transition::new(independent(3, 2), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1, 2]);

        t.request_abort(AbortMode::Stop, "first");
        let cancelled = t.request_abort(AbortMode::Terminate, "shutdown");
        assert_eq!(cancelled, vec![1, 2]);
        assert_eq!(t.abort_mode(), Some(AbortMode::Terminate));
        assert_eq!(t.abort_reason(), Some("shutdown"));
        assert_eq!(t.in_flight(), 0);

        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Terminated);
        assert_eq!(rec.order, vec![1, 2]);

        // A late result for a terminated action is rejected.
        assert!(matches!(
            t.record_result(1, ActionResult::Confirmed),
            Err(GraphError::NotInFlight(1))
        ));
        // Stop never downgrades terminate.
        t.request_abort(AbortMode::Stop, "again");
        assert_eq!(t.abort_mode(), Some(AbortMode::Terminate));
    }

    #[test]
    fn batch_limit_is_never_exceeded() {
        let mut t = Transition::new(independent(7, 3), ExecutionPolicy::default());
        let mut rec = Recorder::default();
        let mut next = 1;

        loop {
            let status = t.execute_pass(&mut rec);
            assert!(t.in_flight() <= 3, "in flight {} exceeds limit", t.in_flight());
            if status.is_terminal() {
                assert_eq!(status, TransitionStatus::Complete);
                break;
            }
            t.record_result(next, ActionResult::Confirmed).unwrap();
            next += 1;
        }
        assert_eq!(rec.order, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn throttled_synapses_keep_declaration_order() {
        let a = Action::resource(1, "a", "start", "n1");
        let graph = GraphBuilder::new(1)
            .batch_limit(2)
            .synapse(Synapse::new(0, 0).with_action(a))
            .synapse(
                Synapse::new(1, 0)
                    .with_action(Action::resource(2, "b", "start", "n1"))
                    .with_action(Action::resource(3, "b", "start", "n2")),
            )
            .synapse(Synapse::new(2, 100).with_action(Action::resource(4, "c", "start", "n1")))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        // Synapse 1 takes the last slot; synapse 2 waits behind it.
        assert_eq!(rec.order, vec![1, 2]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::InFlight);
        assert_eq!(t.graph().synapses()[2].state(), SynapseState::Ready);

        t.record_result(1, ActionResult::Confirmed).unwrap();
        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1, 2, 3]);

        t.record_result(2, ActionResult::Confirmed).unwrap();
        t.record_result(3, ActionResult::Confirmed).unwrap();
        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn wide_synapse_is_dispatched_within_batch_limit() {
        let graph = GraphBuilder::new(1)
            .batch_limit(1)
            .synapse(
                Synapse::new(0, 0)
                    .with_action(Action::resource(1, "a", "start", "n1"))
                    .with_action(Action::resource(2, "a", "start", "n2"))
                    .with_action(Action::resource(3, "a", "start", "n3")),
            )
            .synapse(Synapse::new(1, 0).with_action(Action::resource(4, "b", "start", "n1")))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut rec = Recorder::default();

        loop {
            let status = t.execute_pass(&mut rec);
            assert!(t.in_flight() <= 1, "in flight {} exceeds limit", t.in_flight());
            if status.is_terminal() {
                assert_eq!(status, TransitionStatus::Complete);
                break;
            }
            let running: Vec<i32> = t.in_flight_actions().collect();
            for id in running {
                t.record_result(id, ActionResult::Confirmed).unwrap();
            }
        }
        assert_eq!(rec.order, vec![1, 2, 3, 4]);
        assert!(t.graph().synapses().iter().all(|s| s.state() == SynapseState::Completed));
    }

    #[test]
    fn can_fail_input_does_not_trip_fail_fast() {
        let a = Action::resource(1, "ping", "start", "n1").allow_failure();
        let graph = GraphBuilder::new(1)
            .synapse(Synapse::new(0, 0).with_action(a.clone()))
            .synapse(Synapse::new(1, 0).with_action(Action::resource(2, "b", "start", "n1")).after(&a))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        t.record_result(
            1,
            ActionResult::Failed {
                reason: "not running".to_string(),
            },
        )
        .unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(rec.order, vec![1, 2]);

        t.record_result(2, ActionResult::Confirmed).unwrap();
        // The tolerated failure still counts against the outcome.
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Failed);
    }

    #[test]
    fn must_run_synapse_fires_after_failure() {
        let a = Action::resource(1, "db", "stop", "n1");
        let graph = GraphBuilder::new(1)
            .batch_limit(1)
            .synapse(Synapse::new(0, 0).with_action(a.clone()))
            .synapse(Synapse::new(1, 0).with_action(Action::resource(4, "web", "start", "n2")))
            .synapse(
                Synapse::new(2, SCORE_INFINITY)
                    .with_action(Action::new(2, ActionKind::Cluster, "stonith").with_target("n1"))
                    .after(&a),
            )
            .synapse(Synapse::new(3, 0).with_action(Action::resource(3, "db", "start", "n2")).after(&a))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1]);
        t.record_result(1, ActionResult::TimedOut).unwrap();

        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(rec.order, vec![1, 2]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::Pending);
        assert_eq!(t.graph().synapses()[3].state(), SynapseState::Pending);

        t.record_result(2, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::ActionFailed);
        assert_eq!(rec.order, vec![1, 2]);
    }

    #[test]
    fn abort_leaves_throttled_synapse_pending() {
        let mut t = Transition::new(independent(2, 1), ExecutionPolicy::default());
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::Ready);

        t.request_abort(AbortMode::Stop, "new cluster event");
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Pending);
        t.record_result(1, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Stopped);
        assert_eq!(rec.order, vec![1]);
        assert_eq!(t.graph().synapses()[1].state(), SynapseState::Pending);
    }

    #[test]
    fn rejected_dispatch_fails_synapse() {
        let mut t = Transition::new(chain(0), ExecutionPolicy::default());
        let mut rec = Recorder {
            reject: vec![1],
            ..Default::default()
        };
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::ActionFailed);
        let synapse = &t.graph().synapses()[0];
        assert_eq!(synapse.state(), SynapseState::Failed);
        assert!(t.graph().find_action(1).unwrap().flags().failed);
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn continue_policy_runs_independent_work() {
        let policy = ExecutionPolicy {
            failure: FailurePolicy::Continue,
            ..Default::default()
        };
        let a = Action::resource(1, "a", "start", "n1");
        let graph = GraphBuilder::new(1)
            .synapse(Synapse::new(0, 0).with_action(a.clone()))
            .synapse(Synapse::new(1, 0).with_action(Action::resource(2, "b", "start", "n1")).after(&a))
            .synapse(Synapse::new(2, 0).with_action(Action::resource(3, "c", "start", "n1")))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, policy);
        let mut rec = Recorder::default();

        t.execute_pass(&mut rec);
        assert_eq!(rec.order, vec![1, 3]);
        t.record_result(1, ActionResult::TimedOut).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Pending);
        t.record_result(3, ActionResult::Confirmed).unwrap();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Failed);
        assert_eq!(rec.order, vec![1, 3]);
    }

    #[test]
    fn unsatisfiable_graph_terminates() {
        let policy = ExecutionPolicy {
            readiness: ReadinessPolicy {
                missing_inputs_satisfied: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let graph = GraphBuilder::new(1)
            .synapse(
                Synapse::new(0, 0)
                    .with_action(Action::pseudo(1, "wait"))
                    .with_input(crate::synapse::SynapseInput::new(99, ActionKind::Resource)),
            )
            .build()
            .unwrap();
        let mut t = Transition::new(graph, policy);
        assert_eq!(t.execute_pass(&mut Recorder::default()), TransitionStatus::Terminated);
    }

    #[test]
    fn empty_synapse_confirms_immediately() {
        let graph = GraphBuilder::new(1)
            .synapse(Synapse::new(0, 0))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut rec = Recorder::default();
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Active);
        assert_eq!(t.execute_pass(&mut rec), TransitionStatus::Complete);
    }

    #[test]
    fn unknown_and_duplicate_results_are_rejected() {
        let mut t = Transition::new(chain(0), ExecutionPolicy::default());
        let mut rec = Recorder::default();
        t.execute_pass(&mut rec);

        assert!(matches!(
            t.record_result(42, ActionResult::Confirmed),
            Err(GraphError::UnknownAction(42))
        ));
        assert!(matches!(
            t.record_result(2, ActionResult::Confirmed),
            Err(GraphError::NotInFlight(2))
        ));
        t.record_result(1, ActionResult::Confirmed).unwrap();
        assert!(matches!(
            t.record_result(1, ActionResult::Confirmed),
            Err(GraphError::NotInFlight(1))
        ));
    }

    #[test]
    fn timeout_budget_by_route() {
        let delay = Duration::from_secs(60);
        let fencing = Duration::from_secs(90);
        let rsc = Action::resource(1, "db", "start", "n1").with_timeout(Duration::from_secs(20));
        let fence = Action::new(2, ActionKind::Cluster, "stonith");
        let pseudo = Action::pseudo(3, "all_stopped");

        assert_eq!(timeout_budget(&rsc, delay, fencing), Duration::from_secs(80));
        assert_eq!(timeout_budget(&fence, delay, fencing), Duration::from_secs(150));
        assert_eq!(timeout_budget(&pseudo, delay, fencing), Duration::ZERO);
    }

    #[test]
    fn closures_dispatch() {
        let mut t = Transition::new(independent(2, 0), ExecutionPolicy::default());
        let mut seen = Vec::new();
        let mut dispatch = |request: DispatchRequest| -> Result<(), DispatchError> {
            seen.push((request.action_id, request.route));
            Ok(())
        };
        t.execute_pass(&mut dispatch);
        assert_eq!(
            seen,
            vec![(1, ActionRoute::Resource), (2, ActionRoute::Resource)]
        );
    }

    #[test]
    fn dispatch_carries_monitor_interval() {
        let mut monitor = Action::resource(1, "db", "monitor", "n1").with_key("db_monitor_10000");
        monitor.interval = Duration::from_secs(10);
        let graph = GraphBuilder::new(1)
            .synapse(Synapse::new(0, 0).with_action(monitor))
            .build()
            .unwrap();
        let mut t = Transition::new(graph, ExecutionPolicy::default());
        let mut seen = Vec::new();
        let mut dispatch = |request: DispatchRequest| -> Result<(), DispatchError> {
            seen.push(request);
            Ok(())
        };
        t.execute_pass(&mut dispatch);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].interval, Duration::from_secs(10));
        assert_eq!(seen[0].task_key.as_deref(), Some("db_monitor_10000"));
    }

    #[test]
    fn status_names() {
        assert_eq!(TransitionStatus::ActionFailed.to_string(), "action_failed");
        assert!(TransitionStatus::Stopped.is_terminal());
        assert!(!TransitionStatus::Pending.is_terminal());
    }
}
