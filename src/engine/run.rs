//! Graph walk of a single run.
//!
//! A run is walked by one task with an explicit depth-first stack: a node's
//! next nodes are pushed in reverse so they pop in edge-definition order, and
//! each branch runs to completion before its next sibling starts.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    ChainError, Result,
    common::Vars,
    events::{GraphEvent, Message, NodeEvent, RunEvent, RunSuspendedEvent},
    model::{NodeModel, NodeType},
    runtime::{ChainState, Context, NodeId, NodeState, RunError, RunStatus, SuspendParam},
    store::data::{ExecRecord, ExecStep, SuspendDetail},
    utils,
    workflow::{
        Definition,
        consts::{CONDITION_KEY, DEFAULT_BRANCH},
        executors::{Outcome, validate_config},
    },
};

use super::EngineInner;

/// Everything the engine keeps for one tracked run.
pub(crate) struct RunSlot {
    state: RwLock<ChainState>,
    record: RwLock<ExecRecord>,
    /// Step row of the node currently executing.
    step: Mutex<Option<ExecStep>>,
    seq: AtomicI64,

    pub(crate) definition: Arc<Definition>,
    pub(crate) cancel: CancellationToken,
    pub(crate) depth: usize,
}

impl RunSlot {
    pub(crate) fn new(
        state: ChainState,
        record: ExecRecord,
        definition: Arc<Definition>,
        cancel: CancellationToken,
        depth: usize,
    ) -> Self {
        Self {
            state: RwLock::new(state),
            record: RwLock::new(record),
            step: Mutex::new(None),
            seq: AtomicI64::new(0),
            definition,
            cancel,
            depth,
        }
    }

    /// Continue step numbering after `seq` rows already written.
    pub(crate) fn with_seq(
        self,
        seq: i64,
    ) -> Self {
        self.seq.store(seq, Ordering::SeqCst);
        self
    }

    pub(crate) fn snapshot(&self) -> ChainState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn update<R>(
        &self,
        f: impl FnOnce(&mut ChainState) -> R,
    ) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let ret = f(&mut state);
        state.updated_at = utils::time::time_millis();
        ret
    }

    pub(crate) fn status(&self) -> RunStatus {
        self.state.read().unwrap_or_else(PoisonError::into_inner).status
    }

    pub(crate) fn is_running(&self) -> bool {
        self.status() == RunStatus::Running
    }

    /// Id of the node currently executing, if any.
    pub(crate) fn running_node(&self) -> Option<NodeId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.node_states.values().find(|n| n.status == RunStatus::Running).map(|n| n.node_id.clone())
    }

    fn variables(&self) -> Vars {
        self.state.read().unwrap_or_else(PoisonError::into_inner).variables.clone()
    }

    pub(crate) fn execute_id(&self) -> String {
        self.state.read().unwrap_or_else(PoisonError::into_inner).execute_id.clone()
    }
}

/// What the walk does after a node.
enum Flow {
    Next(Vec<NodeId>),
    Suspend(Vec<SuspendParam>),
    Stop,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Target of the first outgoing edge taken for the branch `selected`.
pub(crate) fn select_branch(
    definition: &Definition,
    node_id: &str,
    selected: &str,
) -> Option<NodeId> {
    definition.outgoing_edges(node_id).into_iter().find(|edge| edge.matches(selected)).map(|edge| edge.target.clone())
}

impl EngineInner {
    /// Walk `stack` and contain any panic raised by an executor.
    pub(crate) async fn drive(
        &self,
        slot: Arc<RunSlot>,
        stack: Vec<NodeId>,
    ) {
        if let Err(panic) = AssertUnwindSafe(self.walk(&slot, stack)).catch_unwind().await {
            let message = format!("panic: {}", panic_message(panic.as_ref()));
            let node_id = slot.running_node().unwrap_or_default();
            error!(execute_id = %slot.execute_id(), node_id = %node_id, "{}", message);

            self.fail_node(&slot, &node_id, &message);
            self.fail_run(&slot, &node_id, &message);
        }
    }

    pub(crate) async fn walk(
        &self,
        slot: &RunSlot,
        mut stack: Vec<NodeId>,
    ) {
        let mut executed = 0usize;
        while let Some(node_id) = stack.pop() {
            if !slot.is_running() {
                return;
            }
            if slot.cancel.is_cancelled() {
                self.fail_run(slot, &node_id, &ChainError::Cancelled.to_string());
                return;
            }
            executed += 1;
            if executed > self.config.max_node_executions {
                self.fail_run(slot, &node_id, &format!("run exceeded {} node executions", self.config.max_node_executions));
                return;
            }

            let Some(node) = slot.definition.node(&node_id).cloned() else {
                self.fail_run(slot, &node_id, &ChainError::NodeNotFound(node_id.clone()).to_string());
                return;
            };

            match self.run_node(slot, &node).await {
                Flow::Next(next) => stack.extend(next.into_iter().rev()),
                Flow::Suspend(params) => {
                    self.suspend_run(slot, &node, params, stack);
                    return;
                }
                Flow::Stop => return,
            }
        }

        if slot.is_running() {
            self.complete_run(slot);
        }
    }

    async fn run_node(
        &self,
        slot: &RunSlot,
        node: &NodeModel,
    ) -> Flow {
        let input = slot.variables();
        self.begin_node(slot, node, &input);

        match self.dispatch(slot, node, input).await {
            Ok(Outcome::Completed(output)) => {
                self.complete_node(slot, node, &output);

                if node.node_type == NodeType::End || slot.definition.outgoing_edges(&node.id).is_empty() {
                    self.complete_run(slot);
                    return Flow::Stop;
                }

                if node.node_type == NodeType::Condition {
                    let selected = output.get_value(CONDITION_KEY).and_then(|v| v.as_str()).unwrap_or(DEFAULT_BRANCH);
                    return match select_branch(&slot.definition, &node.id, selected) {
                        Some(target) => Flow::Next(vec![target]),
                        None => {
                            debug!(execute_id = %slot.execute_id(), node_id = %node.id, branch = selected, "no edge matches the selected branch");
                            self.complete_run(slot);
                            Flow::Stop
                        }
                    };
                }

                Flow::Next(slot.definition.next_nodes(&node.id).iter().map(|n| n.id.clone()).collect())
            }
            Ok(Outcome::Suspended(params)) => Flow::Suspend(params),
            Ok(Outcome::Failed(message)) => {
                self.fail_node(slot, &node.id, &message);
                self.fail_run(slot, &node.id, &message);
                Flow::Stop
            }
            Err(err) => {
                let message = err.node_message();
                self.fail_node(slot, &node.id, &message);
                self.fail_run(slot, &node.id, &message);
                Flow::Stop
            }
        }
    }

    /// Look up the executor, validate the node config and run it against a
    /// snapshot of the variables, racing cancellation and the node timeout.
    async fn dispatch(
        &self,
        slot: &RunSlot,
        node: &NodeModel,
        input: Vars,
    ) -> Result<Outcome> {
        let executor = self.executors.get(node.node_type.as_str()).ok_or_else(|| ChainError::UnknownNodeType(node.node_type.to_string()))?;
        validate_config(executor.as_ref(), node)?;

        let ctx = Arc::new(self.context(&slot.execute_id(), input, slot.cancel.clone(), slot.depth));
        let timeout = node.config_u64("timeoutMs").or(Some(self.config.default_node_timeout_ms)).filter(|ms| *ms > 0).map(Duration::from_millis);

        let run = async {
            match timeout {
                Some(duration) => tokio::time::timeout(duration, executor.execute(ctx, node)).await.map_err(|_| ChainError::Engine("timeout".to_string()))?,
                None => executor.execute(ctx, node).await,
            }
        };

        tokio::select! {
            _ = slot.cancel.cancelled() => Err(ChainError::Cancelled),
            ret = run => ret,
        }
    }

    pub(crate) fn context(
        &self,
        execute_id: &str,
        variables: Vars,
        cancel: CancellationToken,
        depth: usize,
    ) -> Context {
        let ctx = Context::new(execute_id, variables).with_channel(self.channel.clone()).with_cancel(cancel);
        match self.runner() {
            Some(runner) => ctx.with_subflows(runner, depth),
            None => ctx,
        }
    }

    fn emit(
        &self,
        slot: &RunSlot,
        node_id: &str,
        event: GraphEvent,
    ) {
        self.channel.emit(Message {
            execute_id: slot.execute_id(),
            node_id: node_id.to_string(),
            event,
        });
    }

    fn begin_node(
        &self,
        slot: &RunSlot,
        node: &NodeModel,
        input: &Vars,
    ) {
        let (execute_id, record_id) = slot.update(|s| (s.execute_id.clone(), s.record_id.clone()));
        let mut state = NodeState::running(&node.id, &node.display_name(), input.clone());
        let step = ExecStep {
            id: utils::longid(),
            record_id,
            exec_key: execute_id.clone(),
            seq: slot.seq.fetch_add(1, Ordering::SeqCst) + 1,
            node_id: node.id.clone(),
            node_name: state.node_name.clone(),
            input: to_json(input),
            node_data: node.data.to_string(),
            output: String::new(),
            status: RunStatus::Running.to_string(),
            error: None,
            start_time: state.start_time,
            end_time: 0,
        };
        if let Err(err) = self.store.create_step(&step) {
            warn!(execute_id = %execute_id, node_id = %node.id, "failed to create step: {}", err);
        }
        state.step_id = Some(step.id.clone());
        let start_time = state.start_time;

        *slot.step.lock().unwrap_or_else(PoisonError::into_inner) = Some(step);
        // re-execution of a node replaces its previous state
        slot.update(|s| s.node_states.insert(node.id.clone(), state));

        debug!(execute_id = %execute_id, node_id = %node.id, node_type = %node.node_type, "node running");
        self.emit(slot, &node.id, GraphEvent::Node(NodeEvent::Running(start_time)));
    }

    /// Write the outcome of the in-flight step.
    fn finish_step(
        &self,
        slot: &RunSlot,
        status: RunStatus,
        output: Option<&Vars>,
        error: Option<&str>,
    ) {
        let Some(mut step) = slot.step.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        step.status = status.to_string();
        step.output = output.map(to_json).unwrap_or_default();
        step.error = error.map(str::to_string);
        step.end_time = utils::time::time_millis();
        if let Err(err) = self.store.update_step(&step) {
            warn!(execute_id = %step.exec_key, node_id = %step.node_id, "failed to update step: {}", err);
        }
    }

    fn complete_node(
        &self,
        slot: &RunSlot,
        node: &NodeModel,
        output: &Vars,
    ) {
        let end_time = utils::time::time_millis();
        slot.update(|s| {
            s.variables.merge(output);
            if let Some(ns) = s.node_states.get_mut(&node.id) {
                ns.status = RunStatus::Completed;
                ns.output = Some(output.clone());
                ns.end_time = end_time;
            }
        });
        self.finish_step(slot, RunStatus::Completed, Some(output), None);
        self.emit(slot, &node.id, GraphEvent::Node(NodeEvent::Succeeded(end_time)));
    }

    pub(crate) fn fail_node(
        &self,
        slot: &RunSlot,
        node_id: &str,
        message: &str,
    ) {
        let updated = slot.update(|s| match s.node_states.get_mut(node_id) {
            Some(ns) if ns.status == RunStatus::Running => {
                ns.status = RunStatus::Failed;
                ns.error = Some(message.to_string());
                ns.end_time = utils::time::time_millis();
                true
            }
            _ => false,
        });
        if updated {
            self.finish_step(slot, RunStatus::Failed, None, Some(message));
            self.emit(slot, node_id, GraphEvent::Node(NodeEvent::Error(message.to_string())));
        }
    }

    pub(crate) fn fail_run(
        &self,
        slot: &RunSlot,
        node_id: &str,
        message: &str,
    ) {
        let error = RunError {
            node_id: node_id.to_string(),
            message: message.to_string(),
        };
        let moved = slot.update(|s| {
            s.transition(RunStatus::Failed).map(|_| {
                s.error = Some(error.clone());
            })
        });
        if moved.is_err() {
            return;
        }

        error!(execute_id = %slot.execute_id(), node_id, "run failed: {}", message);
        self.sync_record(slot);
        self.emit(slot, node_id, GraphEvent::Run(RunEvent::Failed(error)));
    }

    fn complete_run(
        &self,
        slot: &RunSlot,
    ) {
        let moved = slot.update(|s| {
            s.transition(RunStatus::Completed).map(|_| {
                s.result = Some(s.variables.clone());
            })
        });
        if moved.is_err() {
            return;
        }

        info!(execute_id = %slot.execute_id(), "run completed");
        self.sync_record(slot);
        self.emit(slot, "", GraphEvent::Run(RunEvent::Completed));
    }

    fn suspend_run(
        &self,
        slot: &RunSlot,
        node: &NodeModel,
        params: Vec<SuspendParam>,
        pending: Vec<NodeId>,
    ) {
        let moved = slot.update(|s| {
            s.transition(RunStatus::Suspended).map(|_| {
                if let Some(ns) = s.node_states.get_mut(&node.id) {
                    ns.status = RunStatus::Suspended;
                    ns.suspend_params = params.clone();
                    ns.end_time = utils::time::time_millis();
                }
                s.suspended_node_id = Some(node.id.clone());
                s.suspended_params = params.clone();
                s.pending = pending;
            })
        });
        if moved.is_err() {
            return;
        }

        info!(execute_id = %slot.execute_id(), node_id = %node.id, "run suspended");
        self.finish_step(slot, RunStatus::Suspended, None, None);
        self.sync_record(slot);
        self.emit(slot, &node.id, GraphEvent::Node(NodeEvent::Suspended(params.clone())));
        self.emit(
            slot,
            &node.id,
            GraphEvent::Run(RunEvent::Suspended(RunSuspendedEvent {
                node_id: node.id.clone(),
                params,
            })),
        );
    }

    /// Mirror the run state into its durable record.
    pub(crate) fn sync_record(
        &self,
        slot: &RunSlot,
    ) {
        let state = slot.snapshot();
        let now = utils::time::time_millis();

        let record = {
            let mut record = slot.record.write().unwrap_or_else(PoisonError::into_inner);
            record.status = state.status.to_string();
            record.output = state.result.as_ref().map(to_json).unwrap_or_default();
            record.error = state.error.as_ref().map(|e| e.message.clone());
            record.suspend = match (&state.status, &state.suspended_node_id) {
                (RunStatus::Suspended, Some(node_id)) => Some(to_json(&SuspendDetail {
                    node_id: node_id.clone(),
                    params: state.suspended_params.clone(),
                    variables: state.variables.clone(),
                    pending: state.pending.clone(),
                })),
                _ => None,
            };
            record.end_time = if state.status == RunStatus::Running {
                0
            } else {
                now
            };
            record.timestamp = now;
            record.clone()
        };

        if let Err(err) = self.store.update_execution_record(&record) {
            warn!(execute_id = %state.execute_id, "failed to update execution record: {}", err);
        }
    }
}
