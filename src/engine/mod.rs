//! Workflow engine - the main entry point for Chainflow.
//!
//! The engine owns the run table and drives every run:
//! - Loading deployed workflows and starting runs
//! - Walking the graph on a background task per run
//! - Suspending, resuming and cancelling runs
//! - Answering status queries from memory or from the durable records

mod run;
mod status;

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    ChainError, Config, Result,
    common::{MemCache, Vars},
    events::{GraphEvent, Message, RunEvent, RunStartedEvent},
    model::WorkflowModel,
    runtime::{ChainState, Channel, ExecuteId, NodeId, RunStatus, SubflowRunner},
    store::{Store, data::ExecRecord},
    utils,
    workflow::{
        Definition,
        executors::{ExecutorRegistry, Outcome, validate_config},
    },
};

use run::RunSlot;
pub use status::{ChainInfo, NodeInfo};

/// The workflow engine.
///
/// Cheap to clone; clones share the same run table, store and channel.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.deploy(&workflow)?;
///
/// let execute_id = engine.execute_async(&workflow.id, Vars::new().with("q", "hi"), "alice")?;
/// let info = engine.get_status(&execute_id, None)?;
/// if info.status == RunStatus::Suspended {
///     engine.resume(&execute_id, Vars::new().with("approved", true))?;
/// }
///
/// engine.shutdown();
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
    /// Runtime created by the builder when none was available.
    _runtime: Option<Arc<Runtime>>,
}

pub(crate) struct EngineInner {
    config: Config,
    store: Arc<Store>,
    channel: Arc<Channel>,
    executors: ExecutorRegistry,
    /// Runs being walked, keyed by execute id. Never evicted.
    live: RwLock<HashMap<ExecuteId, Arc<RunSlot>>>,
    /// Settled runs kept for status queries; evicted ones are read back from the store.
    runs: MemCache<ExecuteId, Arc<RunSlot>>,

    runtime: Handle,
    running: AtomicBool,
    me: Weak<EngineInner>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        store: Arc<Store>,
        channel: Arc<Channel>,
        executors: ExecutorRegistry,
        runtime: Handle,
        owned: Option<Arc<Runtime>>,
    ) -> Self {
        let runs = MemCache::new(config.run_cache_size);
        let inner = Arc::new_cyclic(|me| EngineInner {
            config,
            store,
            channel,
            executors,
            live: RwLock::new(HashMap::new()),
            runs,
            runtime,
            running: AtomicBool::new(true),
            me: me.clone(),
        });

        Self {
            inner,
            _runtime: owned,
        }
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.inner.channel.clone()
    }

    pub fn store(&self) -> Arc<Store> {
        self.inner.store.clone()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Deploys a workflow definition to the store, replacing any previous version.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        Definition::validate(workflow)?;
        self.inner.store.deploy(workflow)
    }

    /// Starts a run of `workflow_id` and returns its execute id.
    ///
    /// Loading and validating the workflow happens before this returns; the
    /// graph is walked on a background task.
    pub fn execute_async(
        &self,
        workflow_id: &str,
        input: Vars,
        actor: &str,
    ) -> Result<ExecuteId> {
        self.execute_async_with(workflow_id, input, actor, CancellationToken::new())
    }

    /// Like [`Engine::execute_async`], cancelled when `cancel` fires.
    pub fn execute_async_with(
        &self,
        workflow_id: &str,
        input: Vars,
        actor: &str,
        cancel: CancellationToken,
    ) -> Result<ExecuteId> {
        let inner = &self.inner;
        if !inner.running.load(Ordering::SeqCst) {
            return Err(ChainError::Engine("engine is shut down".to_string()));
        }

        let (slot, start) = inner.start_run(workflow_id, input, actor, cancel, 0)?;
        let execute_id = slot.snapshot().execute_id;
        inner.spawn_walk(slot, vec![start]);

        Ok(execute_id)
    }

    /// Status of a run, optionally limited to the nodes in `node_filter`.
    ///
    /// Runs no longer in the run table are rebuilt from their durable record.
    pub fn get_status(
        &self,
        execute_id: &str,
        node_filter: Option<&[NodeId]>,
    ) -> Result<ChainInfo> {
        let inner = &self.inner;
        if let Some(slot) = inner.lookup(execute_id) {
            return Ok(ChainInfo::from_state(&slot.snapshot(), node_filter));
        }

        let record = inner.store.get_execution_record_by_key(execute_id)?.ok_or_else(|| ChainError::NotFound(execute_id.to_string()))?;
        let steps = inner.store.get_steps_by_key(execute_id)?;
        let state = status::restore_state(&record, &steps)?;
        Ok(ChainInfo::from_state(&state, node_filter))
    }

    /// Continue a suspended run with the confirmed parameters.
    ///
    /// The parameters are merged into the run variables and the walk resumes
    /// after the suspended node, followed by any branches left pending.
    pub fn resume(
        &self,
        execute_id: &str,
        params: Vars,
    ) -> Result<()> {
        let inner = &self.inner;
        let key = execute_id.to_string();
        let slot = match inner.lookup(execute_id) {
            Some(slot) => slot,
            None => inner.runs.try_get_with(key, || inner.restore_slot(execute_id)).map_err(|_| ChainError::NotSuspended(execute_id.to_string()))?,
        };

        let (node_id, pending) = slot.update(|s| -> Result<(NodeId, Vec<NodeId>)> {
            if s.status != RunStatus::Suspended {
                return Err(ChainError::NotSuspended(execute_id.to_string()));
            }
            let node_id = s.suspended_node_id.take().ok_or_else(|| ChainError::NotSuspended(execute_id.to_string()))?;
            s.variables.merge(&params);
            s.suspended_params.clear();
            let pending = std::mem::take(&mut s.pending);
            s.transition(RunStatus::Running)?;
            Ok((node_id, pending))
        })?;

        inner.track(&slot);
        info!(execute_id, node_id = %node_id, "run resumed");
        inner.sync_record(&slot);
        inner.channel.emit(Message {
            execute_id: execute_id.to_string(),
            node_id: node_id.clone(),
            event: GraphEvent::Run(RunEvent::Resumed),
        });

        let mut stack = pending;
        stack.extend(slot.definition.next_nodes(&node_id).iter().rev().map(|n| n.id.clone()));
        inner.spawn_walk(slot, stack);

        Ok(())
    }

    /// Run one node of a deployed workflow against `variables`, without
    /// creating a run or writing any record.
    pub async fn execute_node(
        &self,
        workflow_id: &str,
        node_id: &str,
        variables: Vars,
    ) -> Result<Vars> {
        let inner = &self.inner;
        let (definition, _) = inner.load_definition(workflow_id)?;
        let node = definition.node(node_id).ok_or_else(|| ChainError::NodeNotFound(node_id.to_string()))?;
        let executor = inner.executors.get(node.node_type.as_str()).ok_or_else(|| ChainError::UnknownNodeType(node.node_type.to_string()))?;
        validate_config(executor.as_ref(), node)?;

        let ctx = Arc::new(inner.context(&utils::execute_id(), variables, CancellationToken::new(), 0));
        debug!(workflow_id, node_id, "executing single node");
        match executor.execute(ctx, node).await {
            Ok(Outcome::Completed(output)) => Ok(output),
            Ok(Outcome::Suspended(params)) => Err(ChainError::Suspended(params)),
            Ok(Outcome::Failed(message)) => Err(ChainError::NodeFailure {
                node_id: node_id.to_string(),
                message,
            }),
            Err(err) => Err(ChainError::NodeFailure {
                node_id: node_id.to_string(),
                message: err.node_message(),
            }),
        }
    }

    /// Cancel a running run. The walk stops before its next node, or
    /// aborts the node in flight, and the run fails with `cancelled`.
    pub fn cancel(
        &self,
        execute_id: &str,
    ) -> Result<()> {
        let slot = self.inner.lookup(execute_id).ok_or_else(|| ChainError::NotFound(execute_id.to_string()))?;
        let status = slot.status();
        if status != RunStatus::Running {
            return Err(ChainError::Engine(format!("execution {} is {}, not running", execute_id, status)));
        }
        slot.cancel.cancel();
        Ok(())
    }

    /// Gracefully shuts down the engine.
    ///
    /// Cancels every tracked run and stops the event channel. New runs are
    /// rejected afterwards.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for slot in self.inner.live.read().unwrap_or_else(PoisonError::into_inner).values() {
            slot.cancel.cancel();
        }
        for (_, slot) in self.inner.runs.iter() {
            slot.cancel.cancel();
        }
        self.inner.channel.shutdown();
    }
}

impl EngineInner {
    fn lookup(
        &self,
        execute_id: &str,
    ) -> Option<Arc<RunSlot>> {
        let live = self.live.read().unwrap_or_else(PoisonError::into_inner).get(execute_id).cloned();
        live.or_else(|| self.runs.get(&execute_id.to_string()))
    }

    /// Pin a run in the live table while it is walked.
    fn track(
        &self,
        slot: &Arc<RunSlot>,
    ) {
        self.live.write().unwrap_or_else(PoisonError::into_inner).insert(slot.execute_id(), slot.clone());
    }

    /// Move a run that stopped walking from the live table to the cache.
    fn settle(
        &self,
        slot: &Arc<RunSlot>,
    ) {
        // hold the lock so a concurrent resume cannot re-track the run in between
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_running() {
            return;
        }
        let execute_id = slot.execute_id();
        self.runs.set(execute_id.clone(), slot.clone());
        live.remove(&execute_id);
    }

    fn runner(&self) -> Option<Arc<dyn SubflowRunner>> {
        self.me.upgrade().map(|inner| inner as Arc<dyn SubflowRunner>)
    }

    fn load_definition(
        &self,
        workflow_id: &str,
    ) -> Result<(Arc<Definition>, String)> {
        let workflows = self.store.workflows()?;
        if !workflows.exists(workflow_id)? {
            return Err(ChainError::WorkflowNotFound(workflow_id.to_string()));
        }
        let data = workflows.find(workflow_id)?;
        let definition = Definition::load(&data.content)?;
        Ok((Arc::new(definition), data.content))
    }

    /// Create the running state and durable record of a new run and put it
    /// in the live table. Returns the run with its start node.
    fn start_run(
        &self,
        workflow_id: &str,
        input: Vars,
        actor: &str,
        cancel: CancellationToken,
        depth: usize,
    ) -> Result<(Arc<RunSlot>, NodeId)> {
        let (definition, content) = self.load_definition(workflow_id)?;
        let start = definition.start_node()?.id.clone();

        let mut variables = Vars::from(definition.model().variables.clone());
        variables.merge(&input);

        let execute_id = utils::execute_id();
        let record_id = utils::longid();
        let mut state = ChainState::new(&execute_id, workflow_id, &record_id, variables);
        state.transition(RunStatus::Running)?;

        let now = utils::time::time_millis();
        let record = ExecRecord {
            id: record_id,
            exec_key: execute_id.clone(),
            workflow_id: workflow_id.to_string(),
            title: definition.model().name.clone(),
            input: serde_json::to_string(&input)?,
            output: String::new(),
            workflow_json: content,
            status: RunStatus::Running.to_string(),
            error: None,
            start_time: now,
            end_time: 0,
            created_by: actor.to_string(),
            suspend: None,
            timestamp: now,
        };
        self.store.create_execution_record(&record)?;

        let slot = Arc::new(RunSlot::new(state, record, definition, cancel, depth));
        self.track(&slot);

        info!(execute_id = %execute_id, workflow_id, actor, depth, "run started");
        self.channel.emit(Message {
            execute_id,
            node_id: String::new(),
            event: GraphEvent::Run(RunEvent::Started(RunStartedEvent {
                workflow_id: workflow_id.to_string(),
                input,
            })),
        });

        Ok((slot, start))
    }

    /// Rebuild a suspended run from its durable record.
    fn restore_slot(
        &self,
        execute_id: &str,
    ) -> Result<Arc<RunSlot>> {
        let record = self.store.get_execution_record_by_key(execute_id)?.ok_or_else(|| ChainError::NotSuspended(execute_id.to_string()))?;
        if record.status != RunStatus::Suspended.as_ref() || record.suspend_detail().is_none() {
            return Err(ChainError::NotSuspended(execute_id.to_string()));
        }

        let steps = self.store.get_steps_by_key(execute_id)?;
        let state = status::restore_state(&record, &steps)?;
        let definition = Arc::new(Definition::load(&record.workflow_json)?);
        let seq = steps.last().map(|s| s.seq).unwrap_or_default();

        debug!(execute_id, "restored suspended run from its record");
        Ok(Arc::new(RunSlot::new(state, record, definition, CancellationToken::new(), 0).with_seq(seq)))
    }

    fn spawn_walk(
        &self,
        slot: Arc<RunSlot>,
        stack: Vec<NodeId>,
    ) {
        let Some(inner) = self.me.upgrade() else {
            return;
        };
        self.runtime.spawn(async move {
            inner.drive(slot.clone(), stack).await;
            inner.settle(&slot);
        });
    }
}

#[async_trait]
impl SubflowRunner for EngineInner {
    async fn run_subflow(
        &self,
        workflow_id: &str,
        input: Vars,
        depth: usize,
        cancel: CancellationToken,
    ) -> Result<Vars> {
        if depth > self.config.max_subflow_depth {
            return Err(ChainError::Engine(format!("sub-workflow depth {} exceeds the limit of {}", depth, self.config.max_subflow_depth)));
        }

        let (slot, start) = self.start_run(workflow_id, input, "sub_workflow", cancel.child_token(), depth)?;
        let child = ChildRun {
            inner: self,
            slot: slot.clone(),
        };
        self.drive(slot.clone(), vec![start]).await;
        drop(child);

        let state = slot.snapshot();
        match state.status {
            RunStatus::Completed => Ok(state.result.unwrap_or_default()),
            RunStatus::Suspended => Err(ChainError::Engine(format!("sub-workflow {} suspended, which is not supported", workflow_id))),
            _ => {
                let error = state.error.unwrap_or_else(|| crate::runtime::RunError {
                    node_id: String::new(),
                    message: format!("run ended as {}", state.status),
                });
                Err(ChainError::NodeFailure {
                    node_id: error.node_id,
                    message: error.message,
                })
            }
        }
    }
}

/// A sub-workflow run driven inline by its parent node.
///
/// Dropping it settles the run. If the parent stopped awaiting the child
/// mid-walk, on node timeout or cancellation, the child fails instead of
/// staying `running`.
struct ChildRun<'a> {
    inner: &'a EngineInner,
    slot: Arc<RunSlot>,
}

impl Drop for ChildRun<'_> {
    fn drop(&mut self) {
        let slot = &self.slot;
        if slot.is_running() {
            let message = if slot.cancel.is_cancelled() { ChainError::Cancelled.to_string() } else { "timeout".to_string() };
            let node_id = slot.running_node().unwrap_or_default();
            warn!(execute_id = %slot.execute_id(), node_id = %node_id, "sub-workflow abandoned by its parent: {}", message);

            slot.cancel.cancel();
            self.inner.fail_node(slot, &node_id, &message);
            self.inner.fail_run(slot, &node_id, &message);
        }
        self.inner.settle(slot);
    }
}
