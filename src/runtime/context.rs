use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    ChainError, Result,
    common::Vars,
    events::Log,
    runtime::{Channel, ExecuteId, NodeId},
    utils,
};

/// Runs a child workflow to a terminal state on behalf of a `sub_workflow` node.
#[async_trait]
pub(crate) trait SubflowRunner: Send + Sync {
    async fn run_subflow(
        &self,
        workflow_id: &str,
        input: Vars,
        depth: usize,
        cancel: CancellationToken,
    ) -> Result<Vars>;
}

/// What an executor sees of the run it belongs to.
///
/// The variables are a snapshot taken before dispatch; executors return
/// their output instead of writing into the run.
#[derive(Clone)]
pub struct Context {
    execute_id: ExecuteId,
    variables: Vars,
    channel: Option<Arc<Channel>>,
    cancel: CancellationToken,

    depth: usize,
    subflows: Option<Arc<dyn SubflowRunner>>,
}

impl Context {
    pub fn new(
        execute_id: &str,
        variables: Vars,
    ) -> Self {
        Self {
            execute_id: execute_id.to_string(),
            variables,
            channel: None,
            cancel: CancellationToken::new(),
            depth: 0,
            subflows: None,
        }
    }

    pub(crate) fn with_channel(
        mut self,
        channel: Arc<Channel>,
    ) -> Self {
        self.channel = Some(channel);
        self
    }

    pub(crate) fn with_cancel(
        mut self,
        cancel: CancellationToken,
    ) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn with_subflows(
        mut self,
        subflows: Arc<dyn SubflowRunner>,
        depth: usize,
    ) -> Self {
        self.subflows = Some(subflows);
        self.depth = depth;
        self
    }

    pub fn execute_id(&self) -> &str {
        &self.execute_id
    }

    pub fn variables(&self) -> &Vars {
        &self.variables
    }

    /// Fires when the run is cancelled; long-running executors may watch it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Publish a log line for `node_id` on the engine channel.
    pub fn emit_log(
        &self,
        node_id: &NodeId,
        content: String,
    ) {
        if let Some(channel) = &self.channel {
            channel.emit_log(Log {
                execute_id: self.execute_id.clone(),
                node_id: node_id.clone(),
                content,
                timestamp: utils::time::time_millis(),
            });
        }
    }

    /// Run `workflow_id` as a nested workflow and return its result variables.
    pub async fn run_subflow(
        &self,
        workflow_id: &str,
        input: Vars,
    ) -> Result<Vars> {
        let runner = self.subflows.clone().ok_or_else(|| ChainError::Engine("sub-workflows are not available in this context".to_string()))?;
        runner.run_subflow(workflow_id, input, self.depth + 1, self.cancel.child_token()).await
    }
}
