//! Read models returned by `Engine::get_status`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ChainError, Result,
    common::Vars,
    runtime::{ChainState, ExecuteId, NodeId, NodeState, RunError, RunStatus, SuspendParam},
    store::data::{ExecRecord, ExecStep},
};

/// Status of a run and of the nodes it executed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChainInfo {
    pub execute_id: ExecuteId,
    pub status: RunStatus,
    /// Error message of a failed run.
    pub message: Option<String>,
    /// Node whose failure failed the run.
    pub error_node_id: Option<NodeId>,
    pub result: Option<Vars>,
    pub nodes: BTreeMap<NodeId, NodeInfo>,
    pub suspended_node_id: Option<NodeId>,
    pub suspend_for_parameters: Vec<SuspendParam>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub node_name: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub result: Option<Vars>,
    pub suspend_for_parameters: Vec<SuspendParam>,
}

impl From<&NodeState> for NodeInfo {
    fn from(state: &NodeState) -> Self {
        Self {
            node_id: state.node_id.clone(),
            node_name: state.node_name.clone(),
            status: state.status,
            message: state.error.clone(),
            result: state.output.clone(),
            suspend_for_parameters: state.suspend_params.clone(),
        }
    }
}

impl ChainInfo {
    /// Build the view of `state`, keeping only the nodes in `filter` when given.
    pub(crate) fn from_state(
        state: &ChainState,
        filter: Option<&[NodeId]>,
    ) -> Self {
        let nodes = state
            .node_states
            .iter()
            .filter(|(id, _)| filter.is_none_or(|ids| ids.contains(id)))
            .map(|(id, ns)| (id.clone(), NodeInfo::from(ns)))
            .collect();

        Self {
            execute_id: state.execute_id.clone(),
            status: state.status,
            message: state.error.as_ref().map(|e| e.message.clone()),
            error_node_id: state.error.as_ref().map(|e| e.node_id.clone()).filter(|id| !id.is_empty()),
            result: state.result.clone(),
            nodes,
            suspended_node_id: state.suspended_node_id.clone(),
            suspend_for_parameters: state.suspended_params.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn parse_vars(text: &str) -> Option<Vars> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => Some(Vars::from(map)),
        _ => None,
    }
}

fn parse_status(text: &str) -> Result<RunStatus> {
    text.parse::<RunStatus>().map_err(|_| ChainError::Convert(format!("unknown run status: {}", text)))
}

/// Rebuild a run state from its durable record and steps.
///
/// Steps are expected in `seq` order; a node executed more than once keeps
/// its latest step.
pub(crate) fn restore_state(
    record: &ExecRecord,
    steps: &[ExecStep],
) -> Result<ChainState> {
    let status = parse_status(&record.status)?;
    let detail = record.suspend_detail().filter(|_| status == RunStatus::Suspended);

    let mut state = ChainState::new(&record.exec_key, &record.workflow_id, &record.id, Vars::new());
    state.status = status;
    state.created_at = record.start_time;
    state.updated_at = record.timestamp;

    let result = parse_vars(&record.output);
    state.variables = match (&detail, &result) {
        (Some(detail), _) => detail.variables.clone(),
        (None, Some(result)) => result.clone(),
        (None, None) => parse_vars(&record.input).unwrap_or_default(),
    };
    if status == RunStatus::Completed {
        state.result = result;
    }

    let mut node_states = HashMap::new();
    for step in steps {
        let node_status = parse_status(&step.status)?;
        let suspend_params = match &detail {
            Some(detail) if node_status == RunStatus::Suspended && detail.node_id == step.node_id => detail.params.clone(),
            _ => Vec::new(),
        };
        node_states.insert(
            step.node_id.clone(),
            NodeState {
                node_id: step.node_id.clone(),
                node_name: step.node_name.clone(),
                status: node_status,
                input: parse_vars(&step.input).unwrap_or_default(),
                output: parse_vars(&step.output),
                start_time: step.start_time,
                end_time: step.end_time,
                error: step.error.clone(),
                suspend_params,
                step_id: Some(step.id.clone()),
            },
        );
    }
    state.node_states = node_states;

    if let Some(detail) = detail {
        state.suspended_node_id = Some(detail.node_id);
        state.suspended_params = detail.params;
        state.pending = detail.pending;
    }

    if status == RunStatus::Failed {
        let node_id = steps.iter().rev().find(|s| s.status == RunStatus::Failed.as_ref()).map(|s| s.node_id.clone()).unwrap_or_default();
        state.error = Some(RunError {
            node_id,
            message: record.error.clone().unwrap_or_default(),
        });
    }

    Ok(state)
}
