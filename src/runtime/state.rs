//! In-memory run state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ChainError, Result, common::Vars, model::ParameterModel, utils};

/// Execute id of a run (uuid v4).
pub type ExecuteId = String;

/// Node id within a workflow.
pub type NodeId = String;

/// Status of a run or of a single node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// `pending -> running -> {completed | failed | suspended}`, `suspended -> running`.
    pub fn can_transition(
        &self,
        to: RunStatus,
    ) -> bool {
        matches!(
            (self, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Suspended)
                | (RunStatus::Suspended, RunStatus::Running)
        )
    }
}

/// A parameter the run waits for while suspended.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SuspendParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl From<&ParameterModel> for SuspendParam {
    fn from(p: &ParameterModel) -> Self {
        Self {
            name: p.name.clone(),
            param_type: p.param_type.clone(),
            description: p.description.clone(),
            required: p.required,
        }
    }
}

/// The node and message a failed run is attributed to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunError {
    pub node_id: NodeId,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeState {
    pub node_id: NodeId,
    pub node_name: String,
    pub status: RunStatus,
    pub input: Vars,
    pub output: Option<Vars>,
    pub start_time: i64,
    pub end_time: i64,
    pub error: Option<String>,
    #[serde(default)]
    pub suspend_params: Vec<SuspendParam>,
    /// Id of the durable step row backing this node execution.
    #[serde(skip)]
    pub(crate) step_id: Option<String>,
}

impl NodeState {
    pub fn running(
        node_id: &str,
        node_name: &str,
        input: Vars,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            status: RunStatus::Running,
            input,
            output: None,
            start_time: utils::time::time_millis(),
            end_time: 0,
            error: None,
            suspend_params: Vec::new(),
            step_id: None,
        }
    }
}

/// Live state of one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChainState {
    pub execute_id: ExecuteId,
    pub workflow_id: String,
    pub record_id: String,
    pub status: RunStatus,
    pub variables: Vars,
    pub node_states: HashMap<NodeId, NodeState>,
    pub result: Option<Vars>,
    pub suspended_node_id: Option<NodeId>,
    pub suspended_params: Vec<SuspendParam>,
    /// Branches not yet walked when the run suspended.
    pub pending: Vec<NodeId>,
    pub error: Option<RunError>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChainState {
    pub fn new(
        execute_id: &str,
        workflow_id: &str,
        record_id: &str,
        variables: Vars,
    ) -> Self {
        let now = utils::time::time_millis();
        Self {
            execute_id: execute_id.to_string(),
            workflow_id: workflow_id.to_string(),
            record_id: record_id.to_string(),
            status: RunStatus::Pending,
            variables,
            node_states: HashMap::new(),
            result: None,
            suspended_node_id: None,
            suspended_params: Vec::new(),
            pending: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, rejecting transitions outside the run lifecycle.
    pub fn transition(
        &mut self,
        to: RunStatus,
    ) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(ChainError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = utils::time::time_millis();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut state = ChainState::new("e1", "w1", "r1", Vars::new());
        assert!(state.transition(RunStatus::Completed).is_err());
        state.transition(RunStatus::Running).unwrap();
        state.transition(RunStatus::Suspended).unwrap();
        assert!(state.transition(RunStatus::Completed).is_err());
        state.transition(RunStatus::Running).unwrap();
        state.transition(RunStatus::Failed).unwrap();
        assert!(state.status.is_terminal());

        let err = state.transition(RunStatus::Running).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransition {
                from: "failed".to_string(),
                to: "running".to_string(),
            }
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RunStatus::Suspended.as_ref(), "suspended");
        assert_eq!("completed".parse::<RunStatus>().unwrap(), RunStatus::Completed);
    }
}
