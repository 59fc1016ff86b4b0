use serde::{Deserialize, Serialize};

use crate::{
    common::Vars,
    runtime::{NodeId, SuspendParam},
    store::{DbCollectionIden, StoreIden},
};

/// One execution of a workflow.
///
/// `input`, `output` and `suspend` are JSON text.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ExecRecord {
    pub id: String,
    pub exec_key: String,
    pub workflow_id: String,
    pub title: String,
    pub input: String,
    pub output: String,
    pub workflow_json: String,
    pub status: String,
    pub error: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub created_by: String,
    pub suspend: Option<String>,
    pub timestamp: i64,
}

impl DbCollectionIden for ExecRecord {
    fn iden() -> StoreIden {
        StoreIden::Records
    }
}

/// What a suspended run needs to continue after the run table forgot it.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SuspendDetail {
    pub node_id: NodeId,
    pub params: Vec<SuspendParam>,
    pub variables: Vars,
    pub pending: Vec<NodeId>,
}

impl ExecRecord {
    pub fn suspend_detail(&self) -> Option<SuspendDetail> {
        self.suspend.as_deref().and_then(|s| serde_json::from_str(s).ok())
    }
}
