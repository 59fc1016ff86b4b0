use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// One node execution inside a record, ordered by `seq`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ExecStep {
    pub id: String,
    pub record_id: String,
    pub exec_key: String,
    pub seq: i64,
    pub node_id: String,
    pub node_name: String,
    pub input: String,
    pub node_data: String,
    pub output: String,
    pub status: String,
    pub error: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
}

impl DbCollectionIden for ExecStep {
    fn iden() -> StoreIden {
        StoreIden::Steps
    }
}
