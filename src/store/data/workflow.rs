use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// A deployed workflow; `content` holds the definition JSON.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Workflow {
    fn iden() -> StoreIden {
        StoreIden::Workflows
    }
}
