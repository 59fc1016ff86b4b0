mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*},
};
pub use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    workflows: Arc<Collect<Workflow>>,
    records: Arc<Collect<ExecRecord>>,
    steps: Arc<Collect<ExecStep>>,
}

/// A row kept in memory; `doc` exposes the columns queries filter and sort on.
trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> &str;

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map.into_iter().collect()),
            _ => Ok(HashMap::new()),
        }
    }
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        s.register(self.workflows());
        s.register(self.records());
        s.register(self.steps());
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(Collect::new("workflows")),
            records: Arc::new(Collect::new("records")),
            steps: Arc::new(Collect::new("steps")),
        }
    }

    pub fn workflows(&self) -> Arc<dyn DbCollection<Item = Workflow> + Send + Sync> {
        self.workflows.clone()
    }

    pub fn records(&self) -> Arc<dyn DbCollection<Item = ExecRecord> + Send + Sync> {
        self.records.clone()
    }

    pub fn steps(&self) -> Arc<dyn DbCollection<Item = ExecStep> + Send + Sync> {
        self.steps.clone()
    }
}
