use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    Result,
    store::{DbCollection, DbStore, Store, data::*, map_db_err},
};

use super::{DbInit, collection::*, synclient::SynClient};

pub struct PostgresStore {
    workflows: Arc<WorkflowCollection>,
    records: Arc<RecordCollection>,
    steps: Arc<StepCollection>,
}

impl DbStore for PostgresStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        self.workflows.init()?;
        self.records.init()?;
        self.steps.init()?;

        s.register(self.workflows());
        s.register(self.records());
        s.register(self.steps());
        Ok(())
    }
}

impl PostgresStore {
    pub fn connect(
        db_url: &str,
        runtime: Handle,
    ) -> Result<Self> {
        let conn = Arc::new(SynClient::connect(db_url, runtime).map_err(map_db_err)?);

        Ok(Self {
            workflows: Arc::new(WorkflowCollection::new(&conn)),
            records: Arc::new(RecordCollection::new(&conn)),
            steps: Arc::new(StepCollection::new(&conn)),
        })
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
