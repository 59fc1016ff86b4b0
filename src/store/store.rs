use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::trace;

use crate::{ChainError, Result, ShareLock, model::WorkflowModel, utils};

use super::{
    DbCollection, DbCollectionIden, StoreIden,
    data::*,
    query::{LIMIT_ALL, Query},
};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

/// Registry of typed collections, filled by a backend's `DbStore::init`.
pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn collection<DATA>(&self) -> Result<Arc<dyn DbCollection<Item = DATA>>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        collections
            .get(&DATA::iden())
            .and_then(|c| c.downcast_ref::<DynDbSetRef<DATA>>())
            .map(|c| c.0.clone())
            .ok_or_else(|| ChainError::Store(format!("collection not registered: {}", DATA::iden().as_ref())))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
    }

    pub fn workflows(&self) -> Result<Arc<dyn DbCollection<Item = Workflow>>> {
        self.collection()
    }

    pub fn records(&self) -> Result<Arc<dyn DbCollection<Item = ExecRecord>>> {
        self.collection()
    }

    pub fn steps(&self) -> Result<Arc<dyn DbCollection<Item = ExecStep>>> {
        self.collection()
    }

    /// Insert or replace a workflow definition.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<bool> {
        trace!("store::deploy({})", workflow.id);
        if workflow.id.is_empty() {
            return Err(ChainError::Validation("workflow id must not be empty".to_string()));
        }

        let workflows = self.workflows()?;
        let content = workflow.to_json()?;
        match workflows.find(&workflow.id) {
            Ok(existing) => {
                let data = Workflow {
                    id: workflow.id.clone(),
                    title: workflow.name.clone(),
                    description: workflow.description.clone(),
                    content,
                    create_time: existing.create_time,
                    update_time: utils::time::time_millis(),
                };
                workflows.update(&data)
            }
            Err(_) => {
                let data = Workflow {
                    id: workflow.id.clone(),
                    title: workflow.name.clone(),
                    description: workflow.description.clone(),
                    content,
                    create_time: utils::time::time_millis(),
                    update_time: 0,
                };
                workflows.create(&data)
            }
        }
    }

    pub fn create_execution_record(
        &self,
        record: &ExecRecord,
    ) -> Result<bool> {
        trace!("store::create_execution_record({})", record.exec_key);
        self.records()?.create(record)
    }

    pub fn update_execution_record(
        &self,
        record: &ExecRecord,
    ) -> Result<bool> {
        trace!("store::update_execution_record({}, {})", record.exec_key, record.status);
        self.records()?.update(record)
    }

    pub fn create_step(
        &self,
        step: &ExecStep,
    ) -> Result<bool> {
        trace!("store::create_step({}, {})", step.exec_key, step.node_id);
        self.steps()?.create(step)
    }

    pub fn update_step(
        &self,
        step: &ExecStep,
    ) -> Result<bool> {
        trace!("store::update_step({}, {}, {})", step.exec_key, step.node_id, step.status);
        self.steps()?.update(step)
    }

    /// The record of an execution, if one was ever written.
    pub fn get_execution_record_by_key(
        &self,
        exec_key: &str,
    ) -> Result<Option<ExecRecord>> {
        let page = self.records()?.query(&Query::new().filter("exec_key", exec_key).set_limit(1))?;
        Ok(page.rows.into_iter().next())
    }

    /// Steps of an execution in `seq` order.
    pub fn get_steps_by_key(
        &self,
        exec_key: &str,
    ) -> Result<Vec<ExecStep>> {
        let page = self.steps()?.query(&Query::new().filter("exec_key", exec_key).sort("seq", false).set_limit(LIMIT_ALL))?;
        Ok(page.rows)
    }
}
