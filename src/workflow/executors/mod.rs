//! Node executors.
//!
//! Each node type maps to one [`NodeExecutor`] registered under its type
//! string. Executors are stateless singletons shared by all runs; everything
//! run specific arrives through the [`Context`].

pub mod code;
pub mod condition;
mod end;
mod human_confirm;
mod llm;
mod plugin;
mod start;
mod sub_workflow;
mod tool;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Result,
    clients::Clients,
    common::Vars,
    model::NodeModel,
    runtime::{Context, SuspendParam},
};

pub use code::CodeExecutor;
pub use condition::ConditionExecutor;
pub use end::EndExecutor;
pub use human_confirm::HumanConfirmExecutor;
pub use llm::LlmExecutor;
pub use plugin::PluginExecutor;
pub use start::StartExecutor;
pub use sub_workflow::SubWorkflowExecutor;
pub use tool::ToolExecutor;

/// What a node execution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Output variables, merged into the run scope.
    Completed(Vars),
    /// The run must wait for these parameters before it continues.
    Suspended(Vec<SuspendParam>),
    /// The node failed with a message.
    Failed(String),
}

#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Type string this executor is registered under.
    fn node_type(&self) -> &str;

    /// Returns the JSON schema of the node's `data`.
    ///
    /// The engine validates the configuration against it before dispatch.
    fn schema(&self) -> Value {
        json!({"type": ["object", "null"]})
    }

    /// Executes the node against a snapshot of the run variables.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the run.
    /// * `node` - The node being executed.
    ///
    /// # Returns
    ///
    /// `Err` and [`Outcome::Failed`] are both treated as a node failure.
    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome>;
}

/// Check `node.data` against the executor's schema.
pub fn validate_config(
    executor: &dyn NodeExecutor,
    node: &NodeModel,
) -> Result<()> {
    jsonschema::validate(&executor.schema(), &node.data)?;
    Ok(())
}

/// Executors keyed by node type string.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the nine built-in executors.
    pub(crate) fn builtins(clients: &Clients) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StartExecutor));
        registry.register(Arc::new(EndExecutor));
        registry.register(Arc::new(ConditionExecutor));
        registry.register(Arc::new(HumanConfirmExecutor));
        registry.register(Arc::new(CodeExecutor));
        registry.register(Arc::new(SubWorkflowExecutor));
        registry.register(Arc::new(LlmExecutor::new(clients.llm.clone())));
        registry.register(Arc::new(ToolExecutor::new(clients.tools.clone())));
        registry.register(Arc::new(PluginExecutor::new(clients.plugins.clone())));
        registry
    }

    /// Register an executor, replacing any executor of the same type.
    pub fn register(
        &mut self,
        executor: Arc<dyn NodeExecutor>,
    ) {
        self.executors.insert(executor.node_type().to_string(), executor);
    }

    pub fn get(
        &self,
        node_type: &str,
    ) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }
}

/// Resolve an optional `[{name, value}]` mapping against the run variables.
pub(crate) fn resolve_mappings(
    mappings: Option<&Value>,
    vars: &Vars,
) -> Vars {
    let Some(Value::Array(items)) = mappings else {
        return Vars::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?;
            let value = item.get("value").map(|v| crate::template::resolve_json_value(vars, v)).unwrap_or(Value::Null);
            Some((name.to_string(), value))
        })
        .collect()
}
