use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{
    ChainError, Result,
    clients::ToolRegistry,
    common::Vars,
    model::NodeModel,
    runtime::Context,
    workflow::{consts::TOOL_OUTPUT, template},
};

use super::{NodeExecutor, Outcome};

/// Calls a named tool from the [`ToolRegistry`].
pub struct ToolExecutor {
    registry: Arc<dyn ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            registry,
        }
    }

    /// Arguments from the `parameters` map and the `inputs` list, resolved against `vars`.
    pub(crate) fn arguments(
        node: &NodeModel,
        vars: &Vars,
    ) -> Map<String, Value> {
        let mut args = Map::new();
        if let Some(Value::Object(params)) = node.config("parameters") {
            for (k, v) in params {
                args.insert(k.clone(), template::resolve_json_value(vars, v));
            }
        }
        if let Some(Value::Array(inputs)) = node.config("inputs") {
            for input in inputs {
                let (Some(name), Some(value)) = (input.get("name").and_then(Value::as_str), input.get("value").and_then(Value::as_str)) else {
                    continue;
                };
                if !name.is_empty() && !value.is_empty() {
                    args.insert(name.to_string(), template::resolve_variable(vars, value));
                }
            }
        }
        args
    }
}

#[async_trait]
impl NodeExecutor for ToolExecutor {
    fn node_type(&self) -> &str {
        "tool"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "toolName": { "type": "string" },
                "name": { "type": "string" },
                "parameters": { "type": "object" },
                "inputs": { "type": "array" },
                "outputVariable": { "type": "string" }
            }
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let Some(tool_name) = node.config_str(&["toolName", "name"]) else {
            return Ok(Outcome::Failed("tool node has no tool name configured".to_string()));
        };

        let args = Value::Object(Self::arguments(node, ctx.variables()));
        let result = self
            .registry
            .execute(&tool_name, &args.to_string())
            .await
            .map_err(|e| ChainError::Client(format!("tool {} failed: {}", tool_name, e)))?;

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&result) {
            return Ok(Outcome::Completed(Vars::from(map)));
        }
        let output = node.config_str(&["outputVariable"]).unwrap_or_else(|| TOOL_OUTPUT.to_string());
        Ok(Outcome::Completed(Vars::new().with(&output, result)))
    }
}
