use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    ChainError, Result,
    clients::PluginClient,
    common::Vars,
    model::NodeModel,
    runtime::Context,
    workflow::{consts::PLUGIN_OUTPUT, template},
};

use super::{NodeExecutor, Outcome};

/// Calls a plugin tool through the [`PluginClient`].
pub struct PluginExecutor {
    client: Arc<dyn PluginClient>,
}

impl PluginExecutor {
    pub fn new(client: Arc<dyn PluginClient>) -> Self {
        Self {
            client,
        }
    }
}

#[async_trait]
impl NodeExecutor for PluginExecutor {
    fn node_type(&self) -> &str {
        "plugin"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pluginToolId": { "type": ["string", "integer"] },
                "pluginId": { "type": ["string", "integer"] },
                "parameters": { "type": "object" },
                "outputVariable": { "type": "string" }
            }
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let Some(plugin_tool_id) = node.config_str(&["pluginToolId", "pluginId"]) else {
            return Ok(Outcome::Failed("plugin node has no plugin tool configured".to_string()));
        };

        let args = match node.config("parameters") {
            Some(params) => Vars::from(template::resolve_json_value(ctx.variables(), params)),
            None => Vars::new(),
        };
        let result = self.client.execute(&plugin_tool_id, args).await.map_err(|e| ChainError::Client(format!("plugin {} failed: {}", plugin_tool_id, e)))?;

        match result {
            Value::Object(map) => Ok(Outcome::Completed(Vars::from(map))),
            other => {
                let output = node.config_str(&["outputVariable"]).unwrap_or_else(|| PLUGIN_OUTPUT.to_string());
                Ok(Outcome::Completed(Vars::new().with(&output, other)))
            }
        }
    }
}
