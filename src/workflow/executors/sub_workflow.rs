use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{Result, common::Vars, model::NodeModel, runtime::Context, workflow::template};

use super::{NodeExecutor, Outcome};

/// Runs another deployed workflow to completion and returns its result.
pub struct SubWorkflowExecutor;

#[async_trait]
impl NodeExecutor for SubWorkflowExecutor {
    fn node_type(&self) -> &str {
        "sub_workflow"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflowId": { "type": ["string", "integer"] },
                "parameters": { "type": "object" }
            },
            "required": ["workflowId"]
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let Some(workflow_id) = node.config_str(&["workflowId"]) else {
            return Ok(Outcome::Failed("sub-workflow node has no workflow configured".to_string()));
        };
        let input = match node.config("parameters") {
            Some(params) => Vars::from(template::resolve_json_value(ctx.variables(), params)),
            None => Vars::new(),
        };

        match ctx.run_subflow(&workflow_id, input).await {
            Ok(result) => Ok(Outcome::Completed(result)),
            Err(e) => Ok(Outcome::Failed(format!("sub-workflow {} failed: {}", workflow_id, e))),
        }
    }
}
