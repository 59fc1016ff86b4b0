use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{Result, model::NodeModel, runtime::Context};

use super::{NodeExecutor, Outcome, resolve_mappings};

/// Exit node. With an `outputs` mapping it emits only the mapped keys.
pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    fn node_type(&self) -> &str {
        "end"
    }

    fn schema(&self) -> Value {
        json!({
            "type": ["object", "null"],
            "properties": {
                "outputs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" }
                        },
                        "required": ["name"]
                    }
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        match node.config("outputs") {
            Some(outputs) => Ok(Outcome::Completed(resolve_mappings(Some(outputs), ctx.variables()))),
            None => Ok(Outcome::Completed(ctx.variables().clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Vars;

    #[tokio::test]
    async fn test_end_passthrough_and_mapping() {
        let ctx = Arc::new(Context::new("e1", Vars::new().with("a", 1).with("b", "x")));

        let plain: NodeModel = serde_json::from_value(json!({"id": "end", "type": "end"})).unwrap();
        assert_eq!(EndExecutor.execute(ctx.clone(), &plain).await.unwrap(), Outcome::Completed(ctx.variables().clone()));

        let mapped: NodeModel = serde_json::from_value(json!({"id": "end", "type": "end", "data": {"outputs": [{"name": "answer", "value": "${b}-${a}"}]}})).unwrap();
        assert_eq!(EndExecutor.execute(ctx, &mapped).await.unwrap(), Outcome::Completed(Vars::new().with("answer", "x-1")));
    }
}
