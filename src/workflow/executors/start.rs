use std::sync::Arc;

use async_trait::async_trait;

use crate::{Result, model::NodeModel, runtime::Context};

use super::{NodeExecutor, Outcome};

/// Entry node: passes the input through, filling in declared defaults.
pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn node_type(&self) -> &str {
        "start"
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let mut output = ctx.variables().clone();

        for param in node.parameters.iter() {
            if output.contains_key(&param.name) {
                continue;
            }
            match &param.default_value {
                Some(default) => output.set(&param.name, default),
                None if param.required => return Ok(Outcome::Failed(format!("missing required parameter: {}", param.name))),
                None => {}
            }
        }

        Ok(Outcome::Completed(output))
    }
}
