use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Result,
    model::{NodeModel, ParameterModel},
    runtime::{Context, SuspendParam},
};

use super::{NodeExecutor, Outcome};

/// Gate that always parks the run until the requested parameters are supplied.
pub struct HumanConfirmExecutor;

impl HumanConfirmExecutor {
    fn params(node: &NodeModel) -> Vec<SuspendParam> {
        for key in ["confirmParameters", "parameters"] {
            if let Some(value) = node.config(key)
                && let Ok(params) = serde_json::from_value::<Vec<ParameterModel>>(value.clone())
            {
                return params.iter().map(SuspendParam::from).collect();
            }
        }
        node.parameters.iter().map(SuspendParam::from).collect()
    }
}

#[async_trait]
impl NodeExecutor for HumanConfirmExecutor {
    fn node_type(&self) -> &str {
        "human_confirm"
    }

    async fn execute(
        &self,
        _: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        Ok(Outcome::Suspended(Self::params(node)))
    }
}
