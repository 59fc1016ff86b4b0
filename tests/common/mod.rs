#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chainflow::{ChainInfo, Context, Engine, EngineBuilder, NodeExecutor, NodeModel, Outcome, Result, RunStatus, Vars, WorkflowModel};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

/// Appends its node id to the `trail` variable.
pub struct Trail;

#[async_trait]
impl NodeExecutor for Trail {
    fn node_type(&self) -> &str {
        "trail"
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let mut trail: Vec<String> = ctx.variables().get("trail").unwrap_or_default();
        trail.push(node.id.clone());
        Ok(Outcome::Completed(Vars::new().with("trail", trail)))
    }
}

pub struct Fail;

#[async_trait]
impl NodeExecutor for Fail {
    fn node_type(&self) -> &str {
        "fail"
    }

    async fn execute(
        &self,
        _: Arc<Context>,
        _: &NodeModel,
    ) -> Result<Outcome> {
        Ok(Outcome::Failed("boom".to_string()))
    }
}

pub struct Explode;

#[async_trait]
impl NodeExecutor for Explode {
    fn node_type(&self) -> &str {
        "explode"
    }

    async fn execute(
        &self,
        _: Arc<Context>,
        _: &NodeModel,
    ) -> Result<Outcome> {
        panic!("kaboom");
    }
}

/// Sleeps `data.ms` milliseconds.
pub struct Sleep;

#[async_trait]
impl NodeExecutor for Sleep {
    fn node_type(&self) -> &str {
        "sleep"
    }

    async fn execute(
        &self,
        _: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        tokio::time::sleep(Duration::from_millis(node.config_u64("ms").unwrap_or(10))).await;
        Ok(Outcome::Completed(Vars::new().with("slept", node.id.clone())))
    }
}

pub fn builder() -> EngineBuilder {
    init_tracing();
    EngineBuilder::new().executor(Arc::new(Trail)).executor(Arc::new(Fail)).executor(Arc::new(Explode)).executor(Arc::new(Sleep))
}

pub fn engine() -> Engine {
    builder().build().unwrap()
}

pub fn deploy(
    engine: &Engine,
    workflow: Value,
) -> String {
    let model: WorkflowModel = serde_json::from_value(workflow).unwrap();
    engine.deploy(&model).unwrap();
    model.id
}

/// Poll the run until `done` holds, failing the test after five seconds.
pub async fn wait_for(
    engine: &Engine,
    execute_id: &str,
    done: impl Fn(&ChainInfo) -> bool,
) -> ChainInfo {
    for _ in 0..500 {
        let info = engine.get_status(execute_id, None).unwrap();
        if done(&info) {
            return info;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not reach the expected state", execute_id);
}

/// Wait until the run stops: completed, failed or suspended.
pub async fn wait_settled(
    engine: &Engine,
    execute_id: &str,
) -> ChainInfo {
    wait_for(engine, execute_id, |info| info.status != RunStatus::Running && info.status != RunStatus::Pending).await
}

pub fn trail(info: &ChainInfo) -> Vec<String> {
    info.result.as_ref().and_then(|r| r.get("trail")).unwrap_or_default()
}
