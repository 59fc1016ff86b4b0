use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::{ChainError, Result, ShareLock};

/// Callable tools addressed by name, invoked by `tool` nodes.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Run tool `name` with JSON-encoded arguments and return its text result.
    async fn execute(
        &self,
        name: &str,
        args: &str,
    ) -> Result<String>;
}

pub type ToolFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// In-memory registry of async closures.
#[derive(Clone, Default)]
pub struct MemToolRegistry {
    tools: ShareLock<HashMap<String, ToolFn>>,
}

impl MemToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &self,
        name: &str,
        f: F,
    ) where
        F: Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync + 'static,
    {
        self.tools.write().unwrap_or_else(PoisonError::into_inner).insert(name.to_string(), Arc::new(f));
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }
}

#[async_trait]
impl ToolRegistry for MemToolRegistry {
    async fn execute(
        &self,
        name: &str,
        args: &str,
    ) -> Result<String> {
        let tool = self.tools.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned().ok_or_else(|| ChainError::Client(format!("tool not found: {}", name)))?;
        let args = if args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(args)?
        };
        tool(args).await
    }
}
