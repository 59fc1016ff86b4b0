//! External collaborators the executors call out to.
//!
//! The engine only relies on the traits; the reference implementations
//! cover tests and simple embeddings.

mod llm;
mod plugin;
mod tool;

use std::sync::Arc;

pub use llm::{ChatMessage, ChatRequest, LlmClient};
pub use plugin::{HttpPluginClient, PluginAuth, PluginClient, PluginEndpoint, PluginMethod};
pub use tool::{MemToolRegistry, ToolFn, ToolRegistry};

/// Collaborators handed to the built-in executors.
#[derive(Clone)]
pub(crate) struct Clients {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub tools: Arc<dyn ToolRegistry>,
    pub plugins: Arc<dyn PluginClient>,
}
