//! # Chainflow
//!
//! Chainflow is an embeddable workflow execution engine for AI-agent backends.
//! It walks a declarative JSON workflow (nodes + edges), dispatches each node to a
//! typed executor and persists an audit trail of every step.
//!
//! ## Core Features
//!
//! - **Async Execution**: every run is walked by its own `tokio` task
//! - **Suspend & Resume**: a `human_confirm` node parks the run until `Engine::resume`
//! - **Conditional Branching**: `condition` nodes pick the first matching outgoing edge
//! - **Pluggable Storage**: in-memory storage (testing) and PostgreSQL (production)
//! - **Pluggable Collaborators**: LLM, tool and plugin calls go through traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainflow::{EngineBuilder, Vars, WorkflowModel};
//!
//! let engine = EngineBuilder::new().build()?;
//!
//! let workflow = WorkflowModel::from_json(json_str)?;
//! engine.deploy(&workflow)?;
//!
//! let execute_id = engine.execute_async(&workflow.id, Vars::new().with("q", "hi"), "alice")?;
//! let info = engine.get_status(&execute_id, None)?;
//! ```

mod builder;
mod clients;
mod common;
mod config;
mod engine;
mod error;
mod events;
mod model;
mod runtime;
mod store;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use clients::{ChatMessage, ChatRequest, LlmClient, MemToolRegistry, PluginAuth, PluginClient, PluginEndpoint, HttpPluginClient, PluginMethod, ToolFn, ToolRegistry};
pub use common::Vars;
pub use config::{Config, PostgresConfig, StoreConfig, StoreType};
pub use engine::{ChainInfo, Engine, NodeInfo};
pub use error::ChainError;
pub use events::{Event, GraphEvent, Log, Message, NodeEvent, RunEvent, RunStartedEvent, RunSuspendedEvent};
pub use model::*;
pub use runtime::{ChainState, Channel, ChannelEvent, ChannelOptions, Context, ExecuteId, NodeId, NodeState, RunError, RunStatus, SuspendParam};
pub use store::{DbCollection, MemStore, PageData, PostgresStore, Store, data, query};
pub use workflow::{
    Definition,
    executors::{NodeExecutor, Outcome},
    template,
};

/// Result type alias for Chainflow operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
