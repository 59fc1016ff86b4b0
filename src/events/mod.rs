//! Event types for run execution.
//!
//! Events are emitted while a run is walked to notify subscribers
//! about state changes, completions, errors, suspensions and logs.

mod node;
mod run;

pub use node::*;
pub use run::*;

use crate::runtime::{ExecuteId, NodeId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Run-level events (started, completed, failed, ...).
    Run(RunEvent),
    /// Node-level events (running, succeeded, error, ...).
    Node(NodeEvent),
}

/// Event message with run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    pub execute_id: ExecuteId,
    /// Node that produced the event, empty for run events.
    pub node_id: NodeId,
    pub event: GraphEvent,
}

/// Log entry emitted during node execution, e.g. an LLM stream chunk.
#[derive(Debug, Clone)]
pub struct Log {
    pub execute_id: ExecuteId,
    pub node_id: NodeId,
    pub content: String,
    /// milliseconds
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Completed))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Failed(_)))
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self, GraphEvent::Run(RunEvent::Suspended(_)))
    }
}
