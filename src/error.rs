//! Error types for Chainflow.
//!
//! Every fallible operation returns [`ChainError`]. Errors raised while a run is
//! being walked in the background are recorded on the run instead of being
//! returned, and surface later through `Engine::get_status`.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::SuspendParam;

/// Unified error type for all Chainflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Workflow content is empty or not valid JSON.
    #[error("malformed definition: {0}")]
    MalformedDefinition(String),

    /// Workflow graph breaks a structural rule.
    #[error("{0}")]
    Validation(String),

    /// No workflow with this id in the store.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// No node with this id in the workflow.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No executor registered for the node type.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// A node executor reported a failure.
    #[error("node {node_id} failed: {message}")]
    NodeFailure {
        node_id: String,
        message: String,
    },

    /// Resume was called on a run that is not suspended (or is unknown).
    #[error("execution {0} is not suspended")]
    NotSuspended(String),

    /// Status was requested for an unknown execute id.
    #[error("execution not found: {0}")]
    NotFound(String),

    /// A single-node preview hit a suspending node.
    #[error("node suspended waiting for {} parameter(s)", .0.len())]
    Suspended(Vec<SuspendParam>),

    /// Illegal run state transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Data conversion errors.
    #[error("{0}")]
    Convert(String),

    /// Errors raised by LLM, tool or plugin collaborators.
    #[error("{0}")]
    Client(String),

    /// Script execution errors.
    #[error("ecode: {ecode}, message: {message}")]
    Script {
        ecode: String,
        message: String,
    },

    /// Configuration parsing errors.
    #[error("{0}")]
    Config(String),

    /// Engine-level errors.
    #[error("{0}")]
    Engine(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl ChainError {
    /// Message recorded on a failed node: the bare reason without the node prefix.
    pub fn node_message(&self) -> String {
        match self {
            ChainError::NodeFailure {
                message, ..
            } => message.clone(),
            e => e.to_string(),
        }
    }
}

impl From<ChainError> for String {
    fn from(val: ChainError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for ChainError {
    fn from(error: std::io::Error) -> Self {
        ChainError::IoError(error.to_string())
    }
}

impl From<ChainError> for std::io::Error {
    fn from(val: ChainError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for ChainError {
    fn from(_: FromUtf8Error) -> Self {
        ChainError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(error: serde_json::Error) -> Self {
        ChainError::Convert(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for ChainError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        ChainError::Validation(error.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        ChainError::Client(error.to_string())
    }
}
