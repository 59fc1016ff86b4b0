use crate::{
    common::Vars,
    runtime::{NodeId, RunError, SuspendParam},
};

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started(RunStartedEvent),
    Completed,
    Failed(RunError),
    Suspended(RunSuspendedEvent),
    Resumed,
}

impl RunEvent {
    pub fn str(&self) -> &str {
        match self {
            RunEvent::Started(_) => "started",
            RunEvent::Completed => "completed",
            RunEvent::Failed(_) => "failed",
            RunEvent::Suspended(_) => "suspended",
            RunEvent::Resumed => "resumed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunStartedEvent {
    pub workflow_id: String,
    pub input: Vars,
}

#[derive(Debug, Clone)]
pub struct RunSuspendedEvent {
    pub node_id: NodeId,
    pub params: Vec<SuspendParam>,
}
