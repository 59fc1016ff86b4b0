use crate::runtime::SuspendParam;

#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// start time in milliseconds
    Running(i64),
    /// end time in milliseconds
    Succeeded(i64),
    Suspended(Vec<SuspendParam>),
    Error(String),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "running",
            NodeEvent::Succeeded(_) => "succeeded",
            NodeEvent::Suspended(_) => "suspended",
            NodeEvent::Error(_) => "error",
        }
    }
}
