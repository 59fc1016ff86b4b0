mod channel;
mod context;
mod state;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub(crate) use context::SubflowRunner;
pub use context::Context;
pub use state::{ChainState, ExecuteId, NodeId, NodeState, RunError, RunStatus, SuspendParam};
