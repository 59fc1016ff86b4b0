mod cache;
mod queue;
mod vars;

pub use cache::MemCache;
pub use queue::BroadcastQueue;
pub use vars::Vars;
