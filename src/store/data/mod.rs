mod record;
mod step;
mod workflow;

pub use record::{ExecRecord, SuspendDetail};
pub use step::ExecStep;
pub use workflow::Workflow;
