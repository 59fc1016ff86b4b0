mod edge;
mod node;
mod workflow;

pub use edge::EdgeModel;
pub use node::{NodeModel, NodeType, ParameterModel};
pub use workflow::WorkflowModel;
