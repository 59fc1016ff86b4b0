pub mod consts;
mod definition;
pub mod executors;
pub mod template;

pub use definition::Definition;
