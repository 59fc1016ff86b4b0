mod executor;
mod models;

pub use executor::ConditionExecutor;
pub use models::*;
