mod executor;
mod sandbox;

pub use executor::{CodeExecutor, CodeType};
pub use sandbox::JavascriptSandbox;
