/// Variable a condition node writes its selected branch name to.
pub const CONDITION_KEY: &str = "condition";
/// Branch selected when no condition case matches.
pub const DEFAULT_BRANCH: &str = "default";

pub const LLM_OUTPUT: &str = "llmOutput";
pub const TOOL_OUTPUT: &str = "toolOutput";
pub const PLUGIN_OUTPUT: &str = "pluginOutput";
pub const CODE_OUTPUT: &str = "output";
