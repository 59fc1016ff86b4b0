use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
    ChainError, Result,
    common::Vars,
    model::NodeModel,
    runtime::Context,
    workflow::{
        consts::CODE_OUTPUT,
        executors::{NodeExecutor, Outcome, resolve_mappings},
        template,
    },
};

use super::sandbox::JavascriptSandbox;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodeType {
    /// Resolve `${var}` in the code, then parse it as a JSON object.
    Json,
    /// Resolve `${var}` in the code into `output`.
    Template,
    /// Call the first function declared in the code.
    Javascript,
    /// Pass the run variables through.
    Passthrough,
}

impl CodeType {
    fn of(node: &NodeModel) -> Self {
        node.config_str(&["codeType"]).and_then(|s| s.parse().ok()).unwrap_or(CodeType::Passthrough)
    }
}

/// Tells a running script to stop once the run is cancelled or nobody
/// awaits the node any more.
#[derive(Clone, Default)]
struct Abort {
    dropped: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Abort {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            dropped: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    fn is_set(&self) -> bool {
        self.dropped.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }
}

/// Sets the abort flag when the awaiting future goes away, e.g. on node timeout.
struct AbortOnDrop(Abort);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.dropped.store(true, Ordering::SeqCst);
    }
}

pub struct CodeExecutor;

impl CodeExecutor {
    fn run(
        code_type: CodeType,
        code: &str,
        node: &NodeModel,
        vars: &Vars,
        abort: &Abort,
    ) -> Result<Outcome> {
        let outcome = match code_type {
            CodeType::Json if code.is_empty() => Outcome::Completed(Vars::new()),
            CodeType::Json => match serde_json::from_str::<Value>(&template::resolve_template(vars, code)) {
                Ok(Value::Object(map)) => Outcome::Completed(Vars::from(map)),
                Ok(_) => Outcome::Failed("code output must be a JSON object".to_string()),
                Err(e) => Outcome::Failed(format!("invalid json: {}", e)),
            },
            CodeType::Template if code.is_empty() => Outcome::Completed(Vars::new()),
            CodeType::Template => Outcome::Completed(Vars::new().with(CODE_OUTPUT, template::resolve_template(vars, code))),
            CodeType::Javascript => {
                let params = match node.config("variables") {
                    Some(mappings) => resolve_mappings(Some(mappings), vars),
                    None => vars.clone(),
                };
                let abort = abort.clone();
                match JavascriptSandbox::execute(code, &Value::from(params), move || abort.is_set())? {
                    Value::Object(map) => Outcome::Completed(Vars::from(map)),
                    _ => Outcome::Failed("code output must be a JSON object".to_string()),
                }
            }
            CodeType::Passthrough => Outcome::Completed(vars.clone()),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl NodeExecutor for CodeExecutor {
    fn node_type(&self) -> &str {
        "code"
    }

    fn schema(&self) -> Value {
        json!({
            "type": ["object", "null"],
            "properties": {
                "codeType": { "type": "string" },
                "code": { "type": "string" },
                "variables": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } },
                        "required": ["name"]
                    }
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let code_type = CodeType::of(node);
        let code = node.config_str(&["code"]).unwrap_or_default();

        if code_type != CodeType::Javascript {
            return Self::run(code_type, &code, node, ctx.variables(), &Abort::default());
        }

        // QuickJS is synchronous, keep it off the async workers
        let abort = Abort::new(ctx.cancellation());
        let _guard = AbortOnDrop(abort.clone());
        let node = node.clone();
        tokio::task::spawn_blocking(move || Self::run(code_type, &code, &node, ctx.variables(), &abort))
            .await
            .map_err(|e| ChainError::Engine(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(
        data: Value,
        vars: Vars,
    ) -> Outcome {
        let node: NodeModel = serde_json::from_value(json!({"id": "c", "type": "code", "data": data})).unwrap();
        CodeExecutor.execute(Arc::new(Context::new("e1", vars)), &node).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_code() {
        let outcome = run(json!({"codeType": "json", "code": r#"{"greeting": "hi ${name}"}"#}), Vars::new().with("name", "ann")).await;
        assert_eq!(outcome, Outcome::Completed(Vars::new().with("greeting", "hi ann")));

        let outcome = run(json!({"codeType": "json", "code": "[1, 2]"}), Vars::new()).await;
        assert_eq!(outcome, Outcome::Failed("code output must be a JSON object".to_string()));

        assert!(matches!(run(json!({"codeType": "json", "code": "{oops"}), Vars::new()).await, Outcome::Failed(msg) if msg.starts_with("invalid json")));
    }

    #[tokio::test]
    async fn test_template_code() {
        let outcome = run(json!({"codeType": "template", "code": "${a}-${b}"}), Vars::new().with("a", 1).with("b", "x")).await;
        assert_eq!(outcome, Outcome::Completed(Vars::new().with(CODE_OUTPUT, "1-x")));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let vars = Vars::new().with("k", "v");
        assert_eq!(run(json!({}), vars.clone()).await, Outcome::Completed(vars.clone()));
        assert_eq!(run(json!({"codeType": "python"}), vars.clone()).await, Outcome::Completed(vars));
    }

    #[tokio::test]
    async fn test_javascript_selected_variables() {
        let data = json!({
            "codeType": "javascript",
            "code": "function main({n, unused}) { return { doubled: n * 2, seen: unused === undefined } }",
            "variables": [{"name": "n", "value": "${count}"}]
        });
        let outcome = run(data, Vars::new().with("count", 21).with("unused", "x")).await;
        assert_eq!(outcome, Outcome::Completed(Vars::new().with("doubled", 42).with("seen", true)));
    }

    #[tokio::test]
    async fn test_javascript_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let ctx = Arc::new(Context::new("e1", Vars::new()).with_cancel(cancel.clone()));
        let node: NodeModel = serde_json::from_value(json!({"id": "c", "type": "code", "data": {"codeType": "javascript", "code": "function main() { while (true) {} }"}})).unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });
        // the blocking task returns, so its thread is free again
        let err = CodeExecutor.execute(ctx, &node).await.unwrap_err();
        assert!(matches!(err, ChainError::Script { ecode, .. } if ecode == "JS_INTERRUPTED"));
    }

    #[tokio::test]
    async fn test_javascript_stops_when_abandoned() {
        let abort = Abort::new(CancellationToken::new());
        let guard = AbortOnDrop(abort.clone());
        let worker = tokio::task::spawn_blocking(move || JavascriptSandbox::execute("function main() { while (true) {} }", &json!({}), move || abort.is_set()));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);
        let err = tokio::time::timeout(std::time::Duration::from_secs(5), worker).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, ChainError::Script { ecode, .. } if ecode == "JS_INTERRUPTED"));
    }

    #[tokio::test]
    async fn test_javascript_non_object() {
        let outcome = run(json!({"codeType": "javascript", "code": "function main() { return 3 }"}), Vars::new()).await;
        assert_eq!(outcome, Outcome::Failed("code output must be a JSON object".to_string()));
    }
}
