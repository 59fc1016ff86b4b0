use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicBool, Ordering},
};

use regex::Regex;
use rquickjs::{Context as JsContext, Ctx, Exception, FromJs, Runtime as JsRuntime};
use serde_json::Value;

use crate::{ChainError, Result};

static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"function\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*\(").expect("valid function pattern"));

/// Default heap cap for one evaluation.
const MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// QuickJS evaluation without any host bindings: no I/O, no timers, no modules.
pub struct JavascriptSandbox;

impl JavascriptSandbox {
    /// Evaluate `code` and call its first declared function with `params`.
    ///
    /// # Arguments
    /// * `code` - JavaScript source declaring at least one function
    /// * `params` - Passed as the single argument of that function
    /// * `interrupt` - Polled while the script runs; returning `true` aborts it
    ///
    /// # Returns
    /// The function's return value, round-tripped through `JSON.stringify`.
    pub fn execute<F>(
        code: &str,
        params: &Value,
        mut interrupt: F,
    ) -> Result<Value>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let func_name = Self::function_name(code).ok_or_else(|| ChainError::Script {
            ecode: "JS_NO_FUNCTION".to_string(),
            message: "no function declared in code".to_string(),
        })?;

        let runtime = JsRuntime::new().map_err(|e| ChainError::Engine(e.to_string()))?;
        runtime.set_memory_limit(MEMORY_LIMIT);
        let interrupted = Arc::new(AtomicBool::new(false));
        let tripped = interrupted.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let stop = interrupt();
            if stop {
                tripped.store(true, Ordering::SeqCst);
            }
            stop
        })));
        let ctx = JsContext::full(&runtime).map_err(|e| ChainError::Engine(e.to_string()))?;

        ctx.with(|ctx| {
            if let Err(e) = ctx.eval::<(), _>(code) {
                return Err(Self::script_error(&ctx, e, "JS_EVAL_ERROR", &interrupted));
            }

            let call = format!("JSON.stringify({}({}))", func_name, serde_json::to_string(params)?);
            match ctx.eval::<Option<String>, _>(call) {
                Ok(Some(json)) => Ok(serde_json::from_str(&json)?),
                Ok(None) => Ok(Value::Null),
                Err(e) => Err(Self::script_error(&ctx, e, "JS_EXEC_ERROR", &interrupted)),
            }
        })
    }

    fn script_error(
        ctx: &Ctx<'_>,
        err: rquickjs::Error,
        ecode: &str,
        interrupted: &AtomicBool,
    ) -> ChainError {
        if interrupted.load(Ordering::SeqCst) {
            // drop the pending "interrupted" exception
            let _ = ctx.catch();
            return ChainError::Script {
                ecode: "JS_INTERRUPTED".to_string(),
                message: "script interrupted".to_string(),
            };
        }
        let message = match err {
            rquickjs::Error::Exception => Exception::from_js(ctx, ctx.catch()).ok().and_then(|e| e.message()).unwrap_or_else(|| "uncaught exception".to_string()),
            other => other.to_string(),
        };
        ChainError::Script {
            ecode: ecode.to_string(),
            message,
        }
    }

    fn function_name(code: &str) -> Option<String> {
        FUNCTION_NAME.captures(code).map(|caps| caps[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_function_name() {
        assert_eq!(JavascriptSandbox::function_name("function main() {}"), Some("main".to_string()));
        assert_eq!(JavascriptSandbox::function_name("  function  _helper1 ({a}) {}"), Some("_helper1".to_string()));
        assert_eq!(JavascriptSandbox::function_name("const x = 1;"), None);
    }

    #[test]
    fn test_execute_with_params() {
        let code = r#"
        function main({a, b}) {
            return { sum: a + b, label: "total" }
        }
        "#;
        let result = JavascriptSandbox::execute(code, &json!({"a": 10, "b": 20}), || false).unwrap();
        assert_eq!(result, json!({"sum": 30, "label": "total"}));
    }

    #[test]
    fn test_execute_nested_input() {
        let code = r#"
        function pick({response}) {
            return { code: response.status, message: response.body.message }
        }
        "#;
        let result = JavascriptSandbox::execute(code, &json!({"response": {"status": 200, "body": {"message": "ok"}}}), || false).unwrap();
        assert_eq!(result, json!({"code": 200, "message": "ok"}));
    }

    #[test]
    fn test_execute_throws() {
        let err = JavascriptSandbox::execute("function main() { throw new Error('boom') }", &json!({}), || false).unwrap_err();
        assert_eq!(
            err,
            ChainError::Script {
                ecode: "JS_EXEC_ERROR".to_string(),
                message: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_no_host_io() {
        let err = JavascriptSandbox::execute("function main() { return require('fs') }", &json!({}), || false).unwrap_err();
        assert!(matches!(err, ChainError::Script { .. }));
    }

    #[test]
    fn test_endless_loop_is_interrupted() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = JavascriptSandbox::execute("function main() { while (true) {} }", &json!({}), move || Instant::now() >= deadline).unwrap_err();
        assert_eq!(
            err,
            ChainError::Script {
                ecode: "JS_INTERRUPTED".to_string(),
                message: "script interrupted".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_function() {
        assert!(matches!(JavascriptSandbox::execute("1 + 1", &json!({}), || false), Err(ChainError::Script { ecode, .. }) if ecode == "JS_NO_FUNCTION"));
    }
}
