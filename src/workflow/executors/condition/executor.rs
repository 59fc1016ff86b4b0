use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    Result,
    common::Vars,
    model::NodeModel,
    runtime::Context,
    workflow::{
        consts::{CONDITION_KEY, DEFAULT_BRANCH},
        executors::{NodeExecutor, Outcome},
        template,
    },
};

use super::models::*;

/// Picks the first case whose checks pass and writes its name to `condition`.
pub struct ConditionExecutor;

impl ConditionExecutor {
    /// Name of the first matching case, or `default`.
    pub fn select(
        config: &ConditionConfig,
        vars: &Vars,
    ) -> String {
        config.cases.iter().find(|case| Self::case_matches(case, vars)).map(|case| case.name.clone()).unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    fn case_matches(
        case: &Case,
        vars: &Vars,
    ) -> bool {
        let mut checks = Vec::new();
        if let Some(expr) = case.expression.as_deref().filter(|e| !e.trim().is_empty()) {
            checks.push(evaluate_expression(vars, expr));
        }
        for cond in case.conditions.iter() {
            let actual = template::lookup(vars, &cond.variable);
            let expected = cond.value.as_ref().map(|v| template::resolve_json_value(vars, v));
            checks.push(evaluate_comparison(actual.as_ref(), cond.operator, expected.as_ref()));
        }

        if checks.is_empty() {
            return false;
        }
        match case.logical_operator {
            LogicalOperator::And => checks.iter().all(|c| *c),
            LogicalOperator::Or => checks.iter().any(|c| *c),
        }
    }
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn node_type(&self) -> &str {
        "condition"
    }

    fn schema(&self) -> Value {
        json!({
            "type": ["object", "null"],
            "properties": {
                "cases": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "expression": { "type": "string" },
                            "logical_operator": { "type": "string", "enum": ["and", "or"] },
                            "conditions": { "type": "array" }
                        },
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
        let config = match &node.data {
            Value::Null => ConditionConfig::default(),
            data => serde_json::from_value::<ConditionConfig>(data.clone())?,
        };
        let selected = Self::select(&config, ctx.variables());

        Ok(Outcome::Completed(Vars::new().with(CONDITION_KEY, selected)))
    }
}

/// `lhs == rhs`, `lhs != rhs`, or a bare truthy value, after `${var}` substitution.
pub fn evaluate_expression(
    vars: &Vars,
    expression: &str,
) -> bool {
    let resolved = template::resolve_template(vars, expression);

    if let Some((lhs, rhs)) = resolved.split_once("==") {
        return unquote(lhs) == unquote(rhs);
    }
    if let Some((lhs, rhs)) = resolved.split_once("!=") {
        return unquote(lhs) != unquote(rhs);
    }
    matches!(unquote(&resolved), "true" | "1")
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

pub fn evaluate_comparison(
    actual: Option<&Value>,
    operator: ComparisonOperator,
    expected: Option<&Value>,
) -> bool {
    match operator {
        ComparisonOperator::Null => matches!(actual, None | Some(Value::Null)),
        ComparisonOperator::NotNull => !matches!(actual, None | Some(Value::Null)),
        ComparisonOperator::Empty => is_empty(actual),
        ComparisonOperator::NotEmpty => !is_empty(actual),
        _ => {
            let (Some(actual), Some(expected)) = (actual, expected) else {
                return false;
            };
            match operator {
                ComparisonOperator::Contains => contains(actual, expected),
                ComparisonOperator::NotContains => !contains(actual, expected),
                ComparisonOperator::StartWith => actual.as_str().is_some_and(|s| s.starts_with(&template::stringify(expected))),
                ComparisonOperator::EndWith => actual.as_str().is_some_and(|s| s.ends_with(&template::stringify(expected))),
                ComparisonOperator::Is => template::stringify(actual) == template::stringify(expected),
                ComparisonOperator::IsNot => template::stringify(actual) != template::stringify(expected),
                ComparisonOperator::Eq => equals(actual, expected),
                ComparisonOperator::Ne => !equals(actual, expected),
                ComparisonOperator::Gt => compare(actual, expected, |a, b| a > b),
                ComparisonOperator::Lt => compare(actual, expected, |a, b| a < b),
                ComparisonOperator::Ge => compare(actual, expected, |a, b| a >= b),
                ComparisonOperator::Le => compare(actual, expected, |a, b| a <= b),
                _ => false,
            }
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(arr)) => arr.is_empty(),
        Some(Value::Object(obj)) => obj.is_empty(),
        _ => false,
    }
}

fn contains(
    actual: &Value,
    expected: &Value,
) -> bool {
    let needle = template::stringify(expected);
    match actual {
        Value::String(s) => s.contains(&needle),
        Value::Array(arr) => arr.iter().any(|v| template::stringify(v) == needle),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn equals(
    actual: &Value,
    expected: &Value,
) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => template::stringify(actual) == template::stringify(expected),
    }
}

fn compare(
    actual: &Value,
    expected: &Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
