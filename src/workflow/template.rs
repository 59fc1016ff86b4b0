use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::common::Vars;

/// Placeholder format: `${name}` or `${name.key.subkey}`
static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder pattern"));

/// Look up `path` in `vars`: an exact key first, then a dotted path into nested objects.
pub fn lookup(
    vars: &Vars,
    path: &str,
) -> Option<Value> {
    let path = path.trim();
    if let Some(v) = vars.get_value(path) {
        return Some(v.clone());
    }

    let mut keys = path.split('.');
    let mut current = vars.get_value(keys.next()?)?;
    for key in keys {
        current = match current {
            Value::Array(arr) => arr.get(key.parse::<usize>().ok()?)?,
            other => other.get(key)?,
        };
    }
    Some(current.clone())
}

/// Render a value the way it appears inside a string.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

/// Replace every `${var}` in `template`. Unknown placeholders are left as written.
pub fn resolve_template(
    vars: &Vars,
    template: &str,
) -> String {
    VARIABLE_PATTERN
        .replace_all(template, |caps: &regex::Captures| match lookup(vars, &caps[1]) {
            Some(value) => stringify(&value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolve a single string value.
///
/// A string that is exactly one placeholder yields the raw variable value,
/// so `"${items}"` keeps its array type.
pub fn resolve_variable(
    vars: &Vars,
    value: &str,
) -> Value {
    let trimmed = value.trim();
    if let Some(caps) = VARIABLE_PATTERN.captures(trimmed)
        && caps[0].len() == trimmed.len()
        && let Some(v) = lookup(vars, &caps[1])
    {
        return v;
    }
    Value::String(resolve_template(vars, value))
}

/// Resolve placeholders in a JSON value recursively.
pub fn resolve_json_value(
    vars: &Vars,
    value: &Value,
) -> Value {
    match value {
        Value::String(s) => resolve_variable(vars, s),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve_json_value(vars, v)).collect()),
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), resolve_json_value(vars, v))).collect()),
        _ => value.clone(),
    }
}
