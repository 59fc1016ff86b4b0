use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node type tag; the string form is the executor registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    #[default]
    Start,
    End,
    Llm,
    Tool,
    Condition,
    HumanConfirm,
    Plugin,
    Code,
    SubWorkflow,
    Custom(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Llm => "llm",
            NodeType::Tool => "tool",
            NodeType::Condition => "condition",
            NodeType::HumanConfirm => "human_confirm",
            NodeType::Plugin => "plugin",
            NodeType::Code => "code",
            NodeType::SubWorkflow => "sub_workflow",
            NodeType::Custom(s) => s.as_str(),
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "start" => NodeType::Start,
            "end" => NodeType::End,
            "llm" => NodeType::Llm,
            "tool" => NodeType::Tool,
            "condition" => NodeType::Condition,
            "human_confirm" => NodeType::HumanConfirm,
            "plugin" => NodeType::Plugin,
            "code" => NodeType::Code,
            "sub_workflow" | "workflow" => NodeType::SubWorkflow,
            _ => NodeType::Custom(s),
        }
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared input or confirmation parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterModel {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, alias = "default_value", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub name: String,
    /// Type-specific configuration, opaque to the engine.
    #[serde(default, alias = "config")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

impl NodeModel {
    /// The node name, falling back to its type.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.node_type.to_string()
        } else {
            self.name.clone()
        }
    }

    pub fn config(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    /// First non-empty string value among `keys`.
    pub fn config_str(
        &self,
        keys: &[&str],
    ) -> Option<String> {
        keys.iter().filter_map(|k| self.data.get(*k)).find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn config_bool(
        &self,
        key: &str,
    ) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn config_u64(
        &self,
        key: &str,
    ) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_node_type_round_trip() {
        let node: NodeModel = serde_json::from_value(json!({"id": "n", "type": "workflow", "config": {"workflowId": "w2"}})).unwrap();
        assert_eq!(node.node_type, NodeType::SubWorkflow);
        assert_eq!(node.config_str(&["workflowId"]), Some("w2".to_string()));
        assert_eq!(serde_json::to_value(&node.node_type).unwrap(), json!("sub_workflow"));

        let custom: NodeModel = serde_json::from_value(json!({"id": "c", "type": "webhook"})).unwrap();
        assert_eq!(custom.node_type, NodeType::Custom("webhook".to_string()));
        assert_eq!(custom.display_name(), "webhook");
    }

    #[test]
    fn test_config_str_alias_order() {
        let node: NodeModel = serde_json::from_value(json!({"id": "n", "type": "llm", "data": {"llmId": "", "modelId": 7}})).unwrap();
        assert_eq!(node.config_str(&["llmId", "modelId"]), Some("7".to_string()));
        assert_eq!(node.config_str(&["missing"]), None);
    }
}
