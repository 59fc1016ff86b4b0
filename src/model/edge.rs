use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeModel {
    /// Whether this edge is taken for the branch `key`.
    ///
    /// An edge with an empty `condition` matches any branch; otherwise the key
    /// must equal its `condition` or its `sourcePort`.
    pub fn matches(
        &self,
        key: &str,
    ) -> bool {
        let condition = self.condition.as_deref().map(str::trim).unwrap_or_default();
        condition.is_empty() || condition == key || self.source_port.as_deref().map(str::trim) == Some(key)
    }

    /// Label shown for the edge in graph dumps.
    pub fn label(&self) -> Option<&str> {
        [self.condition.as_deref(), self.source_port.as_deref()].into_iter().flatten().map(str::trim).find(|g| !g.is_empty())
    }
}
