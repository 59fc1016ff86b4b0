//! Parsed workflow definition backed by a directed graph.
//!
//! A [`Definition`] is immutable once built: run progress lives in
//! `ChainState`, so one definition can be shared by every run of a workflow.

use std::collections::{HashMap, HashSet};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::{Bfs, EdgeRef},
};
use tracing::warn;

use crate::{
    ChainError, Result,
    model::{EdgeModel, NodeModel, NodeType, ParameterModel, WorkflowModel},
};

#[derive(Debug, Clone)]
pub struct Definition {
    model: WorkflowModel,
    graph: DiGraph<NodeModel, EdgeModel>,
    index: HashMap<String, NodeIndex>,
}

impl Definition {
    /// Parse workflow JSON without structural checks.
    pub fn parse(content: &str) -> Result<WorkflowModel> {
        WorkflowModel::from_json(content)
    }

    /// Parse and validate workflow JSON into a graph.
    pub fn load(content: &str) -> Result<Self> {
        let model = Self::parse(content)?;
        Self::try_from(&model)
    }

    /// Structural checks, always evaluated in the same order so the same
    /// broken definition yields the same error.
    pub fn validate(model: &WorkflowModel) -> Result<()> {
        if model.nodes.is_empty() {
            return Err(ChainError::Validation("workflow has no nodes".to_string()));
        }

        let starts = model.nodes.iter().filter(|n| n.node_type == NodeType::Start).count();
        if starts == 0 {
            return Err(ChainError::Validation("workflow has no start node".to_string()));
        }
        if starts > 1 {
            return Err(ChainError::Validation(format!("workflow has {} start nodes, expected exactly one", starts)));
        }

        if !model.nodes.iter().any(|n| n.node_type == NodeType::End) {
            return Err(ChainError::Validation("workflow has no end node".to_string()));
        }

        let mut ids = HashSet::new();
        for node in model.nodes.iter() {
            if node.id.is_empty() {
                return Err(ChainError::Validation("node id must not be empty".to_string()));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ChainError::Validation(format!("duplicate node id: {}", node.id)));
            }
        }

        for edge in model.edges.iter() {
            if !ids.contains(edge.source.as_str()) {
                return Err(ChainError::Validation(format!("edge source node does not exist: {}", edge.source)));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(ChainError::Validation(format!("edge target node does not exist: {}", edge.target)));
            }
        }

        Ok(())
    }

    pub fn model(&self) -> &WorkflowModel {
        &self.model
    }

    pub fn id(&self) -> &str {
        &self.model.id
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeModel> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn start_node(&self) -> Result<&NodeModel> {
        self.graph
            .node_weights()
            .find(|n| n.node_type == NodeType::Start)
            .ok_or_else(|| ChainError::Validation("workflow has no start node".to_string()))
    }

    pub fn end_nodes(&self) -> Vec<&NodeModel> {
        self.graph.node_weights().filter(|n| n.node_type == NodeType::End).collect()
    }

    /// Inputs declared on the start node.
    pub fn start_parameters(&self) -> &[ParameterModel] {
        self.start_node().map(|n| n.parameters.as_slice()).unwrap_or_default()
    }

    /// Outgoing edges of `id` in definition order.
    pub fn outgoing_edges(
        &self,
        id: &str,
    ) -> Vec<&EdgeModel> {
        self.edges_directed(id, Direction::Outgoing).into_iter().map(|(_, edge)| edge).collect()
    }

    /// Targets of the outgoing edges of `id`, in edge-definition order.
    pub fn next_nodes(
        &self,
        id: &str,
    ) -> Vec<&NodeModel> {
        self.edges_directed(id, Direction::Outgoing).into_iter().map(|(idx, _)| &self.graph[idx]).collect()
    }

    /// Sources of the incoming edges of `id`, in edge-definition order.
    pub fn previous_nodes(
        &self,
        id: &str,
    ) -> Vec<&NodeModel> {
        self.edges_directed(id, Direction::Incoming).into_iter().map(|(idx, _)| &self.graph[idx]).collect()
    }

    /// Edges touching `id` sorted by edge index, which is the definition order.
    /// Each entry carries the node on the other side of the edge.
    fn edges_directed(
        &self,
        id: &str,
        dir: Direction,
    ) -> Vec<(NodeIndex, &EdgeModel)> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges = self
            .graph
            .edges_directed(*idx, dir)
            .filter_map(|e| {
                let (source, target) = self.graph.edge_endpoints(e.id())?;
                let other = match dir {
                    Direction::Outgoing => target,
                    Direction::Incoming => source,
                };
                Some((e.id().index(), other, e.weight()))
            })
            .collect::<Vec<_>>();
        edges.sort_by_key(|(order, _, _)| *order);
        edges.into_iter().map(|(_, other, edge)| (other, edge)).collect()
    }

    /// Output a human-readable representation of the workflow graph
    pub fn schema(&self) -> String {
        let graph = &self.graph;
        let mut lines = Vec::new();

        lines.push(format!("=== Workflow {} ===", self.model.id));
        lines.push(format!("Nodes: {}, Edges: {}", graph.node_count(), graph.edge_count()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for node in graph.node_weights() {
            lines.push(format!("[{}] {} (type: {})", node.id, node.display_name(), node.node_type));
        }
        lines.push(String::new());

        lines.push("--- Graph Structure ---".to_string());
        for node in graph.node_weights() {
            let outgoing = self
                .edges_directed(&node.id, Direction::Outgoing)
                .into_iter()
                .map(|(idx, edge)| match edge.label() {
                    Some(guard) => format!("{}({})", graph[idx].id, guard),
                    None => graph[idx].id.clone(),
                })
                .collect::<Vec<_>>();

            if outgoing.is_empty() {
                lines.push(format!("{} -> (end)", node.id));
            } else {
                lines.push(format!("{} -> {}", node.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }
}

impl TryFrom<&WorkflowModel> for Definition {
    type Error = ChainError;

    fn try_from(model: &WorkflowModel) -> Result<Self> {
        Self::validate(model)?;

        let mut graph: DiGraph<NodeModel, EdgeModel> = DiGraph::new();
        let mut index = HashMap::new();

        for node in model.nodes.iter() {
            let idx = graph.add_node(node.clone());
            index.insert(node.id.clone(), idx);
        }
        for edge in model.edges.iter() {
            let source = index.get(&edge.source).ok_or_else(|| ChainError::Validation(format!("edge source node does not exist: {}", edge.source)))?;
            let target = index.get(&edge.target).ok_or_else(|| ChainError::Validation(format!("edge target node does not exist: {}", edge.target)))?;
            graph.add_edge(*source, *target, edge.clone());
        }

        let definition = Self {
            model: model.clone(),
            graph,
            index,
        };
        definition.warn_unreachable_ends();

        Ok(definition)
    }
}

impl Definition {
    fn warn_unreachable_ends(&self) {
        let Some(start) = self.start_node().ok().and_then(|n| self.index.get(&n.id)) else {
            return;
        };
        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, *start);
        while let Some(idx) = bfs.next(&self.graph) {
            reachable.insert(idx);
        }
        for end in self.end_nodes() {
            if self.index.get(&end.id).is_some_and(|idx| !reachable.contains(idx)) {
                warn!(workflow_id = %self.model.id, node_id = %end.id, "end node is not reachable from the start node");
            }
        }
    }
}
