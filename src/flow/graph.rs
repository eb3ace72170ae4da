//! Flow graph model (C8)
//!
//! A graph is represented by index-by-ID maps rather than back-pointers
//! (§9): nodes own no reference to their neighbors, the graph's `nodes` and
//! `edges` maps are authoritative. Node kind is a tagged variant — `kind`
//! discriminates how the shared fields (`next`, `input_data`,
//! `executor_config`, ...) are interpreted, rather than a subclass hierarchy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which graph this is: drives default behavior (authentication graphs must
/// have an auth-success node; registration graphs don't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    Authentication,
    Registration,
}

impl Default for GraphType {
    fn default() -> Self {
        GraphType::Authentication
    }
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphType::Authentication => "authentication",
            GraphType::Registration => "registration",
        }
    }
}

/// Discriminates how a node's shared fields are interpreted (§9: tagged
/// variant, not subclassing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    PromptOnly,
    Decision,
    TaskExecution,
    AuthSuccess,
}

/// One declared input a prompt-only node collects from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
}

/// Opaque executor reference: a registered name plus static key/value
/// configuration handed to the executor at invocation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// A single step in a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default)]
    pub prev: Vec<String>,
    #[serde(default)]
    pub input_data: Vec<InputField>,
    #[serde(default)]
    pub executor_config: Option<ExecutorConfig>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            is_start: false,
            is_final: false,
            next: Vec::new(),
            prev: Vec::new(),
            input_data: Vec::new(),
            executor_config: None,
        }
    }

    /// No-op for an empty id or one already present; otherwise appends.
    pub fn add_next_node_id(&mut self, id: &str) {
        add_dedup(&mut self.next, id);
    }

    /// No-op if `id` is absent.
    pub fn remove_next_node_id(&mut self, id: &str) {
        self.next.retain(|n| n != id);
    }

    pub fn add_prev_node_id(&mut self, id: &str) {
        add_dedup(&mut self.prev, id);
    }

    pub fn remove_prev_node_id(&mut self, id: &str) {
        self.prev.retain(|n| n != id);
    }
}

fn add_dedup(list: &mut Vec<String>, id: &str) {
    if id.is_empty() || list.iter().any(|existing| existing == id) {
        return;
    }
    list.push(id.to_string());
}

/// A directed multigraph `G = (N, E, s)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: String,
    #[serde(rename = "type")]
    pub graph_type: GraphType,
    pub nodes: HashMap<String, Node>,
    pub edges: HashMap<String, Vec<String>>,
    pub start_node_id: Option<String>,
}

impl Graph {
    /// A missing `id` yields a freshly generated identifier; a missing
    /// `graph_type` defaults to authentication (§8 invariants).
    pub fn new(id: impl Into<String>, graph_type: Option<GraphType>) -> Self {
        let id = id.into();
        let id = if id.is_empty() { Uuid::new_v4().to_string() } else { id };
        Self {
            id,
            graph_type: graph_type.unwrap_or_default(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            start_node_id: None,
        }
    }

    /// Empty ids are silently ignored; re-adding an existing id replaces it.
    pub fn add_node(&mut self, node: Node) {
        if node.id.is_empty() {
            return;
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn set_start_node(&mut self, id: impl Into<String>) {
        self.start_node_id = Some(id.into());
    }

    /// Both endpoints must already exist as nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return Err(Error::Validation(format!(
                "cannot add edge {from} -> {to}: endpoint not present in graph"
            )));
        }
        self.edges.entry(from.to_string()).or_default().push(to.to_string());
        if let Some(node) = self.nodes.get_mut(from) {
            node.add_next_node_id(to);
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.add_prev_node_id(from);
        }
        Ok(())
    }

    /// Removes one occurrence of the edge if present; a no-op otherwise.
    pub fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(successors) = self.edges.get_mut(from) {
            if let Some(pos) = successors.iter().position(|n| n == to) {
                successors.remove(pos);
            }
        }
        if let Some(node) = self.nodes.get_mut(from) {
            node.remove_next_node_id(to);
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.remove_prev_node_id(from);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Storage(e.to_string()))
    }

    fn unique_auth_success_node(&self) -> Result<&Node> {
        let mut candidates = self.nodes.values().filter(|n| n.kind == NodeKind::AuthSuccess);
        let first = candidates
            .next()
            .ok_or_else(|| Error::Validation("graph has no auth-success node".to_string()))?;
        if candidates.next().is_some() {
            return Err(Error::Validation("graph has more than one auth-success node".to_string()));
        }
        Ok(first)
    }

    /// Derive a registration graph from this authentication graph (§4.6):
    /// deep-clone, retype, insert a provisioning node immediately before the
    /// unique auth-success node.
    pub fn derive_registration(&self) -> Result<Graph> {
        let success_id = self.unique_auth_success_node()?.id.clone();

        let mut derived = self.clone();
        derived.graph_type = GraphType::Registration;

        let provisioning_id = format!("provisioning-{}", Uuid::new_v4());
        let mut provisioning = Node::new(provisioning_id.clone(), NodeKind::TaskExecution);
        provisioning.executor_config =
            Some(ExecutorConfig { name: "ProvisioningExecutor".to_string(), properties: HashMap::new() });
        derived.add_node(provisioning);

        let predecessors: Vec<String> = derived
            .edges
            .iter()
            .filter(|(_, successors)| successors.contains(&success_id))
            .map(|(from, _)| from.clone())
            .collect();

        for predecessor in &predecessors {
            derived.remove_edge(predecessor, &success_id);
            derived.add_edge(predecessor, &provisioning_id)?;
        }
        derived.add_edge(&provisioning_id, &success_id)?;

        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_id_generates_a_fresh_one() {
        let graph = Graph::new("", None);
        assert!(!graph.id.is_empty());
    }

    #[test]
    fn missing_type_defaults_to_authentication() {
        let graph = Graph::new("g1", None);
        assert_eq!(graph.graph_type, GraphType::Authentication);
    }

    #[test]
    fn add_next_node_id_is_idempotent_and_ignores_empty() {
        let mut node = Node::new("n1", NodeKind::PromptOnly);
        node.add_next_node_id("");
        assert!(node.next.is_empty());
        node.add_next_node_id("n2");
        node.add_next_node_id("n2");
        assert_eq!(node.next, vec!["n2".to_string()]);
    }

    #[test]
    fn remove_next_node_id_of_absent_id_is_a_noop() {
        let mut node = Node::new("n1", NodeKind::PromptOnly);
        node.remove_next_node_id("missing");
        assert!(node.next.is_empty());
    }

    #[test]
    fn add_edge_requires_both_endpoints_present() {
        let mut graph = Graph::new("g1", None);
        graph.add_node(Node::new("a", NodeKind::PromptOnly));
        let result = graph.add_edge("a", "missing");
        assert!(result.is_err());
    }

    fn linear_auth_graph() -> Graph {
        let mut graph = Graph::new("g1", Some(GraphType::Authentication));
        graph.add_node(Node::new("start", NodeKind::PromptOnly));
        graph.add_node(Node::new("prompt", NodeKind::PromptOnly));
        graph.add_node(Node::new("success", NodeKind::AuthSuccess));
        graph.set_start_node("start");
        graph.add_edge("start", "prompt").unwrap();
        graph.add_edge("prompt", "success").unwrap();
        graph
    }

    #[test]
    fn derive_registration_inserts_exactly_one_provisioning_node() {
        let auth = linear_auth_graph();
        let derived = auth.derive_registration().unwrap();

        assert_eq!(derived.graph_type, GraphType::Registration);
        assert_eq!(derived.nodes.len(), auth.nodes.len() + 1);

        let provisioning_edges: Vec<_> = derived
            .edges
            .iter()
            .filter(|(_, successors)| successors.contains(&"success".to_string()))
            .collect();
        assert_eq!(provisioning_edges.len(), 1);
        let (provisioning_id, _) = provisioning_edges[0];
        assert_ne!(provisioning_id, "prompt");

        assert!(!derived.edges.get("prompt").unwrap().contains(&"success".to_string()));
    }

    #[test]
    fn derive_registration_fails_without_an_auth_success_node() {
        let mut graph = Graph::new("g1", None);
        graph.add_node(Node::new("start", NodeKind::PromptOnly));
        assert!(graph.derive_registration().is_err());
    }

    #[test]
    fn round_trip_through_json_preserves_structure() {
        let graph = linear_auth_graph();
        let json = graph.to_json().unwrap();
        let parsed = Graph::from_json(&json).unwrap();
        assert_eq!(parsed.id, graph.id);
        assert_eq!(parsed.nodes.len(), graph.nodes.len());
        assert_eq!(parsed.edges, graph.edges);
    }
}
