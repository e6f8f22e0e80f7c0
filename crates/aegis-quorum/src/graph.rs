// QUORUM GRAPHS
// Weighted signer nodes, optional participation conditions and a threshold
//
// SAFETY INVARIANTS:
// 1. A graph is registered once per id and never changes afterwards
// 2. Every node weight is positive and the threshold is reachable
// 3. Quorum requires every required node to hold a condition-satisfied
//    signature AND condition-satisfied weight >= threshold
// 4. A node whose condition is false contributes zero weight

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};

use crate::condition::{lenient_condition, Condition, DecisionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Ministry,
    Agency,
    Operator,
    Regulator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumNode {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Participation condition; `None` means always eligible
    #[serde(default, deserialize_with = "lenient_condition")]
    pub conditional: Option<Condition>,
    pub weight: u32,
}

impl QuorumNode {
    pub fn new(node_id: &str, node_type: NodeType, weight: u32) -> Self {
        Self {
            node_id: node_id.to_string(),
            node_type,
            name: node_id.to_string(),
            required: false,
            conditional: None,
            weight,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditional = Some(condition);
        self
    }

    pub fn condition_holds(&self, ctx: &DecisionContext) -> bool {
        self.conditional.as_ref().map_or(true, |c| c.evaluate(ctx))
    }
}

/// Ordering or dependency between two nodes. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumGraph {
    pub graph_id: String,
    pub nodes: Vec<QuorumNode>,
    #[serde(default)]
    pub edges: Vec<QuorumEdge>,
    pub threshold: u32,
    #[serde(default)]
    pub description: String,
}

impl QuorumGraph {
    pub fn node(&self, node_id: &str) -> Option<&QuorumNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn total_weight(&self) -> u64 {
        self.nodes.iter().map(|n| n.weight as u64).sum()
    }

    /// Structural checks. Bad numbers are `Config`, bad shape is `Policy`.
    pub fn validate(&self) -> TrustResult<()> {
        if self.graph_id.trim().is_empty() {
            return Err(TrustError::Policy("quorum graph id is empty".to_string()));
        }
        if self.nodes.is_empty() {
            return Err(TrustError::Policy(format!("quorum graph {} has no nodes", self.graph_id)));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.node_id.trim().is_empty() {
                return Err(TrustError::Policy(format!(
                    "quorum graph {} has a node without id",
                    self.graph_id
                )));
            }
            if !seen.insert(node.node_id.as_str()) {
                return Err(TrustError::Policy(format!(
                    "quorum graph {} repeats node {}",
                    self.graph_id, node.node_id
                )));
            }
            if node.weight == 0 {
                return Err(TrustError::Config(format!(
                    "node {} in quorum graph {} has zero weight",
                    node.node_id, self.graph_id
                )));
            }
        }

        if self.threshold == 0 {
            return Err(TrustError::Config(format!(
                "quorum graph {} has zero threshold",
                self.graph_id
            )));
        }
        if self.threshold as u64 > self.total_weight() {
            return Err(TrustError::Config(format!(
                "quorum graph {} threshold {} exceeds total weight {}",
                self.graph_id,
                self.threshold,
                self.total_weight()
            )));
        }

        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !seen.contains(end.as_str()) {
                    return Err(TrustError::Policy(format!(
                        "edge {} -> {} in quorum graph {} references unknown node {}",
                        edge.from, edge.to, self.graph_id, end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluates quorum for `(node_id, weight)` signatures against `ctx`.
    ///
    /// Each signature counts with the weight captured when it was taken.
    /// Signers that are not nodes of this graph are ignored.
    pub fn evaluate<'a>(
        &self,
        signed: impl IntoIterator<Item = (&'a str, u32)>,
        ctx: &DecisionContext,
    ) -> QuorumEvaluation {
        let signed: HashMap<&str, u32> = signed.into_iter().collect();
        let mut accumulated_weight = 0u64;
        let mut missing_required = Vec::new();
        let mut unsatisfied_conditions = Vec::new();

        for node in &self.nodes {
            let holds = node.condition_holds(ctx);
            if !holds {
                unsatisfied_conditions.push(node.node_id.clone());
            }
            match signed.get(node.node_id.as_str()) {
                Some(weight) if holds => accumulated_weight += *weight as u64,
                _ if node.required => missing_required.push(node.node_id.clone()),
                _ => {}
            }
        }

        let threshold = self.threshold as u64;
        QuorumEvaluation {
            quorum_met: missing_required.is_empty() && accumulated_weight >= threshold,
            accumulated_weight,
            threshold,
            missing_required,
            unsatisfied_conditions,
        }
    }
}

/// Outcome of a quorum evaluation. Also produced for count-based policies,
/// where every signature weighs 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumEvaluation {
    pub quorum_met: bool,
    pub accumulated_weight: u64,
    pub threshold: u64,
    /// Required participants without a counting signature
    pub missing_required: Vec<String>,
    /// Nodes whose condition is currently false
    pub unsatisfied_conditions: Vec<String>,
}

/// Register-once store of quorum graphs.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    graphs: RwLock<HashMap<String, Arc<QuorumGraph>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, graph: QuorumGraph) -> TrustResult<Arc<QuorumGraph>> {
        graph.validate()?;
        let mut graphs = self.graphs.write();
        if graphs.contains_key(&graph.graph_id) {
            return Err(TrustError::duplicate("quorum graph", graph.graph_id));
        }
        info!(
            "quorum graph {} registered: {} nodes, threshold {}",
            graph.graph_id,
            graph.nodes.len(),
            graph.threshold
        );
        let graph = Arc::new(graph);
        graphs.insert(graph.graph_id.clone(), Arc::clone(&graph));
        Ok(graph)
    }

    pub fn get(&self, graph_id: &str) -> TrustResult<Arc<QuorumGraph>> {
        self.graphs
            .read()
            .get(graph_id)
            .cloned()
            .ok_or_else(|| TrustError::not_found("quorum graph", graph_id))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
