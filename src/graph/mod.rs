//! Pipeline graph: typed node registry, static and conditional edges.
//!
//! Nodes are identified by the closed [`NodeId`] enumeration. Registration
//! order is significant: it is the stable tie-break the executor uses when
//! concurrent branches write the same evidence key.

mod executor;
mod node;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::state::RunState;

pub use executor::Executor;
pub use node::{node_fn, DeltaSink, FnNode, Node};

/// Identifier of every node the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// Input validation.
    Preflight,
    /// Repository collector.
    RepoInvestigator,
    /// Document collector.
    DocAnalyst,
    /// Diagram and media collector.
    VisionInspector,
    /// Collector fan-in.
    EvidenceAggregator,
    /// Adversarial voter.
    Prosecutor,
    /// Charitable voter.
    Defense,
    /// Pragmatic voter.
    TechLead,
    /// Anomaly and consistency scan.
    ConsistencyCheck,
    /// Adjudicator; writes the verdict.
    ChiefJustice,
}

impl NodeId {
    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::RepoInvestigator => "repo_investigator",
            Self::DocAnalyst => "doc_analyst",
            Self::VisionInspector => "vision_inspector",
            Self::EvidenceAggregator => "evidence_aggregator",
            Self::Prosecutor => "prosecutor",
            Self::Defense => "defense",
            Self::TechLead => "tech_lead",
            Self::ConsistencyCheck => "consistency_check",
            Self::ChiefJustice => "chief_justice",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Continue at a node.
    Node(NodeId),
    /// Terminal sentinel: short-circuit the rest of the graph.
    End,
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::End => f.write_str("END"),
        }
    }
}

/// Routing function for a conditional edge. Must be a pure function of state.
pub type RouteFn = Arc<dyn Fn(&RunState) -> Vec<Target> + Send + Sync>;

/// Outgoing relation of a node.
#[derive(Clone)]
pub enum Edge {
    /// Always followed.
    Static {
        /// Source node.
        from: NodeId,
        /// Destination.
        to: Target,
    },
    /// Followed to whatever `route` returns, restricted to `targets`.
    Conditional {
        /// Source node.
        from: NodeId,
        /// Every target `route` may return.
        targets: Vec<Target>,
        /// Routing function.
        route: RouteFn,
    },
}

impl Edge {
    /// Source node.
    #[must_use]
    pub const fn from(&self) -> NodeId {
        match self {
            Self::Static { from, .. } | Self::Conditional { from, .. } => *from,
        }
    }

    /// Every target this edge can lead to.
    #[must_use]
    pub fn possible_targets(&self) -> Vec<Target> {
        match self {
            Self::Static { to, .. } => vec![*to],
            Self::Conditional { targets, .. } => targets.clone(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { from, to } => write!(f, "{from} -> {to}"),
            Self::Conditional { from, targets, .. } => write!(f, "{from} -?> {targets:?}"),
        }
    }
}

struct Registered {
    id: NodeId,
    node: Arc<dyn Node>,
}

/// A validated, acyclic pipeline graph.
pub struct Graph {
    nodes: Vec<Registered>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    entry: NodeId,
    /// `reach[i]` holds the ranks reachable from rank `i` over any possible edge.
    reach: Vec<HashSet<usize>>,
}

impl Graph {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Entry node.
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Registration rank of a node.
    #[must_use]
    pub fn rank(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Node ids in registration order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|r| r.id).collect()
    }

    /// True when `id` is registered.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from() == id)
    }

    /// True when rank `to` can be reached from rank `from` (not counting `from` itself).
    pub(crate) fn rank_reaches(&self, from: usize, to: usize) -> bool {
        self.reach.get(from).is_some_and(|set| set.contains(&to))
    }

    pub(crate) fn handler(&self, rank: usize) -> (NodeId, Arc<dyn Node>) {
        let reg = &self.nodes[rank];
        (reg.id, Arc::clone(&reg.node))
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("entry", &self.entry)
            .field("nodes", &self.node_ids())
            .field("edges", &self.edges)
            .finish()
    }
}

/// Builder for [`Graph`].
///
/// Structural errors are collected and reported by [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Registered>,
    edges: Vec<Edge>,
    entry: Option<NodeId>,
}

impl GraphBuilder {
    /// Registers a node. Registration order is the collision tie-break order.
    #[must_use]
    pub fn node(mut self, id: NodeId, node: Arc<dyn Node>) -> Self {
        self.nodes.push(Registered { id, node });
        self
    }

    /// Adds a static edge.
    #[must_use]
    pub fn edge(mut self, from: NodeId, to: impl Into<Target>) -> Self {
        self.edges.push(Edge::Static { from, to: to.into() });
        self
    }

    /// Adds a conditional edge with its declared target set.
    #[must_use]
    pub fn conditional<F>(mut self, from: NodeId, targets: Vec<Target>, route: F) -> Self
    where
        F: Fn(&RunState) -> Vec<Target> + Send + Sync + 'static,
    {
        self.edges.push(Edge::Conditional {
            from,
            targets,
            route: Arc::new(route),
        });
        self
    }

    /// Sets the entry node.
    #[must_use]
    pub fn entry(mut self, id: NodeId) -> Self {
        self.entry = Some(id);
        self
    }

    /// Validates and builds the graph.
    pub fn build(self) -> Result<Graph, GraphError> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (rank, reg) in self.nodes.iter().enumerate() {
            if index.insert(reg.id, rank).is_some() {
                return Err(GraphError::DuplicateNode { node: reg.id });
            }
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !index.contains_key(&entry) {
            return Err(GraphError::UnknownNode { node: entry });
        }

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let from = *index
                .get(&edge.from())
                .ok_or(GraphError::UnknownNode { node: edge.from() })?;
            let targets = edge.possible_targets();
            if targets.is_empty() {
                return Err(GraphError::NoRouteTargets { from: edge.from() });
            }
            for target in targets {
                if let Target::Node(id) = target {
                    let to = *index.get(&id).ok_or(GraphError::UnknownNode { node: id })?;
                    adjacency[from].push(to);
                }
            }
        }

        if let Some(rank) = detect_cycle(&adjacency) {
            return Err(GraphError::CycleDetected {
                node: self.nodes[rank].id,
            });
        }

        let reach = (0..self.nodes.len())
            .map(|start| reachable(&adjacency, start))
            .collect();

        Ok(Graph {
            nodes: self.nodes,
            index,
            edges: self.edges,
            entry,
            reach,
        })
    }
}

/// Returns a rank on a cycle, if any.
fn detect_cycle(adjacency: &[Vec<usize>]) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(n: usize, adjacency: &[Vec<usize>], marks: &mut [Mark]) -> Option<usize> {
        marks[n] = Mark::InProgress;
        for &next in &adjacency[n] {
            match marks[next] {
                Mark::InProgress => return Some(next),
                Mark::Unvisited => {
                    if let Some(hit) = visit(next, adjacency, marks) {
                        return Some(hit);
                    }
                }
                Mark::Done => {}
            }
        }
        marks[n] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    for n in 0..adjacency.len() {
        if marks[n] == Mark::Unvisited {
            if let Some(hit) = visit(n, adjacency, &mut marks) {
                return Some(hit);
            }
        }
    }
    None
}

fn reachable(adjacency: &[Vec<usize>], start: usize) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack: Vec<usize> = adjacency[start].clone();
    while let Some(n) = stack.pop() {
        if seen.insert(n) {
            stack.extend(adjacency[n].iter().copied());
        }
    }
    seen
}
