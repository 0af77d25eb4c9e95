//! Execution graph over recovery steps.
//!
//! An edge `from -> to` means `to` depends on `from`: `from` must finish
//! first. Batching is deterministic: every frontier is sorted by node id
//! before it is emitted, so the same node and edge sets produce the same
//! batches whatever order they were inserted in.

use indexmap::IndexSet;
use keystone_core::{Step, StepId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::hash::Hash;

/// Graph result type
pub type GraphResult<T> = Result<T, GraphError>;

/// Graph mutation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Edge endpoint is not a node
    #[error("Unknown node: {id}")]
    UnknownNode {
        /// Missing id
        id: String,
    },
}

/// Dependency edge: `to` waits for `from`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge<N> {
    /// Prerequisite
    pub from: N,
    /// Dependent
    pub to: N,
}

impl<N> Edge<N> {
    /// Create a new edge
    #[must_use]
    pub fn new(from: N, to: N) -> Self {
        Self { from, to }
    }
}

/// Directed graph of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "N: Serialize + Hash + Eq",
    deserialize = "N: Deserialize<'de> + Hash + Eq"
))]
pub struct ExecutionGraph<N = StepId> {
    nodes: IndexSet<N>,
    edges: IndexSet<Edge<N>>,
}

impl<N> Default for ExecutionGraph<N> {
    fn default() -> Self {
        Self {
            nodes: IndexSet::new(),
            edges: IndexSet::new(),
        }
    }
}

impl<N> ExecutionGraph<N>
where
    N: Clone + Ord + Hash + std::fmt::Display,
{
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns `false` if it was already present
    pub fn add_node(&mut self, id: N) -> bool {
        self.nodes.insert(id)
    }

    /// Add a dependency edge between existing nodes
    ///
    /// Returns `false` if the edge was already present.
    ///
    /// # Errors
    ///
    /// Returns error if either endpoint is not a node
    pub fn add_edge(&mut self, from: N, to: N) -> GraphResult<bool> {
        for id in [&from, &to] {
            if !self.nodes.contains(id) {
                return Err(GraphError::UnknownNode { id: id.to_string() });
            }
        }
        Ok(self.link(from, to))
    }

    fn link(&mut self, from: N, to: N) -> bool {
        self.edges.insert(Edge::new(from, to))
    }

    /// Whether `id` is a node
    #[must_use]
    pub fn contains(&self, id: &N) -> bool {
        self.nodes.contains(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.iter()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge<N>> {
        self.edges.iter()
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that wait for `id`, sorted
    #[must_use]
    pub fn dependents(&self, id: &N) -> Vec<N> {
        let mut out: Vec<N> = self
            .edges
            .iter()
            .filter(|e| &e.from == id)
            .map(|e| e.to.clone())
            .collect();
        out.sort();
        out
    }

    /// Nodes `id` waits for, sorted
    #[must_use]
    pub fn dependencies(&self, id: &N) -> Vec<N> {
        let mut out: Vec<N> = self
            .edges
            .iter()
            .filter(|e| &e.to == id)
            .map(|e| e.from.clone())
            .collect();
        out.sort();
        out
    }

    /// Nodes that are never an edge target, sorted
    #[must_use]
    pub fn roots(&self) -> Vec<N> {
        let mut out: Vec<N> = self
            .nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| &e.to == *n))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Kahn's algorithm with a lexicographic frontier
    ///
    /// Each batch only contains nodes whose prerequisites all appear in
    /// earlier batches. Nodes on or behind a cycle are never emitted.
    #[must_use]
    pub fn topological_batches(&self) -> Vec<Vec<N>> {
        let mut in_degree: BTreeMap<&N, usize> = self.nodes.iter().map(|n| (n, 0)).collect();
        let mut successors: BTreeMap<&N, Vec<&N>> = BTreeMap::new();

        for edge in &self.edges {
            if !self.nodes.contains(&edge.from) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(&edge.to) {
                *degree += 1;
                successors.entry(&edge.from).or_default().push(&edge.to);
            }
        }

        // BTreeMap iteration is already sorted
        let mut frontier: Vec<&N> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut batches = Vec::new();

        while !frontier.is_empty() {
            frontier.sort();
            let mut next = Vec::new();
            for node in &frontier {
                for succ in successors.get(node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(*succ) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*succ);
                        }
                    }
                }
            }
            batches.push(frontier.into_iter().cloned().collect());
            frontier = next;
        }

        batches
    }

    /// Batches flattened into one order
    ///
    /// Only trustworthy after [`Self::detect_cycle`] returned `false`.
    #[must_use]
    pub fn linear_order(&self) -> Vec<N> {
        self.topological_batches().into_iter().flatten().collect()
    }

    /// Whether batching failed to emit every node
    #[must_use]
    pub fn detect_cycle(&self) -> bool {
        let emitted: usize = self.topological_batches().iter().map(Vec::len).sum();
        emitted < self.nodes.len()
    }

    /// Nodes batching never emits, sorted
    #[must_use]
    pub fn blocked_nodes(&self) -> Vec<N> {
        let emitted: IndexSet<N> = self.linear_order().into_iter().collect();
        let mut out: Vec<N> = self
            .nodes
            .iter()
            .filter(|n| !emitted.contains(*n))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Number of batches
    #[must_use]
    pub fn depth(&self) -> usize {
        self.topological_batches().len()
    }

    /// Breadth-first walk along dependents, at most `max_depth` hops
    ///
    /// Returns visited ids in visit order, `start` first. An unknown
    /// `start` yields an empty list.
    #[must_use]
    pub fn reachable(&self, start: &N, max_depth: usize) -> Vec<N> {
        if !self.nodes.contains(start) {
            return Vec::new();
        }

        let mut visited: IndexSet<N> = IndexSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start.clone());
        queue.push_back((start.clone(), 0usize));

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= max_depth {
                continue;
            }
            for next in self.dependents(&current) {
                if visited.insert(next.clone()) {
                    queue.push_back((next, hops + 1));
                }
            }
        }

        visited.into_iter().collect()
    }
}

/// Build a graph from a step list
///
/// Dependencies naming ids outside the step set are dropped.
#[must_use]
pub fn build_graph(steps: &[Step]) -> ExecutionGraph<StepId> {
    let mut graph = ExecutionGraph::new();
    for step in steps {
        graph.add_node(step.id.clone());
    }

    for step in steps {
        for dep in &step.depends_on {
            if graph.contains(dep) {
                graph.link(dep.clone(), step.id.clone());
            } else {
                tracing::debug!(step = %step.id, dependency = %dep, "dropping dangling dependency");
            }
        }
    }

    graph
}
