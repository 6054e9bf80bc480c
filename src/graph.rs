//! Dependency graph module.
//!
//! Provides the `AttrGraph` type, which records which attributes each
//! derived attribute reads. The engine uses it to reject cyclic rule sets,
//! to fix an evaluation order, and to find what must be recomputed after
//! an input changes.

use crate::attr_id::AttrId;
use crate::error::RuleError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A directed graph of attribute dependencies.
///
/// If attribute A reads attribute B, B must be evaluated before A.
/// Internally the edge runs from B (dependency) to A (dependent).
///
/// # Examples
///
/// ```rust
/// use rulechain::graph::AttrGraph;
/// use rulechain::AttrId;
///
/// let mut graph = AttrGraph::new();
/// let level = AttrId::new("level");
/// let bab = AttrId::new("baseAttack");
///
/// // baseAttack reads level
/// graph.add_edge(bab.clone(), level.clone());
///
/// let order = graph.topological_sort().unwrap();
/// assert_eq!(order, vec![level, bab]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttrGraph {
    graph: DiGraph<AttrId, ()>,
    node_map: HashMap<AttrId, NodeIndex>,
}

impl AttrGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't exist and return its index.
    pub fn add_node(&mut self, id: AttrId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&id) {
            idx
        } else {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id, idx);
            idx
        }
    }

    /// Record that `from` reads `to`. Duplicate edges are collapsed.
    pub fn add_edge(&mut self, from: AttrId, to: AttrId) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.graph.update_edge(to_idx, from_idx, ());
    }

    /// Fail with the first cycle found.
    ///
    /// The returned path is closed and follows data flow, each attribute
    /// being read by the next one: `[A, B, C, A]`. An attribute that reads
    /// itself yields `[A, A]`.
    pub fn detect_cycles(&self) -> Result<(), RuleError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node_idx in self.graph.node_indices() {
            if !visited.contains(&node_idx) {
                let mut cycle_path = Vec::new();
                if let Some(cycle) =
                    self.dfs_cycle_detect(node_idx, &mut visited, &mut rec_stack, &mut cycle_path)
                {
                    return Err(cycle);
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        cycle_path: &mut Vec<NodeIndex>,
    ) -> Option<RuleError> {
        visited.insert(node);
        rec_stack.insert(node);
        cycle_path.push(node);

        for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.dfs_cycle_detect(neighbor, visited, rec_stack, cycle_path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&neighbor) {
                // neighbor is on the stack, so it is in cycle_path
                let start = cycle_path
                    .iter()
                    .position(|&idx| idx == neighbor)
                    .unwrap_or(cycle_path.len() - 1);
                let mut path: Vec<AttrId> = cycle_path[start..]
                    .iter()
                    .map(|&idx| self.graph[idx].clone())
                    .collect();
                path.push(self.graph[neighbor].clone());
                return Some(RuleError::Cycle { path });
            }
        }

        rec_stack.remove(&node);
        cycle_path.pop();
        None
    }

    /// Dependencies-first ordering of every node.
    ///
    /// Among nodes that are ready at the same time, the one added to the
    /// graph first comes first, so the order only depends on the order in
    /// which rules were registered.
    pub fn topological_sort(&self) -> Result<Vec<AttrId>, RuleError> {
        self.detect_cycles()?;

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            order.push(self.graph[idx].clone());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != self.graph.node_count() {
            // Unreachable after detect_cycles, reported rather than trusted.
            let stuck = self
                .graph
                .node_indices()
                .find(|idx| in_degree[idx.index()] > 0)
                .map(|idx| self.graph[idx].clone());
            return Err(RuleError::Cycle {
                path: stuck.into_iter().collect(),
            });
        }
        Ok(order)
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> Vec<AttrId> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    pub fn contains_node(&self, id: &AttrId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Attributes `id` reads directly.
    pub fn dependencies_of(&self, id: &AttrId) -> Vec<AttrId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Attributes that read `id` directly.
    pub fn dependents_of(&self, id: &AttrId) -> Vec<AttrId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &AttrId, dir: Direction) -> Vec<AttrId> {
        match self.node_map.get(id) {
            Some(&idx) => {
                let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
                out.sort();
                out.into_iter().map(|n| self.graph[n].clone()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Every attribute that transitively reads any of `changed`,
    /// including the changed attributes themselves when they are nodes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rulechain::graph::AttrGraph;
    /// use rulechain::AttrId;
    ///
    /// let mut graph = AttrGraph::new();
    /// graph.add_edge(AttrId::new("strengthModifier"), AttrId::new("strength"));
    /// graph.add_edge(AttrId::new("meleeAttack"), AttrId::new("strengthModifier"));
    /// graph.add_edge(AttrId::new("rangedAttack"), AttrId::new("dexterityModifier"));
    ///
    /// let affected = graph.downstream_of(&[AttrId::new("strength")]);
    /// assert_eq!(affected.len(), 3);
    /// assert!(!affected.contains(&AttrId::new("rangedAttack")));
    /// ```
    pub fn downstream_of(&self, changed: &[AttrId]) -> HashSet<AttrId> {
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> = changed
            .iter()
            .filter_map(|id| self.node_map.get(id).copied())
            .collect();

        while let Some(idx) = stack.pop() {
            if !seen.insert(idx) {
                continue;
            }
            stack.extend(
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .filter(|n| !seen.contains(n)),
            );
        }

        seen.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }

    /// Subgraph holding only `targets` and everything they depend on.
    ///
    /// Targets that are not in the graph are ignored.
    pub fn subgraph_for_targets(&self, targets: &[AttrId]) -> AttrGraph {
        let mut subgraph = AttrGraph::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<AttrId> = targets.to_vec();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }

            if let Some(&node_idx) = self.node_map.get(&id) {
                subgraph.add_node(id.clone());

                for dep_idx in self.graph.neighbors_directed(node_idx, Direction::Incoming) {
                    let dep = self.graph[dep_idx].clone();
                    if !visited.contains(&dep) {
                        stack.push(dep.clone());
                    }
                    subgraph.add_edge(id.clone(), dep);
                }
            }
        }

        subgraph
    }
}
