//! Dependency graph (DAG) construction and traversal
//!
//! Nodes live in an arena indexed by insertion order; edges are stored as
//! arena indexes in both directions. Ordering uses Kahn's algorithm and
//! always releases the ready node that was inserted first, so the order is
//! reproducible for a fixed declaration.

use std::collections::{BTreeSet, HashMap};

/// Node identifier (transform name)
pub type NodeId = String;

/// Errors raised while building or ordering the graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Node '{0}' is already registered")]
    DuplicateNode(NodeId),

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    DanglingDependency { node: NodeId, dependency: NodeId },

    #[error("Dependency cycle detected: {}", format_cycle(.cycle))]
    Cycle { cycle: Vec<NodeId> },
}

fn format_cycle(cycle: &[NodeId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// All nodes in insertion order
    nodes: Vec<NodeId>,

    /// Node id -> arena index
    index: HashMap<NodeId, usize>,

    /// Forward edges: node -> nodes it depends on (parents)
    parents: Vec<Vec<usize>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node
    pub fn add_node(&mut self, id: impl Into<NodeId>) -> Result<(), GraphError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(id);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        Ok(())
    }

    /// Declare that `id` depends on `depends_on`
    ///
    /// Both nodes must already be registered. Repeated edges are ignored.
    pub fn add_edge(&mut self, id: &str, depends_on: &str) -> Result<(), GraphError> {
        let dangling = || GraphError::DanglingDependency {
            node: id.to_string(),
            dependency: depends_on.to_string(),
        };
        let node = *self.index.get(id).ok_or_else(dangling)?;
        let parent = *self.index.get(depends_on).ok_or_else(dangling)?;

        if !self.parents[node].contains(&parent) {
            self.parents[node].push(parent);
            self.children[parent].push(node);
        }
        Ok(())
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Get immediate parents (dependencies) of a node
    pub fn dependencies(&self, id: &str) -> Vec<&NodeId> {
        self.index
            .get(id)
            .map(|&i| self.parents[i].iter().map(|&p| &self.nodes[p]).collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn dependents(&self, id: &str) -> Vec<&NodeId> {
        self.index
            .get(id)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    /// Get topological order of all nodes
    ///
    /// Every node appears exactly once and after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm, lowest insertion index first
        while let Some(node) = ready.pop_first() {
            result.push(self.nodes[node].clone());

            for &child in &self.children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            Err(GraphError::Cycle {
                cycle: self.find_cycle(&in_degree),
            })
        }
    }

    /// Extract one cycle among the nodes Kahn's algorithm could not release
    ///
    /// An unreleased node always has an unreleased parent, so walking
    /// parents from any unreleased node must revisit a node.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<NodeId> {
        let Some(start) = in_degree.iter().position(|&d| d > 0) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&pos) = position.get(&current) {
                return path[pos..].iter().map(|&i| self.nodes[i].clone()).collect();
            }
            position.insert(current, path.len());
            path.push(current);

            match self.parents[current].iter().find(|&&p| in_degree[p] > 0) {
                Some(&parent) => current = parent,
                None => return path.iter().map(|&i| self.nodes[i].clone()).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut dag = DependencyGraph::new();
        for node in nodes {
            dag.add_node(*node).unwrap();
        }
        for (node, dep) in edges {
            dag.add_edge(node, dep).unwrap();
        }
        dag
    }

    #[test]
    fn empty_graph_orders_to_nothing() {
        assert_eq!(DependencyGraph::new().topological_order().unwrap(), Vec::<NodeId>::new());
    }

    #[test]
    fn ties_follow_insertion_order() {
        let dag = graph(&["c", "a", "b"], &[]);
        assert_eq!(dag.topological_order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_come_first() {
        let dag = graph(
            &["aggregated_stock_profiles", "stock_prices_in_currencies"],
            &[("aggregated_stock_profiles", "stock_prices_in_currencies")],
        );
        assert_eq!(
            dag.topological_order().unwrap(),
            vec!["stock_prices_in_currencies", "aggregated_stock_profiles"]
        );
    }

    #[test]
    fn diamond() {
        let dag = graph(
            &["d", "b", "c", "a"],
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
        );
        assert_eq!(dag.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(dag.dependencies("d"), vec!["b", "c"]);
        assert_eq!(dag.dependents("a"), vec!["b", "c"]);
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut dag = DependencyGraph::new();
        dag.add_node("a").unwrap();
        assert_eq!(dag.add_node("a"), Err(GraphError::DuplicateNode("a".to_string())));
    }

    #[test]
    fn dangling_dependency_rejected_at_build_time() {
        let mut dag = DependencyGraph::new();
        dag.add_node("a").unwrap();
        assert_eq!(
            dag.add_edge("a", "missing"),
            Err(GraphError::DanglingDependency {
                node: "a".to_string(),
                dependency: "missing".to_string(),
            })
        );
        assert!(dag.add_edge("missing", "a").is_err());
        assert!(dag.dependencies("a").is_empty());
    }

    #[test]
    fn repeated_edge_is_ignored() {
        let dag = graph(&["a", "b"], &[("b", "a"), ("b", "a")]);
        assert_eq!(dag.dependencies("b").len(), 1);
        assert_eq!(dag.topological_order().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn cycle_reported_with_members() {
        let dag = graph(&["x", "a", "b", "c"], &[("a", "c"), ("b", "a"), ("c", "b")]);
        match dag.topological_order() {
            Err(GraphError::Cycle { cycle }) => {
                assert_eq!(cycle.len(), 3);
                for node in ["a", "b", "c"] {
                    assert!(cycle.contains(&node.to_string()));
                }
                assert!(!cycle.contains(&"x".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn cycle_excludes_nodes_downstream_of_it() {
        let dag = graph(&["a", "b", "tail"], &[("a", "b"), ("b", "a"), ("tail", "a")]);
        let Err(GraphError::Cycle { cycle }) = dag.topological_order() else {
            panic!("expected cycle");
        };
        assert_eq!(cycle.len(), 2);
        assert!(!cycle.contains(&"tail".to_string()));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let dag = graph(&["a"], &[("a", "a")]);
        assert_eq!(
            dag.topological_order(),
            Err(GraphError::Cycle { cycle: vec!["a".to_string()] })
        );
    }

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = GraphError::Cycle {
            cycle: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }
}
