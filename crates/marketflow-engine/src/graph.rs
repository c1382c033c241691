//! Transform graph construction
//!
//! Nodes are keyed by name in a [`DependencyGraph`]; the node bodies live in
//! a side table so the graph itself only deals with identifiers.

use marketflow_core::PipelineConfig;
use marketflow_dag::{DependencyGraph, GraphError};
use marketflow_jinja::TemplateStore;
use std::collections::{BTreeMap, HashMap};
use crate::error::RunError;
use crate::transform::TransformNode;

/// Transform nodes plus their precedence edges, built fresh for each run
#[derive(Debug, Clone, Default)]
pub struct TransformGraph {
    graph: DependencyGraph,
    nodes: HashMap<String, TransformNode>,
}

impl TransformGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[[transforms]]` declaration
    ///
    /// Every node is registered before any edge, so declaration order of the
    /// transforms does not matter for dependency resolution.
    pub fn from_config(config: &PipelineConfig, templates: &dyn TemplateStore) -> Result<Self, RunError> {
        let mut graph = Self::new();

        for transform in &config.transforms {
            let template = templates.template(&transform.name)?;
            graph.add(TransformNode::new(
                transform.name.clone(),
                transform.target_table(),
                template,
            ))?;
        }

        for transform in &config.transforms {
            for dependency in &transform.depends_on {
                graph.add_dependency(&transform.name, dependency)?;
            }
        }

        Ok(graph)
    }

    pub fn add(&mut self, node: TransformNode) -> Result<(), GraphError> {
        self.graph.add_node(node.name())?;
        self.nodes.insert(node.name().to_string(), node);
        Ok(())
    }

    /// Declare that `node` reads the output of `depends_on`
    pub fn add_dependency(&mut self, node: &str, depends_on: &str) -> Result<(), GraphError> {
        self.graph.add_edge(node, depends_on)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TransformNode> {
        self.nodes.get(name)
    }

    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.graph.dependencies(name).into_iter().map(String::as_str).collect()
    }

    /// Nodes in execution order
    pub fn execution_order(&self) -> Result<Vec<&TransformNode>, GraphError> {
        Ok(self
            .graph
            .topological_order()?
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .collect())
    }

    /// Transform name -> output table, for `ref()`
    pub fn output_tables(&self) -> BTreeMap<String, String> {
        self.nodes
            .values()
            .map(|node| (node.name().to_string(), node.target_table().to_string()))
            .collect()
    }
}
