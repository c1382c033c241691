//! Transform dependency graph
//!
//! This crate handles:
//! - Registering transform nodes and their precedence edges
//! - Rejecting dangling dependencies when edges are declared
//! - Producing a deterministic topological order
//! - Reporting cycles instead of looping

pub mod dag;

pub use dag::{DependencyGraph, GraphError, NodeId};
