//! Signal graph topology
//!
//! DAG using petgraph's StableGraph. Node handles are small arena-style
//! [`NodeId`]s that stay valid for the graph's lifetime; connecting two
//! nodes that would close a loop is rejected.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Direction;
use thiserror::Error;

use crate::audio::NodeId;

/// Errors that can occur during graph operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("cycle detected in graph")]
    CycleDetected,
}

/// A directed acyclic graph of signal nodes
pub struct SignalGraph<T> {
    inner: StableGraph<T, ()>,
    index_map: HashMap<NodeId, NodeIndex>,
    id_map: HashMap<NodeIndex, NodeId>,
    topo_order: Option<Vec<NodeId>>,
    next_id: u32,
}

impl<T> SignalGraph<T> {
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            index_map: HashMap::new(),
            id_map: HashMap::new(),
            topo_order: None,
            next_id: 0,
        }
    }

    /// Add a node, returning its handle
    pub fn add_node(&mut self, node: T) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let index = self.inner.add_node(node);
        self.index_map.insert(id, index);
        self.id_map.insert(index, id);
        self.invalidate_topo();
        id
    }

    /// Connect `source` into `dest`. Connecting twice is a no-op.
    pub fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError> {
        let source_idx = self.index(source)?;
        let dest_idx = self.index(dest)?;

        if self.inner.find_edge(source_idx, dest_idx).is_some() {
            return Ok(());
        }

        let edge = self.inner.add_edge(source_idx, dest_idx, ());
        if is_cyclic_directed(&self.inner) {
            self.inner.remove_edge(edge);
            return Err(GraphError::CycleDetected);
        }

        self.invalidate_topo();
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&T> {
        let index = self.index_map.get(&id)?;
        self.inner.node_weight(*index)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let index = self.index_map.get(&id)?;
        self.inner.node_weight_mut(*index)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// All node handles, oldest first
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.index_map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Nodes feeding directly into `id`
    pub fn inputs(&self, id: NodeId) -> Vec<NodeId> {
        let Some(index) = self.index_map.get(&id) else {
            return vec![];
        };
        self.inner
            .neighbors_directed(*index, Direction::Incoming)
            .filter_map(|n| self.id_map.get(&n).copied())
            .collect()
    }

    /// Get the cached topological processing order, computing if necessary
    pub fn processing_order(&mut self) -> Result<&[NodeId], GraphError> {
        if self.topo_order.is_none() {
            let order = toposort(&self.inner, None).map_err(|_| GraphError::CycleDetected)?;
            let ids = order
                .into_iter()
                .filter_map(|index| self.id_map.get(&index).copied())
                .collect();
            self.topo_order = Some(ids);
        }
        Ok(self.topo_order.as_deref().unwrap_or_default())
    }

    fn index(&self, id: NodeId) -> Result<NodeIndex, GraphError> {
        self.index_map
            .get(&id)
            .copied()
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn invalidate_topo(&mut self) {
        self.topo_order = None;
    }
}

impl<T> Default for SignalGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_connect() {
        let mut graph = SignalGraph::new();
        let source = graph.add_node("osc");
        let sink = graph.add_node("out");

        assert_eq!(graph.node_count(), 2);
        assert!(graph.connect(source, sink).is_ok());
        assert_eq!(graph.inputs(sink), vec![source]);

        // Same edge again does not duplicate
        assert!(graph.connect(source, sink).is_ok());
        assert_eq!(graph.inputs(sink), vec![source]);
    }

    #[test]
    fn test_processing_order() {
        let mut graph = SignalGraph::new();
        let source = graph.add_node("osc");
        let filter = graph.add_node("lowpass");
        let sink = graph.add_node("out");

        graph.connect(filter, sink).unwrap();
        graph.connect(source, filter).unwrap();

        let order = graph.processing_order().unwrap().to_vec();
        assert_eq!(order.len(), 3);
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(source) < pos(filter));
        assert!(pos(filter) < pos(sink));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = SignalGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");

        graph.connect(a, b).unwrap();
        graph.connect(b, c).unwrap();

        assert_eq!(graph.connect(c, a), Err(GraphError::CycleDetected));
        assert!(graph.inputs(a).is_empty(), "rejected edge must be rolled back");
        assert!(graph.processing_order().is_ok());
    }

    #[test]
    fn test_unknown_node() {
        let mut graph: SignalGraph<&str> = SignalGraph::new();
        let a = graph.add_node("a");
        let ghost = NodeId(99);
        assert_eq!(graph.connect(a, ghost), Err(GraphError::NodeNotFound(ghost)));
    }

    #[test]
    fn test_inputs() {
        let mut graph = SignalGraph::new();
        let rumble = graph.add_node("rumble");
        let noise = graph.add_node("noise");
        let master = graph.add_node("master");
        graph.connect(rumble, master).unwrap();
        graph.connect(noise, master).unwrap();

        let mut inputs = graph.inputs(master);
        inputs.sort();
        assert_eq!(inputs, vec![rumble, noise]);
        assert!(graph.inputs(rumble).is_empty());
    }
}
