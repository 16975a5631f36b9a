//! In-memory rule graph backed by petgraph.
//!
//! Committed state is a `DiGraph` plus a `(kind, key)` → `NodeIndex` unique
//! index behind a `RwLock`. A transaction holds the writer mutex for its whole
//! lifetime and stages its writes; commit applies them under the write lock,
//! so readers never observe a partial transaction. All data is lost on
//! process exit.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::StoreError;

use super::{
    EdgeId, EdgeKind, EdgeRecord, GraphSnapshot, GraphStore, GraphTxn, NodeId, NodeKind,
    NodeRecord, NodeRef, StoreResult, composite_key,
};

#[derive(Debug, Default)]
struct GraphState {
    graph: DiGraph<NodeRecord, EdgeRecord>,
    index: HashMap<(NodeKind, String), NodeIndex>,
}

/// Concurrent in-memory graph store with serialized writers.
#[derive(Debug, Default)]
pub struct MemGraphStore {
    state: RwLock<GraphState>,
    writer: Mutex<()>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Aborted {
        message: "graph state lock poisoned".into(),
    }
}

impl MemGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemGraphStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTxn + '_>> {
        // A writer that panicked left no staged writes behind; the slot is reusable.
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let (base_nodes, base_edges) = {
            let state = self.state.read().map_err(poisoned)?;
            (state.graph.node_count(), state.graph.edge_count())
        };
        Ok(Box::new(MemTxn {
            store: self,
            _writer: writer,
            base_nodes,
            base_edges,
            nodes: Vec::new(),
            staged_index: HashMap::new(),
            edges: Vec::new(),
        }))
    }

    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRecord>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .index
            .get(&(kind, key.to_string()))
            .map(|&idx| state.graph[idx].clone()))
    }

    fn snapshot(&self) -> StoreResult<GraphSnapshot> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(GraphSnapshot {
            nodes: state.graph.node_weights().cloned().collect(),
            edges: state.graph.edge_weights().cloned().collect(),
        })
    }
}

/// Staged writes of one transaction. Ids are assigned past the committed
/// counts, which cannot move while the writer mutex is held. Anything below
/// those counts is committed and read-only.
struct MemTxn<'a> {
    store: &'a MemGraphStore,
    _writer: MutexGuard<'a, ()>,
    base_nodes: usize,
    base_edges: usize,
    nodes: Vec<NodeRecord>,
    staged_index: HashMap<(NodeKind, String), usize>,
    edges: Vec<EdgeRecord>,
}

impl MemTxn<'_> {
    fn node_known(&self, id: NodeId) -> bool {
        (id.0 as usize) < self.base_nodes + self.nodes.len()
    }
}

impl GraphTxn for MemTxn<'_> {
    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRef>> {
        let lookup = (kind, key.to_string());
        if let Some(&i) = self.staged_index.get(&lookup) {
            return Ok(Some(self.nodes[i].to_ref()));
        }
        let state = self.store.state.read().map_err(poisoned)?;
        Ok(state.index.get(&lookup).map(|&idx| state.graph[idx].to_ref()))
    }

    fn create_node(&mut self, kind: NodeKind, key: &str) -> StoreResult<NodeRef> {
        if self.find_node(kind, key)?.is_some() {
            return Err(StoreError::UniqueViolation {
                kind: kind.to_string(),
                key: key.to_string(),
            });
        }
        let id = NodeId((self.base_nodes + self.nodes.len()) as u64);
        let record = NodeRecord::new(id, kind, key);
        let node = record.to_ref();
        self.staged_index
            .insert((kind, key.to_string()), self.nodes.len());
        self.nodes.push(record);
        Ok(node)
    }

    fn set_node_property(&mut self, node: &NodeRef, name: &str, value: &str) -> StoreResult<()> {
        let key = composite_key(node.kind, &node.key);
        let id = node.id.0 as usize;
        if id < self.base_nodes {
            return Err(StoreError::Immutable { key });
        }
        let record = self
            .nodes
            .get_mut(id - self.base_nodes)
            .ok_or(StoreError::NotFound { key })?;
        record.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn create_edge(&mut self, kind: EdgeKind, from: &NodeRef, to: &NodeRef) -> StoreResult<EdgeId> {
        for endpoint in [from, to] {
            if !self.node_known(endpoint.id) {
                return Err(StoreError::NotFound {
                    key: composite_key(endpoint.kind, &endpoint.key),
                });
            }
        }
        let id = EdgeId((self.base_edges + self.edges.len()) as u64);
        self.edges.push(EdgeRecord {
            id,
            kind,
            from: from.id,
            to: to.id,
            properties: Default::default(),
        });
        Ok(id)
    }

    fn set_edge_property(&mut self, edge: EdgeId, name: &str, value: &str) -> StoreResult<()> {
        let id = edge.0 as usize;
        if id < self.base_edges {
            return Err(StoreError::Immutable {
                key: edge.to_string(),
            });
        }
        let record = self
            .edges
            .get_mut(id - self.base_edges)
            .ok_or_else(|| StoreError::NotFound {
                key: edge.to_string(),
            })?;
        record.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let txn = *self;
        let mut state = txn.store.state.write().map_err(poisoned)?;

        for record in txn.nodes {
            let key = (record.kind, record.key.clone());
            let idx = state.graph.add_node(record);
            state.index.insert(key, idx);
        }
        for record in txn.edges {
            let (from, to) = (
                NodeIndex::new(record.from.0 as usize),
                NodeIndex::new(record.to.0 as usize),
            );
            state.graph.add_edge(from, to, record);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
