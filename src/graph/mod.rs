//! Rule graph storage: content-addressed nodes and typed edges.
//!
//! Nodes are identified by `(kind, key)`; the key is the node's `id` property
//! (rule id, path expression or attribute token). Stores enforce uniqueness of
//! that pair and run all writes through [`GraphTxn`] transactions.
//!
//! - [`MemGraphStore`]: in-memory, petgraph-backed
//! - [`DurableGraphStore`]: ACID on-disk store backed by redb

pub mod durable;
pub mod mem;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use durable::DurableGraphStore;
pub use mem::MemGraphStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Property names of the persisted schema.
pub mod props {
    /// Rule formula, stored on Rule nodes.
    pub const FORMULA: &str = "formula";
    /// Path id duplicated onto IN_PATH edges.
    pub const PATH: &str = "path";
}

/// Node labels of the rule graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Rule,
    Path,
    Attribute,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Rule => "Rule",
            NodeKind::Path => "Path",
            NodeKind::Attribute => "Attribute",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types of the rule graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Lead attribute → path.
    #[serde(rename = "IN_PATH")]
    InPath,
    /// Path → rule.
    #[serde(rename = "HAS_RULE")]
    HasRule,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::InPath => "IN_PATH",
            EdgeKind::HasRule => "HAS_RULE",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store-assigned node handle. Stable for the lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Store-assigned edge handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Lightweight reference to a node, as returned by lookups and creates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub id: NodeId,
    pub kind: NodeKind,
    pub key: String,
}

/// A stored node with its properties (the key itself is not repeated there).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub key: String,
    pub properties: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn new(id: NodeId, kind: NodeKind, key: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            key: key.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            kind: self.kind,
            key: self.key.clone(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// A stored edge with its properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: BTreeMap<String, String>,
}

impl EdgeRecord {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Composite key used by the stores' unique index.
pub(crate) fn composite_key(kind: NodeKind, key: &str) -> String {
    format!("{}:{key}", kind.as_str())
}

/// A single write transaction.
///
/// Nothing a transaction does is visible to other readers until [`commit`].
/// Dropping a transaction without committing rolls it back.
///
/// [`commit`]: GraphTxn::commit
pub trait GraphTxn {
    /// Look a node up by kind and key, seeing this transaction's own writes.
    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRef>>;

    /// Create a node. Fails with [`StoreError::UniqueViolation`] if a node
    /// with the same kind and key exists, committed or staged.
    fn create_node(&mut self, kind: NodeKind, key: &str) -> StoreResult<NodeRef>;

    /// Set a property on a node created by this transaction. Committed
    /// nodes are read-only and yield [`StoreError::Immutable`].
    fn set_node_property(&mut self, node: &NodeRef, name: &str, value: &str) -> StoreResult<()>;

    /// Create an edge. Fails with [`StoreError::NotFound`] if either endpoint
    /// is unknown to this transaction.
    fn create_edge(&mut self, kind: EdgeKind, from: &NodeRef, to: &NodeRef) -> StoreResult<EdgeId>;

    /// Set a property on an edge created by this transaction. Committed
    /// edges are read-only and yield [`StoreError::Immutable`].
    fn set_edge_property(&mut self, edge: EdgeId, name: &str, value: &str) -> StoreResult<()>;

    /// Make every staged write durable and visible, atomically.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every staged write.
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// A transactional rule graph store.
///
/// Write transactions are serialized: [`begin`](GraphStore::begin) blocks while
/// another transaction is open. Reads outside a transaction see the last
/// committed state.
pub trait GraphStore: Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn GraphTxn + '_>>;

    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRecord>>;

    /// All committed nodes and edges, ordered by id.
    fn snapshot(&self) -> StoreResult<GraphSnapshot>;

    /// Committed node and edge counts per kind.
    fn counts(&self) -> StoreResult<GraphCounts> {
        Ok(self.snapshot()?.counts())
    }
}

/// Per-kind totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub rules: usize,
    pub paths: usize,
    pub attributes: usize,
    pub in_path_edges: usize,
    pub has_rule_edges: usize,
}

/// A consistent copy of the committed graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphSnapshot {
    pub fn node(&self, kind: NodeKind, key: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.kind == kind && n.key == key)
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Edges of `kind` ending at `to`.
    pub fn edges_into(&self, kind: EdgeKind, to: NodeId) -> impl Iterator<Item = &EdgeRecord> {
        self.edges_of(kind).filter(move |e| e.to == to)
    }

    /// Edges of `kind` starting at `from`.
    pub fn edges_out_of(&self, kind: EdgeKind, from: NodeId) -> impl Iterator<Item = &EdgeRecord> {
        self.edges_of(kind).filter(move |e| e.from == from)
    }

    pub fn counts(&self) -> GraphCounts {
        GraphCounts {
            rules: self.nodes_of(NodeKind::Rule).count(),
            paths: self.nodes_of(NodeKind::Path).count(),
            attributes: self.nodes_of(NodeKind::Attribute).count(),
            in_path_edges: self.edges_of(EdgeKind::InPath).count(),
            has_rule_edges: self.edges_of(EdgeKind::HasRule).count(),
        }
    }
}
