//! ACID-durable rule graph backed by redb.
//!
//! Every [`GraphTxn`] wraps one redb write transaction, so commit and abort
//! come straight from redb and a crash mid-compile leaves no partial rule.
//! redb admits one writer at a time, which serializes get-or-create races.
//!
//! Layout:
//!
//! - `nodes`: `"<Kind>:<key>"` → bincode [`NodeRecord`] (the unique index)
//! - `node_keys`: node id → `"<Kind>:<key>"`
//! - `edges`: edge id → bincode [`EdgeRecord`]
//! - `counters`: next node / edge id

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use crate::error::StoreError;

use super::{
    EdgeId, EdgeKind, EdgeRecord, GraphSnapshot, GraphStore, GraphTxn, NodeId, NodeKind,
    NodeRecord, NodeRef, StoreResult, composite_key,
};

const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
const NODE_KEYS: TableDefinition<u64, &str> = TableDefinition::new("node_keys");
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const NEXT_NODE: &str = "next_node";
const NEXT_EDGE: &str = "next_edge";

fn redb_err<E: Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode record: {e}"),
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to decode record: {e}"),
    })
}

/// On-disk graph store using redb.
pub struct DurableGraphStore {
    db: Arc<Database>,
}

impl DurableGraphStore {
    /// Database file created inside the data directory.
    pub const FILE_NAME: &'static str = "rulegraph.redb";

    /// Open or create a store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(Self::FILE_NAME);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create every table up front so read transactions never miss one.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(NODES).map_err(redb_err("open_table"))?;
        txn.open_table(NODE_KEYS).map_err(redb_err("open_table"))?;
        txn.open_table(EDGES).map_err(redb_err("open_table"))?;
        txn.open_table(COUNTERS).map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        tracing::debug!(path = %db_path.display(), "opened durable graph store");
        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for DurableGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableGraphStore").finish()
    }
}

impl GraphStore for DurableGraphStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTxn + '_>> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let mut txn = DurableTxn {
            txn,
            base_node: 0,
            base_edge: 0,
        };
        txn.base_node = txn.counter(NEXT_NODE)?;
        txn.base_edge = txn.counter(NEXT_EDGE)?;
        Ok(Box::new(txn))
    }

    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRecord>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let nodes = txn.open_table(NODES).map_err(redb_err("open_table"))?;
        let composite = composite_key(kind, key);
        let found = nodes
            .get(composite.as_str())
            .map_err(redb_err("get"))?
            .map(|guard| guard.value().to_vec());
        found.as_deref().map(decode::<NodeRecord>).transpose()
    }

    fn snapshot(&self) -> StoreResult<GraphSnapshot> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;

        let nodes_table = txn.open_table(NODES).map_err(redb_err("open_table"))?;
        let mut nodes = Vec::new();
        for entry in nodes_table.iter().map_err(redb_err("iter"))? {
            let (_, value) = entry.map_err(redb_err("iter"))?;
            nodes.push(decode::<NodeRecord>(value.value())?);
        }
        nodes.sort_by_key(|n| n.id);

        let edges_table = txn.open_table(EDGES).map_err(redb_err("open_table"))?;
        let mut edges = Vec::new();
        for entry in edges_table.iter().map_err(redb_err("iter"))? {
            let (_, value) = entry.map_err(redb_err("iter"))?;
            edges.push(decode::<EdgeRecord>(value.value())?);
        }

        Ok(GraphSnapshot { nodes, edges })
    }
}

/// Ids below `base_node` / `base_edge` were committed before this
/// transaction began and are read-only.
struct DurableTxn {
    txn: WriteTransaction,
    base_node: u64,
    base_edge: u64,
}

impl DurableTxn {
    fn counter(&self, counter: &str) -> StoreResult<u64> {
        let counters = self.txn.open_table(COUNTERS).map_err(redb_err("open_table"))?;
        let value = counters
            .get(counter)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        Ok(value)
    }

    fn next_id(&self, counter: &str) -> StoreResult<u64> {
        let next = self.counter(counter)?;
        let mut counters = self.txn.open_table(COUNTERS).map_err(redb_err("open_table"))?;
        counters.insert(counter, next + 1).map_err(redb_err("insert"))?;
        Ok(next)
    }

    fn node_key(&self, id: NodeId) -> StoreResult<Option<String>> {
        let keys = self.txn.open_table(NODE_KEYS).map_err(redb_err("open_table"))?;
        let key = keys
            .get(id.0)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value().to_string());
        Ok(key)
    }

    fn load_node(&self, composite: &str) -> StoreResult<Option<NodeRecord>> {
        let nodes = self.txn.open_table(NODES).map_err(redb_err("open_table"))?;
        let bytes = nodes
            .get(composite)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value().to_vec());
        bytes.as_deref().map(decode).transpose()
    }

    fn store_node(&self, record: &NodeRecord) -> StoreResult<()> {
        let bytes = encode(record)?;
        let composite = composite_key(record.kind, &record.key);
        let mut nodes = self.txn.open_table(NODES).map_err(redb_err("open_table"))?;
        nodes
            .insert(composite.as_str(), bytes.as_slice())
            .map_err(redb_err("insert"))?;
        Ok(())
    }

    fn load_edge(&self, id: EdgeId) -> StoreResult<Option<EdgeRecord>> {
        let edges = self.txn.open_table(EDGES).map_err(redb_err("open_table"))?;
        let bytes = edges
            .get(id.0)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value().to_vec());
        bytes.as_deref().map(decode).transpose()
    }

    fn store_edge(&self, record: &EdgeRecord) -> StoreResult<()> {
        let bytes = encode(record)?;
        let mut edges = self.txn.open_table(EDGES).map_err(redb_err("open_table"))?;
        edges
            .insert(record.id.0, bytes.as_slice())
            .map_err(redb_err("insert"))?;
        Ok(())
    }
}

impl GraphTxn for DurableTxn {
    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRef>> {
        Ok(self
            .load_node(&composite_key(kind, key))?
            .map(|record| record.to_ref()))
    }

    fn create_node(&mut self, kind: NodeKind, key: &str) -> StoreResult<NodeRef> {
        let composite = composite_key(kind, key);
        if self.load_node(&composite)?.is_some() {
            return Err(StoreError::UniqueViolation {
                kind: kind.to_string(),
                key: key.to_string(),
            });
        }

        let id = NodeId(self.next_id(NEXT_NODE)?);
        let record = NodeRecord::new(id, kind, key);
        self.store_node(&record)?;
        {
            let mut keys = self.txn.open_table(NODE_KEYS).map_err(redb_err("open_table"))?;
            keys.insert(id.0, composite.as_str())
                .map_err(redb_err("insert"))?;
        }
        Ok(record.to_ref())
    }

    fn set_node_property(&mut self, node: &NodeRef, name: &str, value: &str) -> StoreResult<()> {
        let composite = composite_key(node.kind, &node.key);
        let Some(mut record) = self.load_node(&composite)? else {
            return Err(StoreError::NotFound { key: composite });
        };
        if record.id.0 < self.base_node {
            return Err(StoreError::Immutable { key: composite });
        }
        record.properties.insert(name.to_string(), value.to_string());
        self.store_node(&record)
    }

    fn create_edge(&mut self, kind: EdgeKind, from: &NodeRef, to: &NodeRef) -> StoreResult<EdgeId> {
        for endpoint in [from, to] {
            if self.node_key(endpoint.id)?.is_none() {
                return Err(StoreError::NotFound {
                    key: composite_key(endpoint.kind, &endpoint.key),
                });
            }
        }

        let id = EdgeId(self.next_id(NEXT_EDGE)?);
        self.store_edge(&EdgeRecord {
            id,
            kind,
            from: from.id,
            to: to.id,
            properties: Default::default(),
        })?;
        Ok(id)
    }

    fn set_edge_property(&mut self, edge: EdgeId, name: &str, value: &str) -> StoreResult<()> {
        let mut record = self.load_edge(edge)?.ok_or_else(|| StoreError::NotFound {
            key: edge.to_string(),
        })?;
        if edge.0 < self.base_edge {
            return Err(StoreError::Immutable {
                key: edge.to_string(),
            });
        }
        record.properties.insert(name.to_string(), value.to_string());
        self.store_edge(&record)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().map_err(redb_err("commit"))
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.abort().map_err(redb_err("abort"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_commit_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();

        let mut txn = store.begin().unwrap();
        let attr = txn.create_node(NodeKind::Attribute, "0").unwrap();
        let path = txn.create_node(NodeKind::Path, "0&1").unwrap();
        let edge = txn.create_edge(EdgeKind::InPath, &attr, &path).unwrap();
        txn.set_edge_property(edge, "path", "0&1").unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.nodes.len(), 2);
        assert_eq!(snap.edges.len(), 1);
        assert_eq!(snap.edges[0].property("path"), Some("0&1"));
        assert_eq!(snap.edges[0].from, attr.id);
        assert!(store.find_node(NodeKind::Path, "0&1").unwrap().is_some());
    }

    #[test]
    fn rollback_discards_everything() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();

        let mut txn = store.begin().unwrap();
        let rule = txn.create_node(NodeKind::Rule, "R1").unwrap();
        txn.set_node_property(&rule, "formula", "0").unwrap();
        txn.rollback().unwrap();

        assert!(store.find_node(NodeKind::Rule, "R1").unwrap().is_none());
        assert_eq!(store.snapshot().unwrap(), GraphSnapshot::default());

        // Ids handed out by the aborted transaction are reused.
        let mut txn = store.begin().unwrap();
        let rule = txn.create_node(NodeKind::Rule, "R2").unwrap();
        assert_eq!(rule.id, NodeId(0));
    }

    #[test]
    fn unique_constraint_is_enforced() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();

        let mut txn = store.begin().unwrap();
        txn.create_node(NodeKind::Path, "0&1").unwrap();
        assert!(matches!(
            txn.create_node(NodeKind::Path, "0&1"),
            Err(StoreError::UniqueViolation { .. })
        ));
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.create_node(NodeKind::Path, "0&1"),
            Err(StoreError::UniqueViolation { .. })
        ));
    }

    #[test]
    fn node_properties_round_trip_through_bincode() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();

        let mut txn = store.begin().unwrap();
        let rule = txn.create_node(NodeKind::Rule, "Rule 1").unwrap();
        txn.set_node_property(&rule, "formula", "(0 & 1) | (2 & 3)").unwrap();
        txn.commit().unwrap();

        let record = store.find_node(NodeKind::Rule, "Rule 1").unwrap().unwrap();
        assert_eq!(record.property("formula"), Some("(0 & 1) | (2 & 3)"));
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableGraphStore::open(dir.path()).unwrap();
            let mut txn = store.begin().unwrap();
            txn.create_node(NodeKind::Attribute, "7").unwrap();
            txn.commit().unwrap();
        }

        let store = DurableGraphStore::open(dir.path()).unwrap();
        assert!(store.find_node(NodeKind::Attribute, "7").unwrap().is_some());
        let mut txn = store.begin().unwrap();
        let next = txn.create_node(NodeKind::Attribute, "8").unwrap();
        assert_eq!(next.id, NodeId(1));
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();
        let mut txn = store.begin().unwrap();
        let attr = txn.create_node(NodeKind::Attribute, "0").unwrap();
        let ghost = NodeRef {
            id: NodeId(99),
            kind: NodeKind::Path,
            key: "0".into(),
        };
        assert!(matches!(
            txn.create_edge(EdgeKind::InPath, &attr, &ghost),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn committed_records_are_read_only() {
        let dir = TempDir::new().unwrap();
        let store = DurableGraphStore::open(dir.path()).unwrap();

        let mut txn = store.begin().unwrap();
        let rule = txn.create_node(NodeKind::Rule, "R1").unwrap();
        txn.set_node_property(&rule, "formula", "0&1").unwrap();
        let attr = txn.create_node(NodeKind::Attribute, "0").unwrap();
        let path = txn.create_node(NodeKind::Path, "0&1").unwrap();
        let edge = txn.create_edge(EdgeKind::InPath, &attr, &path).unwrap();
        txn.set_edge_property(edge, "path", "0&1").unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.set_node_property(&rule, "formula", "2"),
            Err(StoreError::Immutable { .. })
        ));
        assert!(matches!(
            txn.set_edge_property(edge, "path", "2"),
            Err(StoreError::Immutable { .. })
        ));
        // Fresh records in the same transaction stay writable.
        let other = txn.create_node(NodeKind::Rule, "R2").unwrap();
        txn.set_node_property(&other, "formula", "2").unwrap();
        txn.commit().unwrap();

        let record = store.find_node(NodeKind::Rule, "R1").unwrap().unwrap();
        assert_eq!(record.property("formula"), Some("0&1"));
        assert_eq!(store.snapshot().unwrap().edges[0].property("path"), Some("0&1"));
    }
}
