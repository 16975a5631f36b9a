//! End-to-end tests for rule compilation.
//!
//! These exercise the compiler against real stores: idempotence, sharing of
//! paths and attributes across rules, the shape of the materialized graph,
//! atomicity under injected storage faults, and concurrent writers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rulegraph::compiler::{CompileOutcome, RuleCompiler};
use rulegraph::engine::{Engine, EngineConfig};
use rulegraph::error::{RuleGraphError, StoreError};
use rulegraph::formula::Minimizer;
use rulegraph::graph::{
    EdgeId, EdgeKind, GraphSnapshot, GraphStore, GraphTxn, MemGraphStore, NodeKind, NodeRecord,
    NodeRef, StoreResult, props,
};

fn test_engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

fn snapshot(engine: &Engine) -> GraphSnapshot {
    engine.store().snapshot().unwrap()
}

fn key_of(snap: &GraphSnapshot, id: rulegraph::graph::NodeId) -> &str {
    &snap.node_by_id(id).unwrap().key
}

#[test]
fn scenario_two_disjoint_conjunctions() {
    let engine = test_engine();
    let ack = engine.create_rule("RuleA", "(0&1)|(2&3)").unwrap();
    assert!(ack.message.contains("(0&1)|(2&3)"));

    let snap = snapshot(&engine);
    let rule = snap.node(NodeKind::Rule, "RuleA").unwrap();
    assert_eq!(rule.property(props::FORMULA), Some("(0&1)|(2&3)"));

    let mut paths: Vec<&str> = snap.nodes_of(NodeKind::Path).map(|n| n.key.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["0&1", "2&3"]);

    let mut attributes: Vec<&str> = snap
        .nodes_of(NodeKind::Attribute)
        .map(|n| n.key.as_str())
        .collect();
    attributes.sort();
    assert_eq!(attributes, vec!["0", "1", "2", "3"]);

    let mut in_path: Vec<(&str, &str, Option<&str>)> = snap
        .edges_of(EdgeKind::InPath)
        .map(|e| (key_of(&snap, e.from), key_of(&snap, e.to), e.property(props::PATH)))
        .collect();
    in_path.sort();
    assert_eq!(
        in_path,
        vec![("0", "0&1", Some("0&1")), ("2", "2&3", Some("2&3"))]
    );

    let mut has_rule: Vec<(&str, &str)> = snap
        .edges_of(EdgeKind::HasRule)
        .map(|e| (key_of(&snap, e.from), key_of(&snap, e.to)))
        .collect();
    has_rule.sort();
    assert_eq!(has_rule, vec![("0&1", "RuleA"), ("2&3", "RuleA")]);
}

#[test]
fn recreating_a_rule_writes_nothing() {
    let engine = test_engine();
    engine.create_rule("R1", "0&1").unwrap();
    let before = snapshot(&engine);

    let ack = engine.create_rule("R1", "(2&3)|4").unwrap();
    assert_eq!(ack.outcome, CompileOutcome::DuplicateRuleNoop);
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.rule("R1").unwrap().formula, "0&1");
}

#[test]
fn identical_paths_are_shared() {
    let engine = test_engine();
    engine.create_rule("R1", "0&1").unwrap();
    engine.create_rule("R2", "0&1").unwrap();

    let counts = engine.info().unwrap().counts;
    assert_eq!(counts.rules, 2);
    assert_eq!(counts.paths, 1);
    assert_eq!(counts.attributes, 2);
    assert_eq!(counts.in_path_edges, 1);
    assert_eq!(counts.has_rule_edges, 2);
}

#[test]
fn only_the_lead_attribute_links_to_a_path() {
    let engine = test_engine();
    engine.create_rule("R1", "0&1&2").unwrap();

    let snap = snapshot(&engine);
    let path = snap.node(NodeKind::Path, "0&1&2").unwrap();
    let incoming: Vec<&str> = snap
        .edges_into(EdgeKind::InPath, path.id)
        .map(|e| key_of(&snap, e.from))
        .collect();
    assert_eq!(incoming, vec!["0"]);
    // Non-lead attributes exist but have no edges.
    for token in ["1", "2"] {
        let attribute = snap.node(NodeKind::Attribute, token).unwrap();
        assert_eq!(snap.edges_out_of(EdgeKind::InPath, attribute.id).count(), 0);
    }
}

#[test]
fn negated_literals_share_attribute_nodes() {
    let engine = test_engine();
    engine.create_rule("R1", "0&!1").unwrap();
    engine.create_rule("R2", "0&1").unwrap();

    let snap = snapshot(&engine);
    assert!(snap.node(NodeKind::Path, "0!1").is_some());
    assert!(snap.node(NodeKind::Path, "0&1").is_some());
    assert_eq!(snap.counts().attributes, 2);
}

#[test]
fn every_returned_path_and_nothing_else_is_linked() {
    let engine = test_engine();
    let formula = "(0 | 1) & !(2 & 3) | 4";
    let expected = engine.minimize(formula).unwrap();
    engine.create_rule("R1", formula).unwrap();

    let view = engine.rule("R1").unwrap();
    let mut sorted = expected.clone();
    sorted.sort();
    assert_eq!(view.paths, sorted);
    assert_eq!(snapshot(&engine).counts().paths, expected.len());
}

#[test]
fn rejected_formulas_leave_no_trace() {
    let engine = test_engine();
    for formula in ["", "0 &", "0 & !0", "1 | !1", "0 $ 1"] {
        let err = engine.create_rule("R1", formula).unwrap_err();
        assert!(matches!(err, RuleGraphError::InvalidFormula(_)), "{formula}");
    }
    assert_eq!(snapshot(&engine), GraphSnapshot::default());
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Store wrapper whose transactions fail the n-th Path creation.
struct FaultyStore {
    inner: MemGraphStore,
    fail_at_path: usize,
    txns: AtomicUsize,
}

struct FaultyTxn<'a> {
    inner: Box<dyn GraphTxn + 'a>,
    fail_at_path: usize,
    paths_created: usize,
}

impl GraphStore for FaultyStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTxn + '_>> {
        self.txns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FaultyTxn {
            inner: self.inner.begin()?,
            fail_at_path: self.fail_at_path,
            paths_created: 0,
        }))
    }

    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRecord>> {
        self.inner.find_node(kind, key)
    }

    fn snapshot(&self) -> StoreResult<GraphSnapshot> {
        self.inner.snapshot()
    }
}

impl GraphTxn for FaultyTxn<'_> {
    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRef>> {
        self.inner.find_node(kind, key)
    }

    fn create_node(&mut self, kind: NodeKind, key: &str) -> StoreResult<NodeRef> {
        if kind == NodeKind::Path {
            if self.paths_created == self.fail_at_path {
                return Err(StoreError::Aborted {
                    message: format!("injected fault creating path {key}"),
                });
            }
            self.paths_created += 1;
        }
        self.inner.create_node(kind, key)
    }

    fn set_node_property(&mut self, node: &NodeRef, name: &str, value: &str) -> StoreResult<()> {
        self.inner.set_node_property(node, name, value)
    }

    fn create_edge(&mut self, kind: EdgeKind, from: &NodeRef, to: &NodeRef) -> StoreResult<EdgeId> {
        self.inner.create_edge(kind, from, to)
    }

    fn set_edge_property(&mut self, edge: EdgeId, name: &str, value: &str) -> StoreResult<()> {
        self.inner.set_edge_property(edge, name, value)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback()
    }
}

#[test]
fn fault_after_k_paths_leaves_no_rule() {
    let formula = "(0&1)|(2&3)|(4&5)";
    for k in 0..3 {
        let store = Arc::new(FaultyStore {
            inner: MemGraphStore::new(),
            fail_at_path: k,
            txns: AtomicUsize::new(0),
        });
        let engine = Engine::with_store(EngineConfig::default(), store.clone()).unwrap();

        let err = engine.create_rule("R1", formula).unwrap_err();
        assert!(matches!(
            err,
            RuleGraphError::StorageFailure(StoreError::Aborted { .. })
        ));
        assert_eq!(store.txns.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().unwrap(), GraphSnapshot::default(), "k = {k}");
    }
}

#[test]
fn fault_keeps_previously_committed_rules_intact() {
    let store = Arc::new(FaultyStore {
        inner: MemGraphStore::new(),
        fail_at_path: 1,
        txns: AtomicUsize::new(0),
    });
    let engine = Engine::with_store(EngineConfig::default(), store.clone()).unwrap();

    engine.create_rule("R1", "0&1").unwrap();
    let before = store.snapshot().unwrap();

    // R2 reuses "0&1" and fails creating its second new path.
    assert!(engine.create_rule("R2", "(0&1)|(2&3)|(4&5)").is_err());
    assert_eq!(store.snapshot().unwrap(), before);

    // The id stays free: a later attempt that succeeds is not a no-op.
    let ack = engine.create_rule("R2", "(0&1)|(2&3)").unwrap();
    assert!(!ack.is_noop());
}

// ---------------------------------------------------------------------------
// Lost races
// ---------------------------------------------------------------------------

/// Store wrapper that hides one committed node from lookups, as if another
/// writer committed it after the caller looked. Inside a transaction the node
/// stays hidden until `create_node` reports the unique violation.
struct HidingStore {
    inner: MemGraphStore,
    kind: NodeKind,
    key: String,
}

struct HidingTxn<'a> {
    inner: Box<dyn GraphTxn + 'a>,
    kind: NodeKind,
    key: &'a str,
    revealed: bool,
}

impl HidingStore {
    fn hides(&self, kind: NodeKind, key: &str) -> bool {
        kind == self.kind && key == self.key
    }
}

impl HidingTxn<'_> {
    fn hides(&self, kind: NodeKind, key: &str) -> bool {
        !self.revealed && kind == self.kind && key == self.key
    }
}

impl GraphStore for HidingStore {
    fn begin(&self) -> StoreResult<Box<dyn GraphTxn + '_>> {
        Ok(Box::new(HidingTxn {
            inner: self.inner.begin()?,
            kind: self.kind,
            key: &self.key,
            revealed: false,
        }))
    }

    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRecord>> {
        if self.hides(kind, key) {
            return Ok(None);
        }
        self.inner.find_node(kind, key)
    }

    fn snapshot(&self) -> StoreResult<GraphSnapshot> {
        self.inner.snapshot()
    }
}

impl GraphTxn for HidingTxn<'_> {
    fn find_node(&self, kind: NodeKind, key: &str) -> StoreResult<Option<NodeRef>> {
        if self.hides(kind, key) {
            return Ok(None);
        }
        self.inner.find_node(kind, key)
    }

    fn create_node(&mut self, kind: NodeKind, key: &str) -> StoreResult<NodeRef> {
        let result = self.inner.create_node(kind, key);
        if matches!(result, Err(StoreError::UniqueViolation { .. })) && self.hides(kind, key) {
            self.revealed = true;
        }
        result
    }

    fn set_node_property(&mut self, node: &NodeRef, name: &str, value: &str) -> StoreResult<()> {
        self.inner.set_node_property(node, name, value)
    }

    fn create_edge(&mut self, kind: EdgeKind, from: &NodeRef, to: &NodeRef) -> StoreResult<EdgeId> {
        self.inner.create_edge(kind, from, to)
    }

    fn set_edge_property(&mut self, edge: EdgeId, name: &str, value: &str) -> StoreResult<()> {
        self.inner.set_edge_property(edge, name, value)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback()
    }
}

fn hiding_store(kind: NodeKind, key: &str, seed: &[(&str, &str)]) -> HidingStore {
    let inner = MemGraphStore::new();
    for (id, formula) in seed {
        RuleCompiler::new(&inner, Minimizer::default())
            .compile(id, formula)
            .unwrap();
    }
    HidingStore {
        inner,
        kind,
        key: key.to_string(),
    }
}

#[test]
fn path_created_by_another_writer_is_reused() {
    let store = hiding_store(NodeKind::Path, "0&1", &[("R1", "0&1")]);
    assert!(store.find_node(NodeKind::Path, "0&1").unwrap().is_none());

    let ack = RuleCompiler::new(&store, Minimizer::default())
        .compile("R2", "0&1")
        .unwrap();
    assert_eq!(
        ack.outcome,
        CompileOutcome::Created {
            paths: 1,
            new_paths: 0,
            new_attributes: 0,
        }
    );

    let snap = store.snapshot().unwrap();
    let counts = snap.counts();
    assert_eq!(counts.rules, 2);
    assert_eq!(counts.paths, 1);
    assert_eq!(counts.attributes, 2);
    assert_eq!(counts.in_path_edges, 1);
    assert_eq!(counts.has_rule_edges, 2);

    let path = snap.node(NodeKind::Path, "0&1").unwrap();
    let mut rules: Vec<&str> = snap
        .edges_out_of(EdgeKind::HasRule, path.id)
        .map(|e| key_of(&snap, e.to))
        .collect();
    rules.sort();
    assert_eq!(rules, vec!["R1", "R2"]);
}

#[test]
fn rule_created_by_another_writer_is_a_noop() {
    let store = hiding_store(NodeKind::Rule, "R1", &[("R1", "0&1")]);
    let before = store.snapshot().unwrap();

    let ack = RuleCompiler::new(&store, Minimizer::default())
        .compile("R1", "(2&3)|4")
        .unwrap();
    assert_eq!(ack.outcome, CompileOutcome::DuplicateRuleNoop);
    assert_eq!(ack.message, "Rule R1 already exists.");
    assert_eq!(store.snapshot().unwrap(), before);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_compiles_keep_one_node_per_key() {
    let store = Arc::new(MemGraphStore::new());
    let formulas = ["(0&1)|(2&3)", "(0&1)|4", "(2&3)|(4&5)", "0&1", "4|(2&3)"];

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = Arc::clone(&store);
            let formula = formulas[i % formulas.len()];
            std::thread::spawn(move || {
                let compiler = RuleCompiler::new(store.as_ref(), Minimizer::default());
                compiler.compile(&format!("R{}", i % 10), formula).unwrap()
            })
        })
        .collect();
    let acks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(acks.iter().filter(|a| !a.is_noop()).count(), 10);

    let snap = store.snapshot().unwrap();
    let counts = snap.counts();
    assert_eq!(counts.rules, 10);
    assert_eq!(counts.paths, 4); // 0&1, 2&3, 4, 4&5
    assert_eq!(counts.attributes, 6);
    assert_eq!(counts.in_path_edges, 4);

    let mut keys: Vec<(NodeKind, &str)> = snap.nodes.iter().map(|n| (n.kind, n.key.as_str())).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);
}
