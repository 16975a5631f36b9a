//! Rule compilation: materialize a rule's minimal cover as shared graph nodes.
//!
//! A compiled rule is one Rule node, one HAS_RULE edge from each of its paths,
//! and for every path created along the way its Attribute nodes plus a single
//! IN_PATH edge from the lead attribute. Paths and attributes are shared by
//! content: a second rule with the same path reuses the existing node.
//!
//! All writes of one [`RuleCompiler::compile`] call run in one store
//! transaction. Either the whole structure is committed or nothing is.

use serde::{Deserialize, Serialize};

use crate::error::{RuleError, RuleGraphResult, StoreError};
use crate::formula::Minimizer;
use crate::graph::{EdgeKind, GraphStore, GraphTxn, NodeKind, NodeRef, StoreResult, props};

/// What a compile call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileOutcome {
    /// The rule was created and linked to `paths` path nodes, of which
    /// `new_paths` did not exist before; `new_attributes` attribute nodes
    /// were created for them.
    Created {
        paths: usize,
        new_paths: usize,
        new_attributes: usize,
    },
    /// A rule with this id already existed; nothing was read past the lookup
    /// and nothing was written.
    DuplicateRuleNoop,
}

/// Result payload of a compile call. `message` is for humans only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub message: String,
    pub outcome: CompileOutcome,
}

impl Acknowledgment {
    fn created(formula: &str, outcome: CompileOutcome) -> Self {
        Self {
            message: format!("Rule {formula} created."),
            outcome,
        }
    }

    fn duplicate(id: &str) -> Self {
        Self {
            message: format!("Rule {id} already exists."),
            outcome: CompileOutcome::DuplicateRuleNoop,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.outcome == CompileOutcome::DuplicateRuleNoop
    }
}

/// Attribute tokens of a path expression: split on `&` and `!`, empty pieces
/// dropped, duplicates removed keeping first occurrence. The first token is
/// the lead attribute.
///
/// Polarity is not part of the token: `"0&!1"` and `"0&1"` both yield
/// `["0", "1"]`.
pub fn attribute_tokens(path: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in path.split(['&', '!']).filter(|t| !t.is_empty()) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Compiles rules into a [`GraphStore`].
pub struct RuleCompiler<'s> {
    store: &'s dyn GraphStore,
    minimizer: Minimizer,
}

impl<'s> RuleCompiler<'s> {
    pub fn new(store: &'s dyn GraphStore, minimizer: Minimizer) -> Self {
        Self { store, minimizer }
    }

    /// Compile rule `id` with `formula`.
    ///
    /// Returns a no-op acknowledgment if the id already exists, whatever the
    /// formula. Formula errors are reported before the store is touched;
    /// storage errors after the transaction has been rolled back.
    pub fn compile(&self, id: &str, formula: &str) -> RuleGraphResult<Acknowledgment> {
        if id.trim().is_empty() {
            return Err(RuleError::EmptyId.into());
        }

        if self.store.find_node(NodeKind::Rule, id)?.is_some() {
            tracing::debug!(rule_id = id, "rule already exists, skipping");
            return Ok(Acknowledgment::duplicate(id));
        }

        let paths = self.minimizer.path_expressions(formula)?;

        let mut txn = self.store.begin()?;
        let written = materialize(&mut *txn, id, formula, &paths);
        match written {
            Ok(Some(outcome)) => {
                txn.commit()?;
                tracing::info!(rule_id = id, formula, ?outcome, "rule created");
                Ok(Acknowledgment::created(formula, outcome))
            }
            Ok(None) => {
                // Committed by a concurrent caller after our lookup.
                txn.rollback()?;
                tracing::debug!(rule_id = id, "rule created concurrently, skipping");
                Ok(Acknowledgment::duplicate(id))
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::warn!(rule_id = id, error = %rollback_err, "rollback failed");
                }
                tracing::debug!(rule_id = id, error = %err, "rule compilation aborted");
                Err(err.into())
            }
        }
    }
}

/// Write the rule and its paths into `txn`. `Ok(None)` means the rule id was
/// taken inside the transaction.
fn materialize(
    txn: &mut dyn GraphTxn,
    id: &str,
    formula: &str,
    paths: &[String],
) -> StoreResult<Option<CompileOutcome>> {
    let rule = match txn.create_node(NodeKind::Rule, id) {
        Ok(rule) => rule,
        Err(StoreError::UniqueViolation { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    txn.set_node_property(&rule, props::FORMULA, formula)?;

    let mut new_paths = 0;
    let mut new_attributes = 0;

    for path in paths {
        let (path_node, created) = get_or_create(txn, NodeKind::Path, path)?;

        if created {
            new_paths += 1;
            let mut lead: Option<NodeRef> = None;
            for token in attribute_tokens(path) {
                let (attribute, attribute_created) =
                    get_or_create(txn, NodeKind::Attribute, token)?;
                if attribute_created {
                    new_attributes += 1;
                }
                if lead.is_none() {
                    lead = Some(attribute);
                }
            }
            if let Some(lead) = lead {
                let edge = txn.create_edge(EdgeKind::InPath, &lead, &path_node)?;
                txn.set_edge_property(edge, props::PATH, path)?;
            }
        }

        txn.create_edge(EdgeKind::HasRule, &path_node, &rule)?;
        tracing::debug!(rule_id = id, path = path.as_str(), created, "linked path");
    }

    Ok(Some(CompileOutcome::Created {
        paths: paths.len(),
        new_paths,
        new_attributes,
    }))
}

/// Find a node or create it. A unique violation on create means another
/// writer got there first, so the node is re-read and reported as existing.
fn get_or_create(txn: &mut dyn GraphTxn, kind: NodeKind, key: &str) -> StoreResult<(NodeRef, bool)> {
    if let Some(node) = txn.find_node(kind, key)? {
        return Ok((node, false));
    }
    match txn.create_node(kind, key) {
        Ok(node) => Ok((node, true)),
        Err(StoreError::UniqueViolation { .. }) => txn
            .find_node(kind, key)?
            .map(|node| (node, false))
            .ok_or_else(|| StoreError::NotFound {
                key: format!("{kind}:{key}"),
            }),
        Err(err) => Err(err),
    }
}
