//! Export types for serializing the rule graph.
//!
//! These are key-resolved views of a [`GraphSnapshot`]: store-internal node
//! ids are replaced by the rule ids, path expressions and attribute tokens
//! they stand for, suitable for JSON export.

use serde::{Deserialize, Serialize};

use crate::graph::{EdgeKind, GraphSnapshot, NodeId, NodeKind, props};

/// Exported rule with the paths that imply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExport {
    /// Rule id.
    pub id: String,
    /// Formula as submitted.
    pub formula: String,
    /// Path ids linked by HAS_RULE, sorted.
    pub paths: Vec<String>,
}

/// Exported path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathExport {
    /// Path expression, e.g. `0&1!2`.
    pub id: String,
    /// Attribute linked by the path's IN_PATH edge.
    pub lead_attribute: Option<String>,
    /// Rules this path implies, sorted.
    pub rules: Vec<String>,
}

/// The whole graph, resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExport {
    pub rules: Vec<RuleExport>,
    pub paths: Vec<PathExport>,
    pub attributes: Vec<String>,
}

impl GraphExport {
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let key_of = |id: NodeId| snapshot.node_by_id(id).map(|n| n.key.clone());

        let mut rules: Vec<RuleExport> = snapshot
            .nodes_of(NodeKind::Rule)
            .map(|rule| {
                let mut paths: Vec<String> = snapshot
                    .edges_into(EdgeKind::HasRule, rule.id)
                    .filter_map(|e| key_of(e.from))
                    .collect();
                paths.sort();
                RuleExport {
                    id: rule.key.clone(),
                    formula: rule.property(props::FORMULA).unwrap_or_default().to_string(),
                    paths,
                }
            })
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        let mut paths: Vec<PathExport> = snapshot
            .nodes_of(NodeKind::Path)
            .map(|path| {
                let mut rules: Vec<String> = snapshot
                    .edges_out_of(EdgeKind::HasRule, path.id)
                    .filter_map(|e| key_of(e.to))
                    .collect();
                rules.sort();
                PathExport {
                    id: path.key.clone(),
                    lead_attribute: snapshot
                        .edges_into(EdgeKind::InPath, path.id)
                        .find_map(|e| key_of(e.from)),
                    rules,
                }
            })
            .collect();
        paths.sort_by(|a, b| a.id.cmp(&b.id));

        let mut attributes: Vec<String> = snapshot
            .nodes_of(NodeKind::Attribute)
            .map(|a| a.key.clone())
            .collect();
        attributes.sort();

        Self {
            rules,
            paths,
            attributes,
        }
    }
}
