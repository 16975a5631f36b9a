//! Engine facade: top-level API for the rulegraph system.
//!
//! The `Engine` owns the graph store and the minimizer and provides the
//! public interface for compiling rules and reading the graph back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compiler::{Acknowledgment, RuleCompiler};
use crate::error::{RuleError, RuleGraphResult};
use crate::export::GraphExport;
use crate::formula::Minimizer;
use crate::graph::{
    DurableGraphStore, EdgeKind, GraphCounts, GraphStore, MemGraphStore, NodeKind, props,
};

pub use crate::config::EngineConfig;

/// A rule as read back from the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleView {
    pub id: String,
    pub formula: String,
    /// Path ids linked to the rule, sorted.
    pub paths: Vec<String>,
}

impl std::fmt::Display for RuleView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rule {}", self.id)?;
        writeln!(f, "  formula: {}", self.formula)?;
        for path in &self.paths {
            writeln!(f, "  path:    {path}")?;
        }
        Ok(())
    }
}

/// One entry of a batch ingest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub formula: String,
}

/// Outcome of [`Engine::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub created: usize,
    pub skipped: usize,
    /// `(rule id, error message)` for every rule that failed to compile.
    pub failed: Vec<(String, String)>,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} created, {} already existed, {} failed",
            self.created,
            self.skipped,
            self.failed.len()
        )?;
        for (id, message) in &self.failed {
            writeln!(f, "  {id}: {message}")?;
        }
        Ok(())
    }
}

/// The rulegraph engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn GraphStore>,
    minimizer: Minimizer,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(config: EngineConfig) -> RuleGraphResult<Self> {
        config.validate()?;

        let store: Arc<dyn GraphStore> = match config.data_dir {
            Some(ref dir) => Arc::new(DurableGraphStore::open(dir)?),
            None => Arc::new(MemGraphStore::new()),
        };

        tracing::info!(
            persistent = config.data_dir.is_some(),
            max_attributes = config.max_attributes,
            "initializing rulegraph engine"
        );

        Ok(Self::assemble(config, store))
    }

    /// Create an engine over an existing store.
    pub fn with_store(config: EngineConfig, store: Arc<dyn GraphStore>) -> RuleGraphResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: EngineConfig, store: Arc<dyn GraphStore>) -> Self {
        let minimizer = config.minimizer();
        Self {
            config,
            store,
            minimizer,
        }
    }

    /// Compile a rule into the graph. Re-creating an existing id is a no-op.
    pub fn create_rule(&self, id: &str, formula: &str) -> RuleGraphResult<Acknowledgment> {
        self.compiler().compile(id, formula)
    }

    /// Compile a batch of rules, one transaction per rule. A failing rule is
    /// recorded and does not stop the batch.
    pub fn ingest(&self, rules: &[RuleDefinition]) -> IngestReport {
        let compiler = self.compiler();
        let mut report = IngestReport::default();
        for rule in rules {
            match compiler.compile(&rule.id, &rule.formula) {
                Ok(ack) if ack.is_noop() => report.skipped += 1,
                Ok(_) => report.created += 1,
                Err(err) => {
                    tracing::warn!(rule_id = rule.id.as_str(), error = %err, "rule skipped");
                    report.failed.push((rule.id.clone(), err.to_string()));
                }
            }
        }
        report
    }

    pub fn compiler(&self) -> RuleCompiler<'_> {
        RuleCompiler::new(self.store.as_ref(), self.minimizer)
    }

    /// Minimal path expressions for `formula`. Does not touch the store.
    pub fn minimize(&self, formula: &str) -> RuleGraphResult<Vec<String>> {
        Ok(self.minimizer.path_expressions(formula)?)
    }

    /// Read a rule back with its linked paths.
    pub fn rule(&self, id: &str) -> RuleGraphResult<RuleView> {
        let snapshot = self.store.snapshot()?;
        let rule = snapshot
            .node(NodeKind::Rule, id)
            .ok_or_else(|| RuleError::NotFound { id: id.to_string() })?;

        let mut paths: Vec<String> = snapshot
            .edges_into(EdgeKind::HasRule, rule.id)
            .filter_map(|e| snapshot.node_by_id(e.from))
            .map(|n| n.key.clone())
            .collect();
        paths.sort();

        Ok(RuleView {
            id: rule.key.clone(),
            formula: rule.property(props::FORMULA).unwrap_or_default().to_string(),
            paths,
        })
    }

    /// Export the whole graph with resolved keys.
    pub fn export(&self) -> RuleGraphResult<GraphExport> {
        Ok(GraphExport::from_snapshot(&self.store.snapshot()?))
    }

    /// Get engine info.
    pub fn info(&self) -> RuleGraphResult<EngineInfo> {
        Ok(EngineInfo {
            counts: self.store.counts()?,
            max_attributes: self.minimizer.max_attributes(),
            persistent: self.config.data_dir.is_some(),
        })
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub counts: GraphCounts,
    pub max_attributes: usize,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rulegraph engine info")?;
        writeln!(f, "  rules:          {}", self.counts.rules)?;
        writeln!(f, "  paths:          {}", self.counts.paths)?;
        writeln!(f, "  attributes:     {}", self.counts.attributes)?;
        writeln!(f, "  IN_PATH edges:  {}", self.counts.in_path_edges)?;
        writeln!(f, "  HAS_RULE edges: {}", self.counts.has_rule_edges)?;
        writeln!(f, "  max attributes: {}", self.max_attributes)?;
        writeln!(f, "  persistent:     {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("minimizer", &self.minimizer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, RuleGraphError};

    fn test_engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn create_memory_only_engine() {
        let info = test_engine().info().unwrap();
        assert_eq!(info.counts, GraphCounts::default());
        assert_eq!(info.max_attributes, 16);
        assert!(!info.persistent);
    }

    #[test]
    fn invalid_config_rejected() {
        let result = Engine::new(EngineConfig {
            max_attributes: 0,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(RuleGraphError::Config(ConfigError::Invalid { .. }))
        ));
    }

    #[test]
    fn create_and_read_back() {
        let engine = test_engine();
        engine.create_rule("RuleA", "(0&1)|(2&3)").unwrap();

        let view = engine.rule("RuleA").unwrap();
        assert_eq!(view.formula, "(0&1)|(2&3)");
        assert_eq!(view.paths, vec!["0&1", "2&3"]);
        assert!(view.to_string().contains("path:    2&3"));
    }

    #[test]
    fn missing_rule_is_not_found() {
        let err = test_engine().rule("nope").unwrap_err();
        assert!(matches!(err, RuleGraphError::Rule(RuleError::NotFound { .. })));
    }

    #[test]
    fn minimize_does_not_write() {
        let engine = test_engine();
        assert_eq!(engine.minimize("0&1 | 0&!1").unwrap(), vec!["0"]);
        assert_eq!(engine.info().unwrap().counts, GraphCounts::default());
    }

    #[test]
    fn ingest_counts_each_outcome() {
        let engine = test_engine();
        let rules = vec![
            RuleDefinition {
                id: "R1".into(),
                formula: "0&1".into(),
            },
            RuleDefinition {
                id: "R1".into(),
                formula: "2".into(),
            },
            RuleDefinition {
                id: "R2".into(),
                formula: "0 &".into(),
            },
            RuleDefinition {
                id: "R3".into(),
                formula: "1|2".into(),
            },
        ];
        let report = engine.ingest(&rules);
        assert_eq!(report.created, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "R2");
        assert!(engine.rule("R2").is_err());
    }

    #[test]
    fn export_resolves_keys() {
        let engine = test_engine();
        engine.create_rule("R1", "0&1").unwrap();
        engine.create_rule("R2", "(0&1)|2").unwrap();

        let export = engine.export().unwrap();
        assert_eq!(export.attributes, vec!["0", "1", "2"]);
        let shared = export.paths.iter().find(|p| p.id == "0&1").unwrap();
        assert_eq!(shared.rules, vec!["R1", "R2"]);
        assert_eq!(shared.lead_attribute.as_deref(), Some("0"));
        assert_eq!(export.rules[1].paths, vec!["0&1", "2"]);
    }

    #[test]
    fn engine_with_persistence() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = Engine::new(EngineConfig::persistent(dir.path())).unwrap();
        assert!(engine.info().unwrap().persistent);
    }
}
