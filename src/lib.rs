// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rulegraph
//!
//! Compiles named boolean rules over numbered attributes into a shared graph
//! of Rule, Path and Attribute nodes.
//!
//! ## Architecture
//!
//! - **Minimizer** (`formula`): parse, tabulate, Quine–McCluskey prime
//!   implicants, Petrick's method for the minimum cover
//! - **Graph store** (`graph`): transactional, content-addressed nodes with
//!   in-memory (petgraph) and durable (redb) backends
//! - **Compiler** (`compiler`): idempotent, atomic rule materialization with
//!   get-or-create sharing of paths and attributes
//! - **Engine** (`engine`): facade tying config, store and minimizer together
//!
//! ## Library usage
//!
//! ```no_run
//! use rulegraph::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let ack = engine.create_rule("RuleA", "(0&1)|(2&3)").unwrap();
//! assert_eq!(ack.message, "Rule (0&1)|(2&3) created.");
//! assert_eq!(engine.rule("RuleA").unwrap().paths, vec!["0&1", "2&3"]);
//! ```

pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod formula;
pub mod graph;
