//! Rich diagnostic error types for the rulegraph engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source spans so users know exactly what
//! went wrong and how to fix it.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub use crate::config::ConfigError;

/// Top-level error type for the rulegraph engine.
///
/// The variants mirror the failure taxonomy of rule compilation: a formula the
/// minimizer rejects, a storage failure (always after rollback), or a malformed
/// rule id. A rule id that already exists is not an error; see
/// [`crate::compiler::CompileOutcome::DuplicateRuleNoop`].
#[derive(Debug, Error, Diagnostic)]
pub enum RuleGraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidFormula(#[from] FormulaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    StorageFailure(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Formula errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FormulaError {
    #[error("empty formula")]
    #[diagnostic(
        code(rulegraph::formula::empty),
        help("Provide a boolean expression over attribute indices, e.g. \"(0 & 1) | !2\".")
    )]
    Empty,

    #[error("unexpected character '{found}' at offset {offset}")]
    #[diagnostic(
        code(rulegraph::formula::unexpected_char),
        help(
            "Formulas may only contain attribute indices (0, 1, 2, ...), \
             the operators `!`, `&`, `|`, parentheses and whitespace."
        )
    )]
    UnexpectedChar {
        found: char,
        offset: usize,
        #[source_code]
        input: String,
        #[label("not part of the formula grammar")]
        span: SourceSpan,
    },

    #[error("expected {expected}, found '{found}' at offset {offset}")]
    #[diagnostic(
        code(rulegraph::formula::unexpected_token),
        help(
            "Operators bind as `!` > `&` > `|`. Every operator needs an operand \
             on each side (`!` only on its right)."
        )
    )]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        offset: usize,
        #[source_code]
        input: String,
        #[label("unexpected here")]
        span: SourceSpan,
    },

    #[error("formula ended early: expected {expected}")]
    #[diagnostic(
        code(rulegraph::formula::unexpected_end),
        help("The formula is truncated. Complete the last operand or close open parentheses.")
    )]
    UnexpectedEnd {
        expected: &'static str,
        #[source_code]
        input: String,
        #[label("input ends here")]
        span: SourceSpan,
    },

    #[error("attribute index '{token}' at offset {offset} does not fit in 32 bits")]
    #[diagnostic(
        code(rulegraph::formula::index_overflow),
        help("Attribute indices must be between 0 and 4294967295.")
    )]
    IndexOverflow {
        token: String,
        offset: usize,
        #[source_code]
        input: String,
        #[label("index too large")]
        span: SourceSpan,
    },

    #[error("formula nests deeper than {max} levels at offset {offset}")]
    #[diagnostic(
        code(rulegraph::formula::too_deep),
        help(
            "Negations and parentheses may nest at most {max} levels. \
             Drop redundant '!!' pairs and parentheses."
        )
    )]
    TooDeep {
        max: usize,
        offset: usize,
        #[source_code]
        input: String,
        #[label("nesting limit reached here")]
        span: SourceSpan,
    },

    #[error("formula references {count} distinct attributes, limit is {max}")]
    #[diagnostic(
        code(rulegraph::formula::too_many_attributes),
        help(
            "Tabulation enumerates every assignment of the referenced attributes \
             (2^{count} rows). Split the rule, or raise `max_attributes` in the config."
        )
    )]
    TooManyAttributes { count: usize, max: usize },

    #[error("formula \"{formula}\" is unsatisfiable")]
    #[diagnostic(
        code(rulegraph::formula::unsatisfiable),
        help("No combination of attributes satisfies this formula, so it has no paths.")
    )]
    Unsatisfiable { formula: String },

    #[error("formula \"{formula}\" is a tautology")]
    #[diagnostic(
        code(rulegraph::formula::tautology),
        help(
            "This formula is true for every combination of its attributes. \
             Its minimal cover is the empty conjunction, which names no attribute \
             and cannot be linked into the graph."
        )
    )]
    Tautology { formula: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(rulegraph::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(rulegraph::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             The transaction was rolled back; retrying the whole call is safe."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(rulegraph::store::serde),
        help(
            "Failed to serialize or deserialize a stored record. \
             The data file may have been written by an incompatible version."
        )
    )]
    Serialization { message: String },

    #[error("key not found: {key}")]
    #[diagnostic(
        code(rulegraph::store::not_found),
        help("The referenced node or edge does not exist in the store or the current transaction.")
    )]
    NotFound { key: String },

    #[error("unique constraint violated: {kind} with id \"{key}\" already exists")]
    #[diagnostic(
        code(rulegraph::store::unique_violation),
        help("Node ids are unique per kind. Look the node up instead of creating it.")
    )]
    UniqueViolation { kind: String, key: String },

    #[error("{key} is already committed and cannot be modified")]
    #[diagnostic(
        code(rulegraph::store::immutable),
        help(
            "Properties can only be set on nodes and edges created in the same \
             transaction. Committed rule graph records are never rewritten."
        )
    )]
    Immutable { key: String },

    #[error("transaction aborted: {message}")]
    #[diagnostic(
        code(rulegraph::store::aborted),
        help("The transaction was rolled back and left no changes behind.")
    )]
    Aborted { message: String },
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule id must not be empty")]
    #[diagnostic(
        code(rulegraph::rule::empty_id),
        help("Choose a stable, non-empty id for each logical rule, e.g. \"Rule 1\".")
    )]
    EmptyId,

    #[error("rule not found: {id}")]
    #[diagnostic(
        code(rulegraph::rule::not_found),
        help("No rule with this id has been created. List rules with `rulegraph export`.")
    )]
    NotFound { id: String },
}

/// Convenience alias for functions returning rulegraph results.
pub type RuleGraphResult<T> = std::result::Result<T, RuleGraphError>;
