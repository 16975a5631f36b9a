//! Boolean formula minimization.
//!
//! Turns a rule formula into its minimal sum-of-products cover, rendered as
//! path expressions:
//!
//! 1. [`parser`]: tokenize and parse the formula into an [`Expr`]
//! 2. [`tabulate`]: evaluate every assignment of the referenced attributes
//! 3. [`implicant`]: Quine–McCluskey prime implicant generation
//! 4. [`petrick`]: Petrick's method for a minimal cover
//!
//! The whole pipeline is a pure function of the formula string: the same
//! input always yields the same path expressions in the same order. Rule
//! compilation depends on this to share Path nodes across rules.

pub mod implicant;
pub mod parser;
pub mod petrick;
pub mod tabulate;

use crate::error::FormulaError;

pub use implicant::{Implicant, Literal};
pub use parser::Expr;
pub use tabulate::{Domain, TruthTable};

/// Result type for formula operations.
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Upper bound accepted for `max_attributes`; tabulation is 2^n rows.
pub const MAX_ATTRIBUTES_CEILING: usize = 24;

/// A minimal sum-of-products cover of a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    domain: Domain,
    terms: Vec<Implicant>,
}

impl Cover {
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Chosen implicants in literal-sequence order.
    pub fn terms(&self) -> &[Implicant] {
        &self.terms
    }

    /// The cover rendered as path expressions, e.g. `["0&1", "2!3"]`.
    pub fn path_expressions(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.render(&self.domain)).collect()
    }

    /// Evaluate the cover under an assignment of attribute indices.
    pub fn eval<F>(&self, value: F) -> bool
    where
        F: Fn(u32) -> bool,
    {
        self.terms.iter().any(|term| {
            term.literals(&self.domain)
                .iter()
                .all(|lit| value(lit.attribute) != lit.negated)
        })
    }
}

/// Formula minimizer with a bound on the attribute domain size.
#[derive(Debug, Clone, Copy)]
pub struct Minimizer {
    max_attributes: usize,
}

impl Default for Minimizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTRIBUTES)
    }
}

impl Minimizer {
    pub const DEFAULT_MAX_ATTRIBUTES: usize = 16;

    /// Create a minimizer; `max_attributes` is clamped to
    /// [`MAX_ATTRIBUTES_CEILING`].
    pub fn new(max_attributes: usize) -> Self {
        Self {
            max_attributes: max_attributes.min(MAX_ATTRIBUTES_CEILING),
        }
    }

    pub fn max_attributes(&self) -> usize {
        self.max_attributes
    }

    /// Parse, tabulate and minimize a formula.
    ///
    /// Rejects formulas that are unsatisfiable or tautological: neither has a
    /// cover made of attribute-bearing paths.
    pub fn minimize(&self, formula: &str) -> FormulaResult<Cover> {
        let expr = parser::parse(formula)?;
        let table = TruthTable::tabulate(&expr, self.max_attributes)?;

        if table.is_unsatisfiable() {
            return Err(FormulaError::Unsatisfiable {
                formula: formula.to_string(),
            });
        }
        if table.is_tautology() {
            return Err(FormulaError::Tautology {
                formula: formula.to_string(),
            });
        }

        let primes = implicant::prime_implicants(&table);
        let terms = petrick::minimal_cover(&primes, table.minterms());

        tracing::debug!(
            formula,
            attributes = table.domain().len(),
            minterms = table.minterms().len(),
            primes = primes.len(),
            cover = terms.len(),
            "minimized formula"
        );

        Ok(Cover {
            domain: table.domain().clone(),
            terms,
        })
    }

    /// Shorthand for `minimize(formula)?.path_expressions()`.
    pub fn path_expressions(&self, formula: &str) -> FormulaResult<Vec<String>> {
        Ok(self.minimize(formula)?.path_expressions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(formula: &str) -> Vec<String> {
        Minimizer::default().path_expressions(formula).unwrap()
    }

    #[test]
    fn disjoint_conjunctions() {
        assert_eq!(paths("(0&1)|(2&3)"), vec!["0&1", "2&3"]);
    }

    #[test]
    fn single_attribute() {
        assert_eq!(paths("7"), vec!["7"]);
        assert_eq!(paths("!7"), vec!["!7"]);
    }

    #[test]
    fn absorption_and_distribution_are_simplified() {
        assert_eq!(paths("0 | 0&1"), vec!["0"]);
        assert_eq!(paths("0 & (1 | 2)"), vec!["0&1", "0&2"]);
    }

    #[test]
    fn negated_literals_use_not_separator() {
        assert_eq!(paths("0 & 1 & !2"), vec!["0&1!2"]);
        assert_eq!(paths("!(0 | 1) & 2"), vec!["!0!1&2"]);
    }

    #[test]
    fn degenerate_formulas_are_rejected() {
        let m = Minimizer::default();
        assert!(matches!(
            m.minimize("0 & !0"),
            Err(FormulaError::Unsatisfiable { .. })
        ));
        assert!(matches!(
            m.minimize("1 | !1"),
            Err(FormulaError::Tautology { .. })
        ));
        assert!(matches!(m.minimize(""), Err(FormulaError::Empty)));
    }

    #[test]
    fn attribute_limit_is_clamped_and_enforced() {
        assert_eq!(Minimizer::new(1_000).max_attributes(), MAX_ATTRIBUTES_CEILING);
        assert!(matches!(
            Minimizer::new(2).minimize("0&1&2"),
            Err(FormulaError::TooManyAttributes { count: 3, max: 2 })
        ));
    }

    #[test]
    fn cover_is_equivalent_to_formula() {
        let formula = "(0 | 1) & !(2 & 3) | 4";
        let expr = parser::parse(formula).unwrap();
        let cover = Minimizer::default().minimize(formula).unwrap();
        for row in 0u32..32 {
            let value = |attr: u32| (row >> attr) & 1 == 1;
            assert_eq!(cover.eval(value), expr.eval(&value), "row {row:05b}");
        }
    }
}
