//! Truth-table tabulation over the attributes a formula references.

use crate::error::FormulaError;

use super::FormulaResult;
use super::parser::Expr;

/// Sorted, distinct attribute indices referenced by a formula.
///
/// Position `i` in the domain is bit `i` of every minterm and implicant built
/// over it, so ascending positions are ascending attribute indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    attributes: Vec<u32>,
}

impl Domain {
    /// The domain of an expression: every attribute it mentions.
    pub fn of(expr: &Expr) -> Self {
        Self {
            attributes: expr.attributes().into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute index at the given bit position.
    pub fn attribute(&self, position: usize) -> u32 {
        self.attributes[position]
    }

    /// Bit position of an attribute, if it is part of the domain.
    pub fn position(&self, attribute: u32) -> Option<usize> {
        self.attributes.binary_search(&attribute).ok()
    }

    /// Bitmask with one bit set per domain position.
    pub fn full_mask(&self) -> u32 {
        if self.attributes.len() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.attributes.len()) - 1
        }
    }

    pub fn attributes(&self) -> &[u32] {
        &self.attributes
    }
}

/// The satisfying assignments (minterms) of a formula over its domain.
#[derive(Debug, Clone)]
pub struct TruthTable {
    domain: Domain,
    minterms: Vec<u32>,
}

impl TruthTable {
    /// Evaluate `expr` under every assignment of its domain.
    ///
    /// Fails with [`FormulaError::TooManyAttributes`] when the domain exceeds
    /// `max_attributes`, before any row is evaluated.
    pub fn tabulate(expr: &Expr, max_attributes: usize) -> FormulaResult<Self> {
        let domain = Domain::of(expr);
        if domain.len() > max_attributes {
            return Err(FormulaError::TooManyAttributes {
                count: domain.len(),
                max: max_attributes,
            });
        }

        let rows = 1u64 << domain.len();
        let minterms = (0..rows)
            .map(|row| row as u32)
            .filter(|&row| {
                expr.eval(&|attribute| {
                    domain
                        .position(attribute)
                        .is_some_and(|pos| (row >> pos) & 1 == 1)
                })
            })
            .collect();

        Ok(Self { domain, minterms })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Satisfying rows in ascending order.
    pub fn minterms(&self) -> &[u32] {
        &self.minterms
    }

    /// Total number of rows (2^|domain|).
    pub fn row_count(&self) -> u64 {
        1u64 << self.domain.len()
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.minterms.is_empty()
    }

    pub fn is_tautology(&self) -> bool {
        self.minterms.len() as u64 == self.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;

    #[test]
    fn domain_is_sorted_and_distinct() {
        let expr = parse("7 & 3 | !7 & 10").unwrap();
        let domain = Domain::of(&expr);
        assert_eq!(domain.attributes(), &[3, 7, 10]);
        assert_eq!(domain.position(7), Some(1));
        assert_eq!(domain.position(4), None);
        assert_eq!(domain.full_mask(), 0b111);
    }

    #[test]
    fn and_has_single_minterm() {
        let table = TruthTable::tabulate(&parse("0&1").unwrap(), 16).unwrap();
        assert_eq!(table.minterms(), &[0b11]);
        assert_eq!(table.row_count(), 4);
    }

    #[test]
    fn sparse_indices_are_compacted() {
        // Domain {5, 9}: bit 0 is attribute 5, bit 1 is attribute 9.
        let table = TruthTable::tabulate(&parse("5 & !9").unwrap(), 16).unwrap();
        assert_eq!(table.minterms(), &[0b01]);
    }

    #[test]
    fn unsatisfiable_and_tautology_are_detected() {
        let never = TruthTable::tabulate(&parse("0 & !0").unwrap(), 16).unwrap();
        assert!(never.is_unsatisfiable());

        let always = TruthTable::tabulate(&parse("0 | !0").unwrap(), 16).unwrap();
        assert!(always.is_tautology());
    }

    #[test]
    fn attribute_limit_is_enforced() {
        let expr = parse("0 & 1 & 2 & 3").unwrap();
        assert!(matches!(
            TruthTable::tabulate(&expr, 3),
            Err(FormulaError::TooManyAttributes { count: 4, max: 3 })
        ));
    }
}
