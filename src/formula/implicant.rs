//! Implicants and Quine–McCluskey prime implicant generation.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::tabulate::{Domain, TruthTable};

/// One literal of a product term.
///
/// Orders by attribute index, positive before negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub attribute: u32,
    pub negated: bool,
}

/// A product term over a [`Domain`]: `care` marks the fixed positions,
/// `value` their required polarity. Bits of `value` outside `care` are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Implicant {
    value: u32,
    care: u32,
}

impl Implicant {
    /// The implicant covering exactly one minterm.
    pub fn minterm(minterm: u32, domain: &Domain) -> Self {
        let care = domain.full_mask();
        Self {
            value: minterm & care,
            care,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn care(&self) -> u32 {
        self.care
    }

    pub fn covers(&self, minterm: u32) -> bool {
        minterm & self.care == self.value
    }

    pub fn literal_count(&self) -> u32 {
        self.care.count_ones()
    }

    /// `(position, negated)` for every cared position, ascending.
    fn positions(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        (0..32usize)
            .filter(|&pos| (self.care >> pos) & 1 == 1)
            .map(|pos| (pos, (self.value >> pos) & 1 == 0))
    }

    /// Literals in ascending attribute order.
    pub fn literals(&self, domain: &Domain) -> Vec<Literal> {
        self.positions()
            .map(|(pos, negated)| Literal {
                attribute: domain.attribute(pos),
                negated,
            })
            .collect()
    }

    /// Render as a path expression: the first literal bare (`N` or `!N`),
    /// each following one as `&N` or `!N`. The empty term renders as `""`.
    pub fn render(&self, domain: &Domain) -> String {
        let mut out = String::new();
        for (i, lit) in self.literals(domain).into_iter().enumerate() {
            if lit.negated {
                out.push('!');
            } else if i > 0 {
                out.push('&');
            }
            out.push_str(&lit.attribute.to_string());
        }
        out
    }
}

impl Ord for Implicant {
    /// Lexicographic over the literal sequence, which matches the order of
    /// rendered literals since positions ascend with attribute indices.
    fn cmp(&self, other: &Self) -> Ordering {
        self.positions()
            .cmp(other.positions())
            .then_with(|| self.care.cmp(&other.care))
    }
}

impl PartialOrd for Implicant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Every prime implicant of the table's minterms, sorted.
///
/// Each round merges pairs of terms with the same care mask that differ in
/// exactly one cared bit; terms never merged in a round are prime.
pub fn prime_implicants(table: &TruthTable) -> Vec<Implicant> {
    let domain = table.domain();
    let mut current: HashSet<Implicant> = table
        .minterms()
        .iter()
        .map(|&m| Implicant::minterm(m, domain))
        .collect();
    let mut primes: Vec<Implicant> = Vec::new();

    while !current.is_empty() {
        let mut next = HashSet::new();
        let mut merged = HashSet::new();

        for imp in &current {
            let mut bits = imp.value;
            while bits != 0 {
                let bit = bits & bits.wrapping_neg();
                bits &= bits - 1;

                let partner = Implicant {
                    value: imp.value & !bit,
                    care: imp.care,
                };
                if current.contains(&partner) {
                    next.insert(Implicant {
                        value: partner.value,
                        care: imp.care & !bit,
                    });
                    merged.insert(*imp);
                    merged.insert(partner);
                }
            }
        }

        primes.extend(current.iter().filter(|imp| !merged.contains(*imp)).copied());
        current = next;
    }

    primes.sort();
    primes.dedup();
    primes
}
