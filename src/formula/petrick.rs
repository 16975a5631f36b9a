//! Petrick's method: choose a minimal set of prime implicants covering every
//! minterm.
//!
//! Essential primes (the only cover of some minterm) are taken first. Each
//! remaining minterm is a clause, the sum of the primes covering it, and a
//! cover is a product satisfying every clause. Instead of multiplying the
//! clauses out, the products are searched depth first: branch on the open
//! clause with the fewest options, seed the incumbent with a greedy cover,
//! and cut any branch whose lower bound cannot beat it.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::implicant::Implicant;

type Selection = BTreeSet<usize>;

/// Select a minimal cover of `minterms` from `primes`.
///
/// Ties are broken by fewest implicants, then fewest literals, then the
/// sorted implicant sequence, so the result is a pure function of the input.
/// The returned implicants are sorted.
pub fn minimal_cover(primes: &[Implicant], minterms: &[u32]) -> Vec<Implicant> {
    let clauses: Vec<Vec<usize>> = minterms
        .iter()
        .map(|&m| {
            primes
                .iter()
                .enumerate()
                .filter(|(_, p)| p.covers(m))
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    let mut chosen: Selection = clauses
        .iter()
        .filter(|clause| clause.len() == 1)
        .flat_map(|clause| clause.iter().copied())
        .collect();

    // Identical clauses collapse; the set also fixes their order.
    let remaining: BTreeSet<Vec<usize>> = clauses
        .into_iter()
        .filter(|clause| clause.iter().all(|i| !chosen.contains(i)))
        .collect();

    if !remaining.is_empty() {
        let mut search = CoverSearch::new(primes, remaining.into_iter().collect());
        search.run();
        chosen.extend(search.best);
    }

    let mut cover: Vec<Implicant> = chosen.into_iter().map(|i| primes[i]).collect();
    cover.sort();
    cover
}

/// Branch-and-bound state over the clauses left after essentials.
struct CoverSearch<'a> {
    primes: &'a [Implicant],
    clauses: Vec<Vec<usize>>,
    /// Prime indices in implicant order.
    order: Vec<usize>,
    min_literals: u32,
    selected: Vec<bool>,
    excluded: Vec<bool>,
    stack: Vec<usize>,
    literals: u32,
    best: Selection,
    best_literals: u32,
}

impl<'a> CoverSearch<'a> {
    fn new(primes: &'a [Implicant], clauses: Vec<Vec<usize>>) -> Self {
        let mut order: Vec<usize> = (0..primes.len()).collect();
        order.sort_by(|&a, &b| primes[a].cmp(&primes[b]).then_with(|| a.cmp(&b)));
        let min_literals = primes.iter().map(Implicant::literal_count).min().unwrap_or(0);
        Self {
            primes,
            clauses,
            order,
            min_literals,
            selected: vec![false; primes.len()],
            excluded: vec![false; primes.len()],
            stack: Vec::new(),
            literals: 0,
            best: Selection::new(),
            best_literals: 0,
        }
    }

    fn run(&mut self) {
        self.best = self.greedy();
        self.best_literals = self.literals_of(&self.best);
        self.search();
    }

    fn literals_of(&self, selection: &Selection) -> u32 {
        selection.iter().map(|&i| self.primes[i].literal_count()).sum()
    }

    /// Repeatedly take the prime covering the most open clauses.
    fn greedy(&self) -> Selection {
        let mut covered = vec![false; self.clauses.len()];
        let mut chosen = Selection::new();
        loop {
            let mut hits = vec![0usize; self.primes.len()];
            for (clause, _) in self.clauses.iter().zip(&covered).filter(|(_, c)| !**c) {
                for &i in clause {
                    hits[i] += 1;
                }
            }
            let pick = (0..self.primes.len()).filter(|&i| hits[i] > 0).max_by(|&a, &b| {
                hits[a]
                    .cmp(&hits[b])
                    .then_with(|| self.primes[b].literal_count().cmp(&self.primes[a].literal_count()))
                    .then_with(|| b.cmp(&a))
            });
            let Some(pick) = pick else {
                return chosen;
            };
            chosen.insert(pick);
            for (clause, c) in self.clauses.iter().zip(covered.iter_mut()) {
                if clause.contains(&pick) {
                    *c = true;
                }
            }
        }
    }

    fn search(&mut self) {
        let mut open: Vec<Vec<usize>> = Vec::new();
        for clause in &self.clauses {
            if clause.iter().any(|&i| self.selected[i]) {
                continue;
            }
            let options: Vec<usize> = clause.iter().copied().filter(|&i| !self.excluded[i]).collect();
            if options.is_empty() {
                return;
            }
            open.push(options);
        }

        if open.is_empty() {
            let candidate: Selection = self.stack.iter().copied().collect();
            if compare_cost(&candidate, &self.best, self.primes) == Ordering::Less {
                self.best_literals = self.literals;
                self.best = candidate;
            }
            return;
        }

        open.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        let bound = self.disjoint_clauses(&open);
        let size = self.stack.len() + bound;
        let literals = self.literals + bound as u32 * self.min_literals;
        match (size, literals).cmp(&(self.best.len(), self.best_literals)) {
            Ordering::Greater => return,
            Ordering::Equal if !self.may_sort_below_best() => return,
            _ => {}
        }

        let branch = open.swap_remove(0);
        for &i in &branch {
            let cost = self.primes[i].literal_count();
            self.selected[i] = true;
            self.stack.push(i);
            self.literals += cost;
            self.search();
            self.literals -= cost;
            self.stack.pop();
            self.selected[i] = false;
            // Later siblings cover the covers without `i`.
            self.excluded[i] = true;
        }
        for &i in &branch {
            self.excluded[i] = false;
        }
    }

    /// Lower bound on primes still needed: open clauses sharing no option
    /// each need a prime of their own.
    fn disjoint_clauses(&self, open: &[Vec<usize>]) -> usize {
        let mut used = vec![false; self.primes.len()];
        let mut count = 0;
        for clause in open {
            if clause.iter().all(|&i| !used[i]) {
                count += 1;
                for &i in clause {
                    used[i] = true;
                }
            }
        }
        count
    }

    /// Whether a completion tying the incumbent on size and literals could
    /// still sort before it. The smallest candidate is the stack plus the
    /// lowest-ordered primes still allowed.
    fn may_sort_below_best(&self) -> bool {
        let free = self.best.len().saturating_sub(self.stack.len());
        let mut lowest: Vec<Implicant> = self.stack.iter().map(|&i| self.primes[i]).collect();
        lowest.extend(
            self.order
                .iter()
                .filter(|&&i| !self.selected[i] && !self.excluded[i])
                .take(free)
                .map(|&i| self.primes[i]),
        );
        lowest.sort();
        let mut best: Vec<Implicant> = self.best.iter().map(|&i| self.primes[i]).collect();
        best.sort();
        lowest < best
    }
}

fn compare_cost(a: &Selection, b: &Selection, primes: &[Implicant]) -> Ordering {
    let literals = |s: &Selection| s.iter().map(|&i| primes[i].literal_count()).sum::<u32>();
    let sorted = |s: &Selection| {
        let mut terms: Vec<Implicant> = s.iter().map(|&i| primes[i]).collect();
        terms.sort();
        terms
    };
    a.len()
        .cmp(&b.len())
        .then_with(|| literals(a).cmp(&literals(b)))
        .then_with(|| sorted(a).cmp(&sorted(b)))
}
