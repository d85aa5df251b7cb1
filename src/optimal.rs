//! Exhaustive optimal contraction ordering by dynamic programming over subsets.
//!
//! Every subset of the original tensors that may appear as an intermediate is
//! reduced to one tensor at most once. Subsets are processed by increasing
//! size; the best way to build a subset only depends on strictly smaller
//! subsets, so all subsets of one size are evaluated in parallel and their
//! records are stored together once the whole level is done. Records are never
//! revised afterwards.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::connectivity::{single_el_subset, Connectivity, Subset};
use crate::cost::{compute_legs, pair_cost, transient_peak};
use crate::error::OptimizeError;
use crate::greedy::{optimize_greedy, GreedyOptions};
use crate::network::{Cost, Dim, TensorNetwork};
use crate::processor::Legs;
use crate::sequence::{ContractionPlan, ContractionSequence, SSAPath};

use FxHashMap as Dict;

/// Whether splits whose two halves share no leg are considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OuterProducts {
    /// Only connected halves sharing a leg, unless a subset can be built no
    /// other way.
    #[default]
    Avoid,
    /// Every bipartition of every subset.
    Allow,
}

/// Limits on how long a search may run. Checked between levels of the subset
/// search and periodically during branch and bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchBudget {
    /// Maximum number of search states to evaluate.
    pub max_states: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub(crate) fn deadline(&self, start: Instant) -> Option<Instant> {
        self.time_limit.map(|limit| start + limit)
    }

    pub(crate) fn exhausted(&self, states: usize, deadline: Option<Instant>) -> bool {
        self.max_states.is_some_and(|max| states >= max)
            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimalOptions {
    pub outer_products: OuterProducts,
    pub budget: SearchBudget,
}

/// Best known way to reduce one subset to a single tensor.
#[derive(Debug, Clone)]
struct SubsetRecord {
    cost: Cost,
    peak: Cost,
    size: Cost,
    legs: Legs,
    split: Option<(Subset, Subset)>,
    outer_product: bool,
}

/// A candidate split, ordered by total cost then peak.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: Cost,
    peak: Cost,
    s1: Subset,
    s2: Subset,
}

impl Candidate {
    fn beats(&self, other: &Option<Candidate>) -> bool {
        match other {
            None => true,
            Some(best) => (self.cost, self.peak) < (best.cost, best.peak),
        }
    }
}

/// All `k` element subsets of `n` tensors, in increasing order.
fn subsets_of_size(n: usize, k: usize) -> Vec<Subset> {
    let mut subsets = Vec::new();
    if k == 0 || k > n {
        return subsets;
    }
    // work in 128 bits so that `n = 64` does not overflow
    let limit: u128 = 1 << n;
    let mut s: u128 = (1 << k) - 1;
    while s < limit {
        subsets.push(s as Subset);
        let c = s & s.wrapping_neg();
        let r = s + c;
        s = (((r ^ s) >> 2) / c) | r;
    }
    subsets
}

struct SubsetSearch<'a> {
    connectivity: Connectivity,
    sizes: &'a [Dim],
    outer_products: OuterProducts,
    records: Dict<Subset, SubsetRecord>,
}

impl<'a> SubsetSearch<'a> {
    fn new(
        network: &'a TensorNetwork,
        outer_products: OuterProducts,
    ) -> Result<Self, OptimizeError> {
        let connectivity = Connectivity::new(network)?;
        let mut records: Dict<Subset, SubsetRecord> = Dict::default();
        for i in 0..network.len() {
            let size = network.element_count(i);
            records.insert(
                single_el_subset(i),
                SubsetRecord {
                    cost: 0,
                    peak: size,
                    size,
                    legs: network.term(i).to_vec(),
                    split: None,
                    outer_product: false,
                },
            );
        }
        Ok(Self {
            connectivity,
            sizes: network.sizes(),
            outer_products,
            records,
        })
    }

    /// Subsets of size `k` that are states of the search.
    fn level(&self, k: usize) -> Vec<Subset> {
        let subsets = subsets_of_size(self.connectivity.len(), k);
        match self.outer_products {
            OuterProducts::Avoid => subsets
                .into_iter()
                .filter(|&s| self.connectivity.is_connected(s))
                .collect(),
            OuterProducts::Allow => subsets,
        }
    }

    /// Find the best split of `s`, given records for all smaller subsets.
    fn evaluate(&self, s: Subset) -> Option<SubsetRecord> {
        let mut best_shared: Option<Candidate> = None;
        let mut best_outer: Option<Candidate> = None;

        // the lowest member always goes to `s1`, covering each split once
        let low = s & s.wrapping_neg();
        let rest = s ^ low;
        let mut sub = rest;
        while sub != 0 {
            sub = (sub - 1) & rest;
            let s1 = low | sub;
            let s2 = s ^ s1;

            // in avoid mode only connected subsets have records
            let (Some(a), Some(b)) = (self.records.get(&s1), self.records.get(&s2)) else {
                continue;
            };

            let (step_cost, size, shared) = pair_cost(&a.legs, a.size, &b.legs, self.sizes);
            let candidate = Candidate {
                cost: a.cost.saturating_add(b.cost).saturating_add(step_cost),
                peak: a.peak.max(b.peak).max(transient_peak(a.size, b.size, size)),
                s1,
                s2,
            };
            let best = match (shared, self.outer_products) {
                (true, _) | (false, OuterProducts::Allow) => &mut best_shared,
                (false, OuterProducts::Avoid) => &mut best_outer,
            };
            if candidate.beats(best) {
                *best = Some(candidate);
            }
        }

        // outer products only when nothing else builds this subset. With
        // connected halves of a connected subset some leg always runs between
        // them, so for validated networks `best_outer` stays empty.
        let best = best_shared.or(best_outer)?;
        let a = &self.records[&best.s1];
        let b = &self.records[&best.s2];
        let legs = compute_legs(&a.legs, &b.legs);
        let (_, size, shared) = pair_cost(&a.legs, a.size, &b.legs, self.sizes);
        Some(SubsetRecord {
            cost: best.cost,
            peak: best.peak,
            size,
            legs,
            split: Some((best.s1, best.s2)),
            outer_product: !shared,
        })
    }

    /// Fill the table level by level. Returns false if the budget ran out
    /// before the full set was reached.
    fn run(&mut self, budget: &SearchBudget) -> bool {
        let n = self.connectivity.len();
        let deadline = budget.deadline(Instant::now());
        let mut states = n;
        for k in 2..=n {
            if budget.exhausted(states, deadline) {
                warn!("optimal search budget exhausted after {states} states, before level {k}");
                return false;
            }
            let level = self.level(k);
            let this = &*self;
            let found: Vec<(Subset, SubsetRecord)> = level
                .par_iter()
                .filter_map(|&s| this.evaluate(s).map(|record| (s, record)))
                .collect();
            states += level.len();
            debug!(
                "optimal search level {k}: {} subsets, {} recorded",
                level.len(),
                found.len()
            );
            self.records.extend(found);
        }
        true
    }

    /// Walk the chosen splits from the full set down to single tensors and
    /// emit the contractions children first.
    fn reconstruct(&self) -> SSAPath {
        let n = self.connectivity.len();
        let mut ids: Dict<Subset, usize> =
            (0..n).map(|i| (single_el_subset(i), i)).collect();
        let mut path: SSAPath = Vec::with_capacity(n.saturating_sub(1));
        let mut stack: Vec<(Subset, bool)> = vec![(self.connectivity.all(), false)];
        while let Some((s, expanded)) = stack.pop() {
            let Some((s1, s2)) = self.records[&s].split else {
                continue;
            };
            if expanded {
                path.push(vec![ids[&s1], ids[&s2]]);
                ids.insert(s, n + path.len() - 1);
            } else {
                stack.push((s, true));
                stack.push((s2, false));
                stack.push((s1, false));
            }
        }
        path
    }
}

/// Find the contraction sequence of minimum total cost, ties broken by the
/// memory peak.
///
/// If the budget runs out the greedy plan is returned instead, marked as
/// incomplete.
pub fn optimize_optimal(
    network: &TensorNetwork,
    options: &OptimalOptions,
) -> Result<ContractionPlan, OptimizeError> {
    let mut search = SubsetSearch::new(network, options.outer_products)?;
    if !search.run(&options.budget) {
        let mut plan = optimize_greedy(network, &GreedyOptions::default())?;
        plan.complete = false;
        return Ok(plan);
    }

    let sequence = ContractionSequence::from_ssa_path(network, &search.reconstruct())?;
    let best = &search.records[&search.connectivity.all()];
    debug_assert_eq!(sequence.cpu_cost(), best.cost);
    if best.outer_product {
        debug!("final contraction of the optimal sequence is an outer product");
    }
    let plan = ContractionPlan::new(sequence, true);
    info!(
        "optimal contraction of {} tensors: cpu={}, mem={}",
        network.len(),
        plan.cpu,
        plan.mem
    );
    Ok(plan)
}
