//! Depth-first branch and bound over explicit contraction sequences.
//!
//! Only pairs sharing a leg are ever contracted. The search starts from the
//! greedy plan as its bound, tries the cheapest candidates first and cuts every
//! branch whose partial cost and peak can no longer beat the best complete
//! sequence. States reached through different orders are recognised by the
//! set of legs already summed over.

use std::time::Instant;

use bit_set::BitSet;
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::cost::{compute_legs, compute_size, pair_cost, transient_peak};
use crate::error::OptimizeError;
use crate::greedy::{optimize_greedy, GreedyOptions};
use crate::network::{Cost, Dim, TensorNetwork};
use crate::optimal::SearchBudget;
use crate::processor::{Legs, Node};
use crate::sequence::{ContractionPlan, ContractionSequence, SSAPath};

use FxHashMap as Dict;

/// how many states to visit between deadline checks
const CLOCK_INTERVAL: usize = 256;

/// An intermediate tensor of the current branch.
#[derive(Debug, Clone)]
struct Term {
    node: Node,
    legs: Legs,
    size: Cost,
}

/// A pair contraction considered from the current state.
struct Candidate {
    cost: Cost,
    peak: Cost,
    i: usize,
    j: usize,
    size: Cost,
}

pub struct BranchBound<'a> {
    sizes: &'a [Dim],
    num_legs: usize,
    budget: SearchBudget,
    deadline: Option<Instant>,
    best_cost: Cost,
    best_peak: Cost,
    best_path: SSAPath,
    seen: Dict<(BitSet, usize), (Cost, Cost)>,
    visited: usize,
    aborted: bool,
}

impl<'a> BranchBound<'a> {
    /// Set up a search bounded by an already known plan.
    pub fn new(
        network: &'a TensorNetwork,
        budget: SearchBudget,
        bound: &ContractionPlan,
    ) -> Self {
        Self {
            sizes: network.sizes(),
            num_legs: network.num_legs(),
            budget,
            deadline: None,
            best_cost: bound.cpu,
            best_peak: bound.mem,
            best_path: bound.ssa_path(),
            seen: Dict::default(),
            visited: 0,
            aborted: false,
        }
    }

    pub fn best_cost(&self) -> Cost {
        self.best_cost
    }

    pub fn best_path(&self) -> &SSAPath {
        &self.best_path
    }

    /// Whether the last search was cut short by the budget.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    fn is_better(&self, cost: Cost, peak: Cost) -> bool {
        (cost, peak) < (self.best_cost, self.best_peak)
    }

    fn out_of_budget(&mut self) -> bool {
        if !self.aborted {
            let check_clock = self.visited % CLOCK_INTERVAL == 1;
            let deadline = if check_clock { self.deadline } else { None };
            self.aborted = self.budget.exhausted(self.visited, deadline);
        }
        self.aborted
    }

    /// Search all contraction sequences of `network`.
    pub fn optimize_path(&mut self, network: &TensorNetwork) {
        self.deadline = self.budget.deadline(Instant::now());
        self.seen.clear();
        self.visited = 0;
        self.aborted = false;
        let remaining: Vec<Term> = (0..network.len())
            .map(|i| Term {
                node: i,
                legs: network.term(i).to_vec(),
                size: network.element_count(i),
            })
            .collect();
        let mut path = Vec::with_capacity(remaining.len());
        self.branch_iterate(
            remaining,
            BitSet::with_capacity(self.num_legs),
            &mut path,
            0,
            0,
            network.len(),
        );
    }

    fn branch_iterate(
        &mut self,
        remaining: Vec<Term>,
        contracted: BitSet,
        path: &mut SSAPath,
        cost: Cost,
        peak: Cost,
        next_node: Node,
    ) {
        if remaining.len() == 1 {
            if self.is_better(cost, peak) {
                debug!("branch and bound improved to cpu={cost}, mem={peak}");
                self.best_cost = cost;
                self.best_peak = peak;
                self.best_path = path.clone();
            }
            return;
        }

        self.visited += 1;
        if self.out_of_budget() {
            return;
        }

        // a cheaper or equally cheap way into this state is already known
        let key = (contracted.clone(), remaining.len());
        if let Some(&known) = self.seen.get(&key) {
            if known <= (cost, peak) {
                return;
            }
        }
        self.seen.insert(key, (cost, peak));

        let mut candidates = Vec::new();
        for i in 0..remaining.len() {
            for j in (i + 1)..remaining.len() {
                let (a, b) = (&remaining[i], &remaining[j]);
                let (step_cost, size, shared) = pair_cost(&a.legs, a.size, &b.legs, self.sizes);
                if !shared {
                    continue;
                }
                let new_cost = cost.saturating_add(step_cost);
                let new_peak = peak.max(transient_peak(a.size, b.size, size));
                if self.is_better(new_cost, new_peak) {
                    candidates.push(Candidate {
                        cost: new_cost,
                        peak: new_peak,
                        i,
                        j,
                        size,
                    });
                }
            }
        }
        candidates.sort_by_key(|c| (c.cost, c.peak, c.i, c.j));

        for Candidate {
            cost: new_cost,
            peak: new_peak,
            i,
            j,
            size,
        } in candidates
        {
            // the bound may have tightened while exploring earlier candidates
            if self.aborted || !self.is_better(new_cost, new_peak) {
                continue;
            }
            let (a, b) = (&remaining[i], &remaining[j]);
            let mut new_contracted = contracted.clone();
            for ix in a.legs.iter().filter(|ix| b.legs.contains(ix)) {
                new_contracted.insert(*ix as usize);
            }
            let new_term = Term {
                node: next_node,
                legs: compute_legs(&a.legs, &b.legs),
                size,
            };
            debug_assert_eq!(new_term.size, compute_size(&new_term.legs, self.sizes));
            let pair = vec![a.node, b.node];
            let mut new_remaining: Vec<Term> = remaining
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != i && k != j)
                .map(|(_, t)| t.clone())
                .collect();
            new_remaining.push(new_term);

            path.push(pair);
            self.branch_iterate(
                new_remaining,
                new_contracted,
                path,
                new_cost,
                new_peak,
                next_node + 1,
            );
            path.pop();
        }
    }
}

/// Exhaustive search over contraction sequences, seeded with the greedy plan.
///
/// Produces the same optimal cost as
/// [`optimize_optimal`](crate::optimize_optimal) whenever it completes. If the
/// budget runs out, the best sequence found so far is returned marked as
/// incomplete.
pub fn optimize_branchbound(
    network: &TensorNetwork,
    budget: &SearchBudget,
) -> Result<ContractionPlan, OptimizeError> {
    let greedy = optimize_greedy(network, &GreedyOptions::default())?;
    if network.len() <= 2 {
        return Ok(greedy);
    }
    let mut bb = BranchBound::new(network, budget.clone(), &greedy);
    bb.optimize_path(network);
    let sequence = ContractionSequence::from_ssa_path(network, bb.best_path())?;
    let plan = ContractionPlan::new(sequence, !bb.aborted());
    info!(
        "branch and bound over {} states: cpu={}, mem={}, complete={}",
        bb.visited, plan.cpu, plan.mem, plan.complete
    );
    Ok(plan)
}
