//! Greedy contraction ordering, optionally randomized.

use std::collections::BinaryHeap;

use log::{debug, info};
use ordered_float::OrderedFloat;
use rand::Rng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::cost::{compute_legs, compute_log_size};
use crate::error::OptimizeError;
use crate::network::{Cost, TensorNetwork};
use crate::processor::{ContractionProcessor, Legs, Node};
use crate::sequence::{ContractionPlan, ContractionSequence, SSAPath};

use FxHashMap as Dict;

type Score = f32;
type GreedyScore = OrderedFloat<Score>;

/// Options for a single greedy run.
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOptions {
    /// Weight of the operand sizes against the result size in the local score.
    pub costmod: f32,
    /// Scale of the Gumbel noise added to each score, zero for a deterministic run.
    pub temperature: f32,
    pub seed: Option<u64>,
}

impl Default for GreedyOptions {
    fn default() -> Self {
        Self {
            costmod: 1.0,
            temperature: 0.0,
            seed: None,
        }
    }
}

/// Options for repeated randomized greedy runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomGreedyOptions {
    pub ntrials: usize,
    /// Range `costmod` is sampled from uniformly.
    pub costmod: (f32, f32),
    /// Range `temperature` is sampled from log-uniformly.
    pub temperature: (f32, f32),
    pub seed: Option<u64>,
}

impl Default for RandomGreedyOptions {
    fn default() -> Self {
        Self {
            ntrials: 32,
            costmod: (0.1, 4.0),
            temperature: (0.001, 1.0),
            seed: None,
        }
    }
}

/// given log(x) and log(y) compute log(x + y), without exponentiating both
fn logadd(lx: Score, ly: Score) -> Score {
    let max_val = lx.max(ly);
    max_val + f32::ln_1p(f32::exp(-f32::abs(lx - ly)))
}

/// given log(x) and log(y) compute log(x - y), without exponentiating both,
/// if (x - y) is negative, return -log(x - y).
fn logsub(lx: f32, ly: f32) -> f32 {
    if lx < ly {
        -ly - f32::ln_1p(-f32::exp(lx - ly))
    } else {
        lx + f32::ln_1p(-f32::exp(ly - lx))
    }
}

impl ContractionProcessor {
    /// greedily optimize the contraction order of all terms
    fn optimize_greedy(&mut self, costmod: f32, temperature: f32, seed: Option<u64>) -> bool {
        let coeff_t = temperature;
        let log_coeff_a = f32::ln(costmod);

        let mut rng = if coeff_t != 0.0 {
            Some(match seed {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
                None => rand::rngs::StdRng::from_entropy(),
            })
        } else {
            // zero temp - no need for rng
            None
        };

        let mut local_score = |sa: Score, sb: Score, sab: Score| -> Score {
            let gumbel = if let Some(rng) = &mut rng {
                coeff_t * -f32::ln(-f32::ln(rng.gen()))
            } else {
                0.0 as f32
            };
            logsub(sab - log_coeff_a, logadd(sa, sb) + log_coeff_a) - gumbel
        };

        // cache all current nodes sizes as we go
        let mut node_sizes: Dict<Node, Score> = Dict::default();
        self.nodes.iter().for_each(|(&i, legs)| {
            node_sizes.insert(i, compute_log_size(legs, &self.sizes));
        });

        // we will *deincrement* c, since its a max-heap
        let mut c: i32 = 0;
        let mut queue: BinaryHeap<(GreedyScore, i32)> =
            BinaryHeap::with_capacity(self.edges.len() * 2);

        // the heap keeps a reference to actual contraction info in this
        let mut contractions: Dict<i32, (Node, Node, Score, Legs)> = Dict::default();

        // get the initial candidate contractions
        for ix_nodes in self.edges.values() {
            let ix_nodes: Vec<Node> = ix_nodes.iter().cloned().collect();
            for ip in 0..ix_nodes.len() {
                let i = ix_nodes[ip];
                let isize = node_sizes[&i];
                for &j in &ix_nodes[ip + 1..] {
                    let jsize = node_sizes[&j];
                    let klegs = compute_legs(&self.nodes[&i], &self.nodes[&j]);
                    let ksize = compute_log_size(&klegs, &self.sizes);
                    let score = local_score(isize, jsize, ksize);
                    queue.push((OrderedFloat(-score), c));
                    contractions.insert(c, (i, j, ksize, klegs));
                    c -= 1;
                }
            }
        }

        // greedily contract remaining
        while let Some((_, c0)) = queue.pop() {
            let Some((i, j, ksize, klegs)) = contractions.remove(&c0) else {
                continue;
            };
            if !self.nodes.contains_key(&i) || !self.nodes.contains_key(&j) {
                // one of the nodes has been removed -> skip
                continue;
            }

            let k = self.contract_nodes_given_legs(i, j, klegs.clone());

            if self.track_flops && self.flops >= self.flops_limit {
                // stop if we have reached the flops limit
                return false;
            }

            node_sizes.insert(k, ksize);

            for l in self.neighbors(k) {
                // assess all neighboring contractions of new node
                let llegs = &self.nodes[&l];
                let lsize = node_sizes[&l];
                let mlegs = compute_legs(&klegs, llegs);
                let msize = compute_log_size(&mlegs, &self.sizes);
                let score = local_score(ksize, lsize, msize);
                queue.push((OrderedFloat(-score), c));
                contractions.insert(c, (k, l, msize, mlegs));
                c -= 1;
            }
        }
        true
    }
}

/// Contract the pair of neighbouring tensors with the best local score until a
/// single tensor remains.
pub fn optimize_greedy(
    network: &TensorNetwork,
    options: &GreedyOptions,
) -> Result<ContractionPlan, OptimizeError> {
    if network.len() == 1 {
        let sequence = ContractionSequence::from_ssa_path(network, &[])?;
        return Ok(ContractionPlan::new(sequence, true));
    }
    let mut cp = ContractionProcessor::new(network, false);
    cp.optimize_greedy(options.costmod, options.temperature, options.seed);
    // connected networks always reduce to a single node
    debug_assert_eq!(cp.nodes.len(), 1);
    let sequence = ContractionSequence::from_ssa_path(network, &cp.ssa_path)?;
    let plan = ContractionPlan::new(sequence, true);
    debug!("greedy contraction: cpu={}, mem={}", plan.cpu, plan.mem);
    Ok(plan)
}

/// Run several greedy trials with sampled `costmod` and `temperature` and keep
/// the cheapest. Trials are abandoned as soon as they exceed the best cost
/// found so far.
pub fn optimize_random_greedy(
    network: &TensorNetwork,
    options: &RandomGreedyOptions,
) -> Result<ContractionPlan, OptimizeError> {
    if network.len() == 1 || options.ntrials == 0 {
        return optimize_greedy(network, &GreedyOptions::default());
    }

    let (costmod_min, costmod_max) = options.costmod;
    let costmod_diff = (costmod_max - costmod_min).abs();
    let is_const_costmod = costmod_diff < Score::EPSILON;

    let (temp_min, temp_max) = options.temperature;
    let log_temp_min = Score::ln(temp_min);
    let log_temp_max = Score::ln(temp_max);
    let log_temp_diff = (log_temp_max - log_temp_min).abs();
    let is_const_temp = log_temp_diff < Score::EPSILON;

    let mut rng = match options.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let seeds = (0..options.ntrials)
        .map(|_| rng.gen())
        .collect::<Vec<u64>>();

    let mut cp0 = ContractionProcessor::new(network, true);
    let mut best_path: Option<SSAPath> = None;
    let mut best_flops = Cost::MAX;

    for seed in seeds {
        let mut cp = cp0.clone();

        // uniform sample for costmod
        let costmod = if is_const_costmod {
            costmod_min
        } else {
            costmod_min + rng.gen::<f32>() * costmod_diff
        };

        // log-uniform sample for temperature
        let temperature = if is_const_temp {
            temp_min
        } else {
            f32::exp(log_temp_min + rng.gen::<f32>() * log_temp_diff)
        };

        if !cp.optimize_greedy(costmod, temperature, Some(seed)) {
            continue;
        }
        debug_assert_eq!(cp.nodes.len(), 1);

        if best_path.is_none() || cp.flops < best_flops {
            best_flops = cp.flops;
            best_path = Some(cp.ssa_path);
            cp0.flops_limit = best_flops;
        }
    }

    let Some(best_path) = best_path else {
        return optimize_greedy(network, &GreedyOptions::default());
    };
    let sequence = ContractionSequence::from_ssa_path(network, &best_path)?;
    let plan = ContractionPlan::new(sequence, true);
    info!(
        "random greedy over {} trials: cpu={}, mem={}",
        options.ntrials, plan.cpu, plan.mem
    );
    Ok(plan)
}
