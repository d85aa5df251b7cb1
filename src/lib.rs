//! Contraction order optimization for tensor networks.
//!
//! A [`TensorNetwork`] is a validated set of named tensors whose legs are
//! either shared by exactly two tensors (and summed over) or free. The
//! optimizers choose the order of pairwise contractions:
//!
//! - [`optimize_optimal`] runs an exact dynamic program over subsets of
//!   tensors, level by level in parallel.
//! - [`optimize_branchbound`] is an exact depth-first search seeded with the
//!   greedy plan.
//! - [`optimize_greedy`] and [`optimize_random_greedy`] are fast heuristics.
//!
//! All of them return a [`ContractionPlan`] holding the replayed
//! [`ContractionSequence`] with its total cost and memory bound.

mod branchbound;
mod connectivity;
mod cost;
mod error;
mod greedy;
mod network;
mod optimal;
mod processor;
#[cfg(feature = "python")]
mod python;
mod sequence;

pub use branchbound::{optimize_branchbound, BranchBound};
pub use connectivity::{subset_members, Connectivity, Subset, MAX_TENSORS};
pub use cost::{common_legs, contract, have_common_legs, transient_peak, Contraction};
pub use error::{InvalidLegSetError, OptimizeError, ValidationError};
pub use greedy::{optimize_greedy, optimize_random_greedy, GreedyOptions, RandomGreedyOptions};
pub use network::{Cost, Dim, Leg, Tensor, TensorNetwork};
pub use optimal::{optimize_optimal, OptimalOptions, OuterProducts, SearchBudget};
pub use sequence::{
    ssa_to_linear, ContractionPlan, ContractionSequence, ContractionStep, SSAPath,
};
