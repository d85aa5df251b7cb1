//! Contraction sequences: the replayable output of every optimizer.
//!
//! Tensors are addressed in "static single assignment" style: the original
//! tensors are `0..n`, and the result of step `k` gets id `n + k`. An SSA path
//! is the list of id pairs contracted at each step.

use log::warn;

use crate::cost::{contract, transient_peak};
use crate::error::OptimizeError;
use crate::network::{Cost, Leg, Tensor, TensorNetwork};

pub type SSAPath = Vec<Vec<usize>>;

/// One pairwise contraction of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractionStep {
    pub lhs: String,
    pub rhs: String,
    pub lhs_ssa: usize,
    pub rhs_ssa: usize,
    pub result_ssa: usize,
    /// Legs summed over, empty for an outer product.
    pub contracted: Vec<Leg>,
    pub result: Tensor,
    pub cost: Cost,
    /// Both operands plus the result.
    pub peak: Cost,
    /// The operands share no leg.
    pub outer_product: bool,
}

/// An ordered list of pairwise contractions reducing a network to one tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractionSequence {
    steps: Vec<ContractionStep>,
    result: Tensor,
}

impl ContractionSequence {
    /// Replay `ssa_path` on `network` with the pairwise cost model.
    ///
    /// Every step must name two distinct live tensors, and exactly one tensor
    /// must remain at the end.
    pub fn from_ssa_path(
        network: &TensorNetwork,
        ssa_path: &[Vec<usize>],
    ) -> Result<Self, OptimizeError> {
        let n = network.len();
        let mut slots: Vec<Option<Tensor>> =
            network.tensors().iter().cloned().map(Some).collect();
        let mut steps = Vec::with_capacity(ssa_path.len());

        for (step, con) in ssa_path.iter().enumerate() {
            let (i, j) = match con.as_slice() {
                &[i, j] if i != j => (i, j),
                _ => {
                    return Err(OptimizeError::InvalidPath {
                        step,
                        reason: format!("expected two distinct tensor ids, got {con:?}"),
                    })
                }
            };
            let mut take = |k: usize| {
                slots
                    .get_mut(k)
                    .and_then(Option::take)
                    .ok_or_else(|| OptimizeError::InvalidPath {
                        step,
                        reason: format!("tensor {k} does not exist or was already contracted"),
                    })
            };
            let a = take(i)?;
            let b = take(j)?;
            let contraction = contract(&a, &b, None)?;
            let peak = transient_peak(a.size(), b.size(), contraction.result.size());
            steps.push(ContractionStep {
                outer_product: contraction.is_outer_product(),
                lhs: a.name().to_string(),
                rhs: b.name().to_string(),
                lhs_ssa: i,
                rhs_ssa: j,
                result_ssa: n + step,
                contracted: contraction.contracted,
                result: contraction.result.clone(),
                cost: contraction.cost,
                peak,
            });
            slots.push(Some(contraction.result));
        }

        let mut remaining = slots.into_iter().flatten();
        match (remaining.next(), remaining.next()) {
            (Some(result), None) => Ok(Self { steps, result }),
            _ => Err(OptimizeError::InvalidPath {
                step: ssa_path.len(),
                reason: "path does not reduce the network to a single tensor".to_string(),
            }),
        }
    }

    pub fn steps(&self) -> &[ContractionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The single tensor left after all steps.
    pub fn result(&self) -> &Tensor {
        &self.result
    }

    /// Sum of all step costs.
    pub fn cpu_cost(&self) -> Cost {
        self.steps
            .iter()
            .fold(0, |acc: Cost, s| acc.saturating_add(s.cost))
    }

    /// Largest transient footprint of any step. Without steps this is the
    /// size of the lone tensor.
    pub fn memory_bound(&self) -> Cost {
        self.steps
            .iter()
            .map(|s| s.peak)
            .max()
            .unwrap_or_else(|| self.result.size())
    }

    pub fn has_outer_product(&self) -> bool {
        self.steps.iter().any(|s| s.outer_product)
    }

    pub fn to_ssa_path(&self) -> SSAPath {
        self.steps
            .iter()
            .map(|s| vec![s.lhs_ssa, s.rhs_ssa])
            .collect()
    }

    /// The path in the "linear" format where contracted tensors are removed
    /// from a list and the result appended at the end.
    pub fn to_linear_path(&self) -> Result<SSAPath, OptimizeError> {
        ssa_to_linear(self.to_ssa_path(), Some(self.steps.len() + 1))
    }
}

/// Convert an SSA path into the linear format, `n` being the number of
/// original tensors (inferred from the path if not given).
///
/// Every step must name two distinct ids that are still alive at that point.
pub fn ssa_to_linear(ssa_path: SSAPath, n: Option<usize>) -> Result<SSAPath, OptimizeError> {
    for (step, con) in ssa_path.iter().enumerate() {
        if !matches!(con.as_slice(), &[i, j] if i != j) {
            return Err(OptimizeError::InvalidPath {
                step,
                reason: format!("expected two distinct tensor ids, got {con:?}"),
            });
        }
    }
    // each pairwise step removes exactly one tensor
    let n = n.unwrap_or(ssa_path.len() + 1);
    let mut ids: Vec<usize> = (0..n).collect();
    let mut path: SSAPath = Vec::with_capacity(ssa_path.len());
    for (step, scon) in ssa_path.into_iter().enumerate() {
        // find the locations of the ssa ids in the list of ids
        let mut con = scon
            .iter()
            .map(|&s| {
                ids.binary_search(&s)
                    .map_err(|_| OptimizeError::InvalidPath {
                        step,
                        reason: format!("tensor {s} does not exist or was already contracted"),
                    })
            })
            .collect::<Result<Vec<usize>, _>>()?;
        // remove the ssa ids from the list
        con.sort();
        for j in con.iter().rev() {
            ids.remove(*j);
        }
        path.push(con);
        ids.push(n + step);
    }
    Ok(path)
}

/// A contraction sequence together with its cost figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractionPlan {
    pub sequence: ContractionSequence,
    /// Total arithmetic cost.
    pub cpu: Cost,
    /// Memory upper bound under the transient-peak convention.
    pub mem: Cost,
    /// False when a search budget stopped the optimizer early.
    pub complete: bool,
}

impl ContractionPlan {
    pub fn new(sequence: ContractionSequence, complete: bool) -> Self {
        if sequence.has_outer_product() {
            warn!(
                "contraction sequence of {} steps contains an outer product",
                sequence.len()
            );
        }
        Self {
            cpu: sequence.cpu_cost(),
            mem: sequence.memory_bound(),
            sequence,
            complete,
        }
    }

    pub fn has_outer_product(&self) -> bool {
        self.sequence.has_outer_product()
    }

    pub fn ssa_path(&self) -> SSAPath {
        self.sequence.to_ssa_path()
    }

    pub fn linear_path(&self) -> Result<SSAPath, OptimizeError> {
        self.sequence.to_linear_path()
    }
}
