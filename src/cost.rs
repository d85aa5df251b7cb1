//! Pairwise cost model.
//!
//! Contracting `A` with `B` over a leg set `L` produces a tensor carrying the
//! legs of `A` outside `L` followed by the legs of `B` outside `L`. Every
//! element of `A` is combined with every element of `B` over its legs outside
//! `L`, so the arithmetic cost is `size(A) * prod(dim(l) for l in B \ L)`.
//! Contracted dimensions are counted once, through the size of `A`. The cost
//! is symmetric whenever `L` holds all common legs.
//!
//! Memory follows a single convention throughout the crate: while a step runs
//! both operands and the freshly produced result are alive, immediately after
//! it only the result is.

use crate::error::InvalidLegSetError;
use crate::network::{saturating_product, Cost, Dim, Ix, Leg, Tensor};

/// Outcome of one pairwise contraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contraction {
    pub result: Tensor,
    /// Legs summed over, in the order of the first operand.
    pub contracted: Vec<Leg>,
    pub cost: Cost,
}

impl Contraction {
    /// No leg was summed over.
    pub fn is_outer_product(&self) -> bool {
        self.contracted.is_empty()
    }
}

/// Legs present on both `a` and `b`, in the order of `a`.
pub fn common_legs(a: &Tensor, b: &Tensor) -> Vec<Leg> {
    a.legs()
        .iter()
        .copied()
        .filter(|&l| b.has_leg(l))
        .collect()
}

pub fn have_common_legs(a: &Tensor, b: &Tensor) -> bool {
    a.legs().iter().any(|&l| b.has_leg(l))
}

/// Name given to the result of contracting `lhs` with `rhs`.
pub(crate) fn contracted_name(lhs: &str, rhs: &str) -> String {
    format!("[{lhs}-{rhs}]")
}

/// Contract `a` with `b`.
///
/// With `legs = None` all common legs are summed over. An explicit leg set
/// must only name legs carried by both operands; repeated labels count once.
/// An empty leg set yields an outer product, which is computed like any other
/// contraction.
pub fn contract(
    a: &Tensor,
    b: &Tensor,
    legs: Option<&[Leg]>,
) -> Result<Contraction, InvalidLegSetError> {
    let contracted: Vec<Leg> = match legs {
        None => common_legs(a, b),
        Some(legs) => {
            let missing: Vec<Leg> = legs
                .iter()
                .copied()
                .filter(|&l| !a.has_leg(l) || !b.has_leg(l))
                .collect();
            if !missing.is_empty() {
                return Err(InvalidLegSetError {
                    lhs: a.name().to_string(),
                    rhs: b.name().to_string(),
                    legs: missing,
                });
            }
            // keep the order of `a`, dropping duplicates
            a.legs()
                .iter()
                .copied()
                .filter(|l| legs.contains(l))
                .collect()
        }
    };

    let mut new_legs = Vec::with_capacity(a.ndim() + b.ndim());
    let mut new_shape = Vec::with_capacity(a.ndim() + b.ndim());
    for (&l, &d) in a.legs().iter().zip(a.shape()) {
        if !contracted.contains(&l) {
            new_legs.push(l);
            new_shape.push(d);
        }
    }
    // every element of `a` meets every free element of `b`
    let mut cost = a.size();
    for (&l, &d) in b.legs().iter().zip(b.shape()) {
        if !contracted.contains(&l) {
            new_legs.push(l);
            new_shape.push(d);
            cost = cost.saturating_mul(d as Cost);
        }
    }

    let name = contracted_name(a.name(), b.name());
    Ok(Contraction {
        result: Tensor::from_parts(name, new_legs, new_shape),
        contracted,
        cost,
    })
}

/// Transient memory of a step: both operands plus the result.
pub fn transient_peak(lhs_size: Cost, rhs_size: Cost, result_size: Cost) -> Cost {
    lhs_size
        .saturating_add(rhs_size)
        .saturating_add(result_size)
}

/// Cost and size of contracting two intermediates given by dense leg indices,
/// summing over all of their common legs. Nothing is allocated, which keeps
/// candidate evaluation in the searches cheap.
///
/// Returns `(step cost, result size, whether any leg is shared)`.
pub(crate) fn pair_cost(
    ilegs: &[Ix],
    isize: Cost,
    jlegs: &[Ix],
    sizes: &[Dim],
) -> (Cost, Cost, bool) {
    let mut jfree: Cost = 1;
    let mut any_shared = false;
    for jx in jlegs {
        if ilegs.contains(jx) {
            any_shared = true;
        } else {
            jfree = jfree.saturating_mul(sizes[*jx as usize] as Cost);
        }
    }
    let ifree = if any_shared {
        saturating_product(
            ilegs
                .iter()
                .filter(|&&ix| !jlegs.contains(&ix))
                .map(|&ix| sizes[ix as usize]),
        )
    } else {
        isize
    };
    (isize.saturating_mul(jfree), ifree.saturating_mul(jfree), any_shared)
}

/// Legs of the result of contracting `ilegs` with `jlegs` over all common legs.
pub(crate) fn compute_legs(ilegs: &[Ix], jlegs: &[Ix]) -> Vec<Ix> {
    let mut new_legs = Vec::with_capacity(ilegs.len() + jlegs.len());
    new_legs.extend(ilegs.iter().filter(|&&ix| !jlegs.contains(&ix)));
    new_legs.extend(jlegs.iter().filter(|&&ix| !ilegs.contains(&ix)));
    new_legs
}

pub(crate) fn compute_size(legs: &[Ix], sizes: &[Dim]) -> Cost {
    saturating_product(legs.iter().map(|&ix| sizes[ix as usize]))
}

/// natural log of the size, used for heuristic scores
pub(crate) fn compute_log_size(legs: &[Ix], sizes: &[Dim]) -> f32 {
    legs.iter().map(|&ix| f32::ln(sizes[ix as usize] as f32)).sum()
}
