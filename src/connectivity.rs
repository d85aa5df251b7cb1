//! Connectivity of sub-networks, answered with bitmask traversals.

use crate::error::OptimizeError;
use crate::network::TensorNetwork;

/// A selection of original tensors, bit `i` standing for tensor `i`.
pub type Subset = u64;

/// Largest network a [`Subset`] can describe.
pub const MAX_TENSORS: usize = Subset::BITS as usize;

pub(crate) fn single_el_subset(i: usize) -> Subset {
    1 << i
}

/// Tensor indices contained in `subset`, ascending.
pub fn subset_members(subset: Subset) -> impl Iterator<Item = usize> {
    let mut rest = subset;
    std::iter::from_fn(move || {
        if rest == 0 {
            return None;
        }
        let i = rest.trailing_zeros() as usize;
        rest &= rest - 1;
        Some(i)
    })
}

/// Precomputed per-tensor adjacency bitmasks.
#[derive(Debug, Clone)]
pub struct Connectivity {
    adjacency: Vec<Subset>,
}

impl Connectivity {
    pub fn new(network: &TensorNetwork) -> Result<Self, OptimizeError> {
        let n = network.len();
        if n > MAX_TENSORS {
            return Err(OptimizeError::TooManyTensors {
                count: n,
                max: MAX_TENSORS,
            });
        }
        let adjacency = (0..n)
            .map(|i| {
                network
                    .neighbors(i)
                    .into_iter()
                    .fold(0, |mask, j| mask | single_el_subset(j))
            })
            .collect();
        Ok(Self { adjacency })
    }

    /// Number of tensors covered.
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// The full set of tensors.
    pub fn all(&self) -> Subset {
        match self.adjacency.len() {
            MAX_TENSORS => Subset::MAX,
            n => (1 << n) - 1,
        }
    }

    /// Whether the tensors in `subset`, joined only by legs running between
    /// members, form a single component. The empty subset is not connected.
    pub fn is_connected(&self, subset: Subset) -> bool {
        if subset == 0 {
            return false;
        }
        let start = subset & subset.wrapping_neg();
        let mut visited = start;
        let mut frontier = start;
        while frontier != 0 {
            let i = frontier.trailing_zeros() as usize;
            frontier &= frontier - 1;
            let reached = self.adjacency[i] & subset & !visited;
            visited |= reached;
            frontier |= reached;
        }
        visited == subset
    }

    /// Tensors outside `subset` sharing a leg with one of its members.
    pub fn neighborhood(&self, subset: Subset) -> Subset {
        subset_members(subset).fold(0, |mask, i| mask | self.adjacency[i]) & !subset
    }

    /// Whether some leg runs between `s1` and `s2`.
    pub fn shares_leg(&self, s1: Subset, s2: Subset) -> bool {
        self.neighborhood(s1) & s2 != 0
    }
}
