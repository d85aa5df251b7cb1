//! Immutable tensor network description.
//!
//! Leg labels are arbitrary integers chosen by the caller. Internally every
//! label is mapped to a dense index (`Ix`) so that the searches can look up
//! dimensions and adjacency with plain vector indexing.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ValidationError;

use FxHashMap as Dict;

/// A leg label.
pub type Leg = i32;
/// The dimension of a single leg.
pub type Dim = u64;
/// Element counts and arithmetic costs, saturating at `u128::MAX`.
pub type Cost = u128;

/// dense leg index used by the searches
pub(crate) type Ix = u32;

/// Product of dimensions, saturating instead of overflowing.
pub(crate) fn saturating_product<I: IntoIterator<Item = Dim>>(dims: I) -> Cost {
    dims.into_iter()
        .fold(1, |acc: Cost, d| acc.saturating_mul(d as Cost))
}

/// A named tensor with ordered legs and matching dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tensor {
    name: String,
    legs: Vec<Leg>,
    shape: Vec<Dim>,
}

impl Tensor {
    /// Build a tensor, checking only that legs and shape line up.
    pub fn new(
        name: impl Into<String>,
        legs: Vec<Leg>,
        shape: Vec<Dim>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if legs.len() != shape.len() {
            return Err(ValidationError::ShapeMismatch {
                tensor: name,
                legs: legs.len(),
                shape: shape.len(),
            });
        }
        Ok(Self { name, legs, shape })
    }

    /// Used by the cost model, which builds legs and shape in lockstep.
    pub(crate) fn from_parts(name: String, legs: Vec<Leg>, shape: Vec<Dim>) -> Self {
        debug_assert_eq!(legs.len(), shape.len());
        Self { name, legs, shape }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn shape(&self) -> &[Dim] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.legs.len()
    }

    /// Number of elements, the product of all dimensions.
    pub fn size(&self) -> Cost {
        saturating_product(self.shape.iter().copied())
    }

    /// Dimension of `leg` on this tensor, if present.
    pub fn dim_of(&self, leg: Leg) -> Option<Dim> {
        self.legs
            .iter()
            .position(|&l| l == leg)
            .map(|p| self.shape[p])
    }

    pub fn has_leg(&self, leg: Leg) -> bool {
        self.legs.contains(&leg)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A validated, connected network of tensors whose legs are shared by at most
/// two tensors.
#[derive(Debug, Clone)]
pub struct TensorNetwork {
    tensors: Vec<Tensor>,
    indmap: Dict<Leg, Ix>,
    labels: Vec<Leg>,
    sizes: Vec<Dim>,
    edges: Vec<Vec<usize>>,
    terms: Vec<Vec<Ix>>,
}

impl TensorNetwork {
    /// Validate `tensors` and build the leg adjacency.
    ///
    /// Rejects empty networks, repeated legs within a tensor, legs of
    /// dimension 1 or less, legs whose dimension differs between the two
    /// tensors sharing it, legs shared by more than two tensors, and networks
    /// that fall apart into several components.
    pub fn new(tensors: Vec<Tensor>) -> Result<Self, ValidationError> {
        if tensors.is_empty() {
            return Err(ValidationError::EmptyNetwork);
        }

        let mut indmap: Dict<Leg, Ix> = Dict::default();
        let mut labels: Vec<Leg> = Vec::new();
        let mut sizes: Vec<Dim> = Vec::new();
        let mut edges: Vec<Vec<usize>> = Vec::new();
        let mut terms: Vec<Vec<Ix>> = Vec::with_capacity(tensors.len());

        for (i, tensor) in tensors.iter().enumerate() {
            let mut seen: FxHashSet<Leg> = FxHashSet::default();
            let mut term = Vec::with_capacity(tensor.ndim());
            for (&leg, &dim) in tensor.legs.iter().zip(tensor.shape.iter()) {
                if !seen.insert(leg) {
                    return Err(ValidationError::DuplicateLeg {
                        tensor: tensor.name.clone(),
                        leg,
                    });
                }
                if dim <= 1 {
                    return Err(ValidationError::DegenerateLeg {
                        tensor: tensor.name.clone(),
                        leg,
                        dim,
                    });
                }
                let ix = match indmap.get(&leg) {
                    None => {
                        // leg not seen yet
                        let ix = labels.len() as Ix;
                        indmap.insert(leg, ix);
                        labels.push(leg);
                        sizes.push(dim);
                        edges.push(vec![i]);
                        ix
                    }
                    Some(&ix) => {
                        let first = sizes[ix as usize];
                        if first != dim {
                            return Err(ValidationError::LegDimensionMismatch {
                                leg,
                                first,
                                second: dim,
                            });
                        }
                        edges[ix as usize].push(i);
                        ix
                    }
                };
                term.push(ix);
            }
            terms.push(term);
        }

        for (ix, nodes) in edges.iter().enumerate() {
            if nodes.len() > 2 {
                return Err(ValidationError::InvalidLegMultiplicity {
                    leg: labels[ix],
                    count: nodes.len(),
                });
            }
        }

        let network = Self {
            tensors,
            indmap,
            labels,
            sizes,
            edges,
            terms,
        };

        let reached = network.component_of(0);
        if let Some(i) = (0..network.len()).find(|i| !reached.contains(i)) {
            return Err(ValidationError::DisconnectedNetwork {
                tensor: network.tensors[i].name.clone(),
            });
        }
        Ok(network)
    }

    /// all tensors reachable from `start` through shared legs
    fn component_of(&self, start: usize) -> BTreeSet<usize> {
        let mut group: BTreeSet<usize> = std::iter::once(start).collect();
        let mut queue: Vec<usize> = vec![start];
        while let Some(i) = queue.pop() {
            for j in self.neighbors(i) {
                if group.insert(j) {
                    queue.push(j);
                }
            }
        }
        group
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Always false for a validated network; provided for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn tensor(&self, i: usize) -> &Tensor {
        &self.tensors[i]
    }

    /// Element count of tensor `i`.
    pub fn element_count(&self, i: usize) -> Cost {
        self.tensors[i].size()
    }

    pub fn leg_dim(&self, leg: Leg) -> Option<Dim> {
        self.indmap.get(&leg).map(|&ix| self.sizes[ix as usize])
    }

    /// Indices of the tensors carrying `leg`, empty if the leg is unknown.
    pub fn tensors_with_leg(&self, leg: Leg) -> &[usize] {
        match self.indmap.get(&leg) {
            Some(&ix) => &self.edges[ix as usize],
            None => &[],
        }
    }

    /// Tensors sharing at least one leg with tensor `i`, sorted.
    pub fn neighbors(&self, i: usize) -> Vec<usize> {
        let js: BTreeSet<usize> = self.terms[i]
            .iter()
            .flat_map(|&ix| self.edges[ix as usize].iter().copied())
            .filter(|&j| j != i)
            .collect();
        js.into_iter().collect()
    }

    /// Legs carried by exactly one tensor, in order of first appearance.
    pub fn free_legs(&self) -> Vec<Leg> {
        self.terms
            .iter()
            .flatten()
            .filter(|&&ix| self.edges[ix as usize].len() == 1)
            .map(|&ix| self.labels[ix as usize])
            .collect()
    }

    /// Element count of the fully contracted network.
    pub fn free_size(&self) -> Cost {
        saturating_product(
            self.free_legs()
                .into_iter()
                .filter_map(|leg| self.leg_dim(leg)),
        )
    }

    pub(crate) fn term(&self, i: usize) -> &[Ix] {
        &self.terms[i]
    }

    pub(crate) fn sizes(&self) -> &[Dim] {
        &self.sizes
    }

    pub(crate) fn num_legs(&self) -> usize {
        self.labels.len()
    }
}
