//! Error types for network validation and contraction path optimization.

use thiserror::Error;

use crate::network::{Dim, Leg};

/// Structural problems found while building a [`TensorNetwork`](crate::TensorNetwork).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The network holds no tensors.
    #[error("tensor network contains no tensors")]
    EmptyNetwork,

    /// Leg and shape lists have different lengths.
    #[error("tensor `{tensor}` has {legs} legs but {shape} dimensions")]
    ShapeMismatch {
        tensor: String,
        legs: usize,
        shape: usize,
    },

    /// The same leg label appears twice on one tensor.
    #[error("leg {leg} appears more than once on tensor `{tensor}`")]
    DuplicateLeg { tensor: String, leg: Leg },

    /// A leg has dimension 0 or 1.
    #[error("leg {leg} of tensor `{tensor}` has degenerate dimension {dim}")]
    DegenerateLeg { tensor: String, leg: Leg, dim: Dim },

    /// The two tensors sharing a leg disagree on its dimension.
    #[error("leg {leg} has dimension {first} on one tensor and {second} on another")]
    LegDimensionMismatch { leg: Leg, first: Dim, second: Dim },

    /// A leg is shared by more than two tensors.
    #[error("leg {leg} appears on {count} tensors, expected 1 or 2")]
    InvalidLegMultiplicity { leg: Leg, count: usize },

    /// Some tensor cannot be reached from the first one through shared legs.
    #[error("tensor `{tensor}` is not connected to the rest of the network")]
    DisconnectedNetwork { tensor: String },
}

/// An explicit leg set named legs that are missing on one of the operands.
///
/// Leg sets handed to [`contract`](crate::contract) by the search
/// engines always come from the operands themselves, so this signals misuse of
/// the cost model rather than bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("legs {legs:?} are not present on both `{lhs}` and `{rhs}`")]
pub struct InvalidLegSetError {
    pub lhs: String,
    pub rhs: String,
    pub legs: Vec<Leg>,
}

/// Failures of the path optimizers and of path replay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// The subset search keys states by a 64 bit mask.
    #[error("optimal search supports at most {max} tensors, got {count}")]
    TooManyTensors { count: usize, max: usize },

    /// An SSA path refers to tensors that do not exist or were already consumed.
    #[error("invalid contraction path at step {step}: {reason}")]
    InvalidPath { step: usize, reason: String },

    #[error(transparent)]
    InvalidLegSet(#[from] InvalidLegSetError),
}
