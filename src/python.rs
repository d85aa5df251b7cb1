//! Python bindings, built with the `python` feature.
//!
//! Networks are passed as three parallel lists of tensor names, leg labels
//! and shapes. Every optimizer returns `(path, cpu, mem)`, the path in linear
//! format unless `use_ssa` is set.

use std::time::Duration;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::greedy::{GreedyOptions, RandomGreedyOptions};
use crate::network::{Cost, Dim, Leg, Tensor, TensorNetwork};
use crate::optimal::{OptimalOptions, OuterProducts, SearchBudget};
use crate::sequence::{ContractionPlan, SSAPath};

type PlanResult = (SSAPath, Cost, Cost);

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn build_network(
    names: Vec<String>,
    legs: Vec<Vec<Leg>>,
    shapes: Vec<Vec<Dim>>,
) -> PyResult<TensorNetwork> {
    if names.len() != legs.len() || names.len() != shapes.len() {
        return Err(PyValueError::new_err(
            "names, legs and shapes must have the same length",
        ));
    }
    let tensors = names
        .into_iter()
        .zip(legs)
        .zip(shapes)
        .map(|((name, legs), shape)| Tensor::new(name, legs, shape))
        .collect::<Result<Vec<_>, _>>()
        .map_err(value_error)?;
    TensorNetwork::new(tensors).map_err(value_error)
}

fn budget(max_states: Option<usize>, time_limit: Option<f64>) -> SearchBudget {
    SearchBudget {
        max_states,
        time_limit: time_limit.map(Duration::from_secs_f64),
    }
}

fn plan_result(plan: ContractionPlan, use_ssa: bool) -> PyResult<PlanResult> {
    let path = if use_ssa {
        plan.ssa_path()
    } else {
        plan.linear_path().map_err(value_error)?
    };
    Ok((path, plan.cpu, plan.mem))
}

#[pyfunction]
#[pyo3(signature = (ssa_path, n=None))]
fn ssa_to_linear(ssa_path: SSAPath, n: Option<usize>) -> PyResult<SSAPath> {
    crate::sequence::ssa_to_linear(ssa_path, n).map_err(value_error)
}

#[pyfunction]
#[pyo3(signature = (names, legs, shapes, allow_outer=false, max_states=None, time_limit=None, use_ssa=false))]
#[allow(clippy::too_many_arguments)]
fn optimize_optimal(
    py: Python,
    names: Vec<String>,
    legs: Vec<Vec<Leg>>,
    shapes: Vec<Vec<Dim>>,
    allow_outer: bool,
    max_states: Option<usize>,
    time_limit: Option<f64>,
    use_ssa: bool,
) -> PyResult<PlanResult> {
    let network = build_network(names, legs, shapes)?;
    let options = OptimalOptions {
        outer_products: if allow_outer {
            OuterProducts::Allow
        } else {
            OuterProducts::Avoid
        },
        budget: budget(max_states, time_limit),
    };
    let plan = py
        .allow_threads(|| crate::optimal::optimize_optimal(&network, &options))
        .map_err(value_error)?;
    plan_result(plan, use_ssa)
}

#[pyfunction]
#[pyo3(signature = (names, legs, shapes, max_states=None, time_limit=None, use_ssa=false))]
fn optimize_branchbound(
    py: Python,
    names: Vec<String>,
    legs: Vec<Vec<Leg>>,
    shapes: Vec<Vec<Dim>>,
    max_states: Option<usize>,
    time_limit: Option<f64>,
    use_ssa: bool,
) -> PyResult<PlanResult> {
    let network = build_network(names, legs, shapes)?;
    let budget = budget(max_states, time_limit);
    let plan = py
        .allow_threads(|| crate::branchbound::optimize_branchbound(&network, &budget))
        .map_err(value_error)?;
    plan_result(plan, use_ssa)
}

#[pyfunction]
#[pyo3(signature = (names, legs, shapes, costmod=1.0, temperature=0.0, seed=None, use_ssa=false))]
#[allow(clippy::too_many_arguments)]
fn optimize_greedy(
    py: Python,
    names: Vec<String>,
    legs: Vec<Vec<Leg>>,
    shapes: Vec<Vec<Dim>>,
    costmod: f32,
    temperature: f32,
    seed: Option<u64>,
    use_ssa: bool,
) -> PyResult<PlanResult> {
    let network = build_network(names, legs, shapes)?;
    let options = GreedyOptions {
        costmod,
        temperature,
        seed,
    };
    let plan = py
        .allow_threads(|| crate::greedy::optimize_greedy(&network, &options))
        .map_err(value_error)?;
    plan_result(plan, use_ssa)
}

#[pyfunction]
#[pyo3(signature = (names, legs, shapes, ntrials, costmod=None, temperature=None, seed=None, use_ssa=false))]
#[allow(clippy::too_many_arguments)]
fn optimize_random_greedy(
    py: Python,
    names: Vec<String>,
    legs: Vec<Vec<Leg>>,
    shapes: Vec<Vec<Dim>>,
    ntrials: usize,
    costmod: Option<(f32, f32)>,
    temperature: Option<(f32, f32)>,
    seed: Option<u64>,
    use_ssa: bool,
) -> PyResult<PlanResult> {
    let network = build_network(names, legs, shapes)?;
    let defaults = RandomGreedyOptions::default();
    let options = RandomGreedyOptions {
        ntrials,
        costmod: costmod.unwrap_or(defaults.costmod),
        temperature: temperature.unwrap_or(defaults.temperature),
        seed,
    };
    let plan = py
        .allow_threads(|| crate::greedy::optimize_random_greedy(&network, &options))
        .map_err(value_error)?;
    plan_result(plan, use_ssa)
}

/// Contraction order optimizers for tensor networks.
#[pymodule]
fn contractopt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ssa_to_linear, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_optimal, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_branchbound, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_greedy, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_random_greedy, m)?)?;
    Ok(())
}
