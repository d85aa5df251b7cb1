use std::time::Duration;

use contractopt::{
    contract, have_common_legs, optimize_branchbound, optimize_greedy, optimize_optimal,
    optimize_random_greedy, transient_peak, ContractionSequence, Cost, Dim, GreedyOptions, Leg,
    OptimalOptions, OuterProducts, RandomGreedyOptions, SearchBudget, Tensor, TensorNetwork,
    ValidationError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random connected network: a spanning tree, a few extra bonds and some free
/// legs, with dimensions between 2 and 5.
fn random_network(n: usize, rng: &mut StdRng) -> TensorNetwork {
    let mut legs: Vec<Vec<Leg>> = vec![Vec::new(); n];
    let mut dims: Vec<Dim> = Vec::new();
    let new_leg = |dims: &mut Vec<Dim>, rng: &mut StdRng| {
        dims.push(rng.gen_range(2..=5));
        (dims.len() - 1) as Leg
    };
    for i in 1..n {
        let j = rng.gen_range(0..i);
        let leg = new_leg(&mut dims, rng);
        legs[i].push(leg);
        legs[j].push(leg);
    }
    for _ in 0..rng.gen_range(0..=n) {
        let i = rng.gen_range(0..n);
        let j = rng.gen_range(0..n);
        if i != j {
            let leg = new_leg(&mut dims, rng);
            legs[i].push(leg);
            legs[j].push(leg);
        }
    }
    for _ in 0..rng.gen_range(0..=2) {
        let i = rng.gen_range(0..n);
        let leg = new_leg(&mut dims, rng);
        legs[i].push(leg);
    }
    let tensors = legs
        .into_iter()
        .enumerate()
        .map(|(i, legs)| {
            let shape = legs.iter().map(|&l| dims[l as usize]).collect();
            Tensor::new(format!("T{i}"), legs, shape).unwrap()
        })
        .collect();
    TensorNetwork::new(tensors).unwrap()
}

/// Minimum `(total cost, memory peak)` over every contraction order, by plain
/// recursion.
fn brute_force(tensors: Vec<Tensor>, allow_outer: bool) -> (Cost, Cost) {
    if tensors.len() == 1 {
        return (0, 0);
    }
    let mut best = (Cost::MAX, Cost::MAX);
    for i in 0..tensors.len() {
        for j in (i + 1)..tensors.len() {
            if !allow_outer && !have_common_legs(&tensors[i], &tensors[j]) {
                continue;
            }
            let step = contract(&tensors[i], &tensors[j], None).unwrap();
            let peak = transient_peak(tensors[i].size(), tensors[j].size(), step.result.size());
            let mut rest: Vec<Tensor> = tensors
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != i && k != j)
                .map(|(_, t)| t.clone())
                .collect();
            rest.push(step.result);
            let (rest_cost, rest_peak) = brute_force(rest, allow_outer);
            best = best.min((step.cost + rest_cost, peak.max(rest_peak)));
        }
    }
    best
}

fn matrix_chain(dims: &[Dim]) -> TensorNetwork {
    let tensors = dims
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            Tensor::new(format!("M{i}"), vec![i as Leg, i as Leg + 1], w.to_vec()).unwrap()
        })
        .collect();
    TensorNetwork::new(tensors).unwrap()
}

/// Classic matrix chain order, O(n^3).
fn matrix_chain_cost(dims: &[Dim]) -> Cost {
    let n = dims.len() - 1;
    let mut m = vec![vec![0 as Cost; n]; n];
    for len in 2..=n {
        for i in 0..=(n - len) {
            let j = i + len - 1;
            m[i][j] = (i..j)
                .map(|k| {
                    m[i][k]
                        + m[k + 1][j]
                        + dims[i] as Cost * dims[k + 1] as Cost * dims[j + 1] as Cost
                })
                .min()
                .unwrap();
        }
    }
    m[0][n - 1]
}

fn with_dim(network: &TensorNetwork, leg: Leg, dim: Dim) -> TensorNetwork {
    let tensors = network
        .tensors()
        .iter()
        .map(|t| {
            let shape = t
                .legs()
                .iter()
                .zip(t.shape())
                .map(|(&l, &d)| if l == leg { dim } else { d })
                .collect();
            Tensor::new(t.name(), t.legs().to_vec(), shape).unwrap()
        })
        .collect();
    TensorNetwork::new(tensors).unwrap()
}

fn allow_outer() -> OptimalOptions {
    OptimalOptions {
        outer_products: OuterProducts::Allow,
        ..Default::default()
    }
}

#[test]
fn test_optimal_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(52);
    for _ in 0..40 {
        let n = rng.gen_range(2..=6);
        let tn = random_network(n, &mut rng);
        let plan = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        assert!(plan.complete);
        assert!(!plan.has_outer_product());
        assert_eq!(plan.sequence.len(), n - 1);
        assert_eq!(
            (plan.cpu, plan.mem),
            brute_force(tn.tensors().to_vec(), false)
        );
    }
}

#[test]
fn test_outer_products_never_hurt() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..25 {
        let n = rng.gen_range(2..=6);
        let tn = random_network(n, &mut rng);
        let avoid = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        let allow = optimize_optimal(&tn, &allow_outer()).unwrap();
        assert!(allow.complete);
        assert!(allow.cpu <= avoid.cpu);
        assert_eq!(allow.cpu, brute_force(tn.tensors().to_vec(), true).0);
    }
}

#[test]
fn test_branchbound_matches_optimal() {
    let mut rng = StdRng::seed_from_u64(1234);
    for _ in 0..25 {
        let n = rng.gen_range(2..=7);
        let tn = random_network(n, &mut rng);
        let optimal = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        let bb = optimize_branchbound(&tn, &SearchBudget::unlimited()).unwrap();
        assert!(bb.complete);
        assert_eq!((bb.cpu, bb.mem), (optimal.cpu, optimal.mem));
    }
}

#[test]
fn test_heuristics_bounded_by_optimum() {
    let mut rng = StdRng::seed_from_u64(99);
    for seed in 0..20 {
        let n = rng.gen_range(2..=8);
        let tn = random_network(n, &mut rng);
        let optimal = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        let greedy = optimize_greedy(&tn, &GreedyOptions::default()).unwrap();
        let random = optimize_random_greedy(
            &tn,
            &RandomGreedyOptions {
                ntrials: 8,
                seed: Some(seed),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(greedy.cpu >= optimal.cpu);
        assert!(random.cpu >= optimal.cpu);
        assert_eq!(greedy.sequence.len(), n - 1);
        assert_eq!(random.sequence.len(), n - 1);
    }
}

#[test]
fn test_larger_dimension_never_cheaper() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        let n = rng.gen_range(2..=6);
        let tn = random_network(n, &mut rng);
        let leg = tn.tensor(0).legs()[0];
        let dim = tn.leg_dim(leg).unwrap();
        let bigger = with_dim(&tn, leg, dim + 3);
        let before = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        let after = optimize_optimal(&bigger, &OptimalOptions::default()).unwrap();
        assert!(after.cpu >= before.cpu);
    }
}

#[test]
fn test_replay_leaves_free_legs() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let n = rng.gen_range(1..=6);
        let tn = if n == 1 {
            TensorNetwork::new(vec![Tensor::new("T0", vec![0, 1], vec![3, 4]).unwrap()]).unwrap()
        } else {
            random_network(n, &mut rng)
        };
        let plan = optimize_optimal(&tn, &OptimalOptions::default()).unwrap();
        let replayed = ContractionSequence::from_ssa_path(&tn, &plan.ssa_path()).unwrap();
        assert_eq!(replayed, plan.sequence);

        let mut legs = replayed.result().legs().to_vec();
        let mut free = tn.free_legs();
        legs.sort();
        free.sort();
        assert_eq!(legs, free);
        assert_eq!(replayed.result().size(), tn.free_size());
        assert_eq!(replayed.cpu_cost(), plan.cpu);
        assert_eq!(replayed.memory_bound(), plan.mem);
    }
}

#[test]
fn test_matrix_chain() {
    let dims = [30, 35, 15, 5, 10, 20, 25];
    let tn = matrix_chain(&dims);
    assert_eq!(matrix_chain_cost(&dims), 15125);
    assert_eq!(optimize_optimal(&tn, &OptimalOptions::default()).unwrap().cpu, 15125);
    assert_eq!(optimize_branchbound(&tn, &SearchBudget::unlimited()).unwrap().cpu, 15125);

    let dims = [10, 30, 5, 60];
    let plan = optimize_optimal(&matrix_chain(&dims), &OptimalOptions::default()).unwrap();
    assert_eq!(plan.cpu, 4500);
    // (M0 M1) M2
    assert_eq!(plan.ssa_path(), vec![vec![0, 1], vec![3, 2]]);

    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..10 {
        let len = rng.gen_range(3..=9);
        let dims: Vec<Dim> = (0..len).map(|_| rng.gen_range(2..=40)).collect();
        let plan = optimize_optimal(&matrix_chain(&dims), &OptimalOptions::default()).unwrap();
        assert_eq!(plan.cpu, matrix_chain_cost(&dims));
    }
}

#[test]
fn test_triangle() {
    let tn = TensorNetwork::new(vec![
        Tensor::new("A", vec![0, 1], vec![2, 3]).unwrap(),
        Tensor::new("B", vec![1, 2], vec![3, 4]).unwrap(),
        Tensor::new("C", vec![2, 0], vec![4, 2]).unwrap(),
    ])
    .unwrap();
    for plan in [
        optimize_optimal(&tn, &OptimalOptions::default()).unwrap(),
        optimize_optimal(&tn, &allow_outer()).unwrap(),
    ] {
        assert_eq!(plan.cpu, 30);
        assert_eq!(plan.cpu, brute_force(tn.tensors().to_vec(), true).0);
        assert_eq!(plan.mem, 26);
        assert_eq!(plan.sequence.len(), 2);
        assert!(plan.sequence.steps().iter().all(|s| !s.outer_product));
        assert_eq!(plan.sequence.result().size(), 1);
        assert_eq!(plan.sequence.result().name(), "[A-[B-C]]");
        assert_eq!(plan.linear_path().unwrap(), vec![vec![1, 2], vec![0, 1]]);
    }
    // same tree, operand order may differ
    let bb = optimize_branchbound(&tn, &SearchBudget::unlimited()).unwrap();
    assert_eq!((bb.cpu, bb.mem), (30, 26));
    assert_eq!(bb.sequence.steps()[0].contracted, vec![2]);
}

#[test]
fn test_time_budget_falls_back() {
    let mut rng = StdRng::seed_from_u64(21);
    let tn = random_network(8, &mut rng);
    let budget = SearchBudget {
        max_states: None,
        time_limit: Some(Duration::ZERO),
    };
    let options = OptimalOptions {
        budget: budget.clone(),
        ..Default::default()
    };
    let optimal = optimize_optimal(&tn, &options).unwrap();
    assert!(!optimal.complete);
    assert_eq!(optimal.sequence.len(), 7);
    let bb = optimize_branchbound(&tn, &budget).unwrap();
    assert!(!bb.complete);
    assert_eq!(bb.sequence.len(), 7);
}

#[test]
fn test_validation() {
    let t = |name: &str, legs: Vec<Leg>, shape: Vec<Dim>| Tensor::new(name, legs, shape).unwrap();

    assert_eq!(TensorNetwork::new(vec![]).unwrap_err(), ValidationError::EmptyNetwork);
    assert!(matches!(
        Tensor::new("A", vec![0, 1], vec![2]),
        Err(ValidationError::ShapeMismatch { legs: 2, shape: 1, .. })
    ));
    assert!(matches!(
        TensorNetwork::new(vec![t("A", vec![0, 0], vec![2, 2])]),
        Err(ValidationError::DuplicateLeg { leg: 0, .. })
    ));
    assert!(matches!(
        TensorNetwork::new(vec![t("A", vec![0], vec![1])]),
        Err(ValidationError::DegenerateLeg { leg: 0, dim: 1, .. })
    ));
    assert!(matches!(
        TensorNetwork::new(vec![t("A", vec![0], vec![2]), t("B", vec![0], vec![3])]),
        Err(ValidationError::LegDimensionMismatch { leg: 0, .. })
    ));
    assert!(matches!(
        TensorNetwork::new(vec![
            t("A", vec![0], vec![2]),
            t("B", vec![0], vec![2]),
            t("C", vec![0], vec![2]),
        ]),
        Err(ValidationError::InvalidLegMultiplicity { leg: 0, count: 3 })
    ));
    assert!(matches!(
        TensorNetwork::new(vec![t("A", vec![0], vec![2]), t("B", vec![1], vec![2])]),
        Err(ValidationError::DisconnectedNetwork { .. })
    ));
}
