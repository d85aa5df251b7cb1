use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::cost::{compute_size, pair_cost};
use crate::network::{Cost, Dim, Ix, TensorNetwork};
use crate::sequence::SSAPath;

use FxHashMap as Dict;

pub(crate) type Node = usize;
pub(crate) type Legs = Vec<Ix>;

/// helper struct to build contractions from bottom up
#[derive(Clone)]
pub(crate) struct ContractionProcessor {
    pub(crate) nodes: Dict<Node, Legs>,
    pub(crate) edges: Dict<Ix, BTreeSet<Node>>,
    pub(crate) sizes: Vec<Dim>,
    ssa: Node,
    pub(crate) ssa_path: SSAPath,
    pub(crate) track_flops: bool,
    pub(crate) flops: Cost,
    pub(crate) flops_limit: Cost,
}

impl ContractionProcessor {
    pub(crate) fn new(network: &TensorNetwork, track_flops: bool) -> ContractionProcessor {
        let mut nodes: Dict<Node, Legs> = Dict::default();
        let mut edges: Dict<Ix, BTreeSet<Node>> = Dict::default();
        for i in 0..network.len() {
            let legs: Legs = network.term(i).to_vec();
            for &ix in &legs {
                edges.entry(ix).or_default().insert(i);
            }
            nodes.insert(i, legs);
        }
        let ssa = network.len();
        ContractionProcessor {
            nodes,
            edges,
            sizes: network.sizes().to_vec(),
            ssa,
            ssa_path: Vec::with_capacity(ssa.saturating_sub(1)),
            track_flops,
            flops: 0,
            flops_limit: Cost::MAX,
        }
    }

    pub(crate) fn neighbors(&self, i: Node) -> BTreeSet<Node> {
        let mut js = BTreeSet::default();
        for ix in self.nodes[&i].iter() {
            self.edges[ix].iter().for_each(|&j| {
                if j != i {
                    js.insert(j);
                };
            });
        }
        js
    }

    /// remove a node from the graph, update the edgemap, return the legs
    fn pop_node(&mut self, i: Node) -> Legs {
        let legs = self.nodes.remove(&i).unwrap_or_default();
        for ix in legs.iter() {
            let enodes = match self.edges.get_mut(ix) {
                Some(enodes) => enodes,
                None => continue,
            };
            enodes.remove(&i);
            if enodes.is_empty() {
                // last node with this index -> remove from map
                self.edges.remove(ix);
            }
        }
        legs
    }

    /// add a new node to the graph, update the edgemap, return the new id
    fn add_node(&mut self, legs: Legs) -> Node {
        let i = self.ssa;
        self.ssa += 1;
        for ix in &legs {
            self.edges.entry(*ix).or_default().insert(i);
        }
        self.nodes.insert(i, legs);
        i
    }

    /// contract two nodes (which we already know the legs for), return the new node id
    pub(crate) fn contract_nodes_given_legs(&mut self, i: Node, j: Node, new_legs: Legs) -> Node {
        let ilegs = self.pop_node(i);
        let jlegs = self.pop_node(j);
        if self.track_flops {
            let isize = compute_size(&ilegs, &self.sizes);
            let (cost, _, _) = pair_cost(&ilegs, isize, &jlegs, &self.sizes);
            self.flops = self.flops.saturating_add(cost);
        }
        let k = self.add_node(new_legs);
        self.ssa_path.push(vec![i, j]);
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::compute_legs;
    use crate::network::Tensor;

    fn setup() -> TensorNetwork {
        TensorNetwork::new(vec![
            Tensor::new("A", vec![0, 1], vec![2, 3]).unwrap(),
            Tensor::new("B", vec![1, 2], vec![3, 4]).unwrap(),
            Tensor::new("C", vec![2, 0], vec![4, 2]).unwrap(),
        ])
        .unwrap()
    }

    fn contract(cp: &mut ContractionProcessor, i: Node, j: Node) -> Node {
        let legs = compute_legs(&cp.nodes[&i], &cp.nodes[&j]);
        cp.contract_nodes_given_legs(i, j, legs)
    }

    #[test]
    fn test_contract_nodes() {
        let tn = setup();
        let mut cp = ContractionProcessor::new(&tn, true);
        assert_eq!(cp.neighbors(0).into_iter().collect::<Vec<_>>(), vec![1, 2]);
        let k = contract(&mut cp, 1, 2);
        assert_eq!(k, 3);
        assert_eq!(cp.flops, 24);
        assert_eq!(compute_size(&cp.nodes[&3], &cp.sizes), 6);
        assert_eq!(cp.neighbors(3).into_iter().collect::<Vec<_>>(), vec![0]);
        let k = contract(&mut cp, 0, 3);
        assert_eq!(k, 4);
        assert_eq!(cp.flops, 30);
        assert_eq!(cp.ssa_path, vec![vec![1, 2], vec![0, 3]]);
        assert!(cp.edges.is_empty());
        assert!(cp.nodes[&4].is_empty());
    }

    #[test]
    fn test_untracked_flops() {
        let tn = setup();
        let mut cp = ContractionProcessor::new(&tn, false);
        contract(&mut cp, 0, 1);
        assert_eq!(cp.flops, 0);
        assert_eq!(cp.nodes.len(), 2);
        assert_eq!(cp.neighbors(3).into_iter().collect::<Vec<_>>(), vec![2]);
    }
}
