//! Compile a network's columnar gene list into a flat, directly-executable [`InferencePlan`]
//! (`spec.md` §4.G).
//!
//! Inputs are never "computed": they occupy positions `0..input_count` of the evaluator's value
//! buffer and are filled in directly from caller-supplied data. Every other node that can reach
//! an output through enabled connections gets a [`PlanNode`] entry, in topological order, at
//! position `input_count + i`. Hidden nodes with no path to any output are pruned entirely;
//! the plan only contains the subgraph rooted at the outputs.

use crate::arena::{NetworkRecord, Population};
use crate::config::InterfaceConfig;
use fxhash::{FxHashMap, FxHashSet};
use core::ops::Range;

/// One non-input node's slice of incoming `(source position, weight)` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanNode {
    pub incoming_begin: u32,
    pub incoming_end: u32,
}

impl PlanNode {
    pub fn incoming_range(self) -> Range<usize> {
        self.incoming_begin as usize..self.incoming_end as usize
    }
}

/// A directly-executable evaluation order for one network. `nodes[i]` computes the value stored
/// at position `input_count + i`; `output_lookup[o]` names the position holding output `o`'s
/// value (always present, even for an output with no incoming connections at all).
#[derive(Debug, Clone, Default)]
pub struct InferencePlan {
    pub input_count: usize,
    pub nodes: Vec<PlanNode>,
    pub edge_from: Vec<u32>,
    pub edge_weight: Vec<f64>,
    pub output_lookup: Vec<u32>,
}

impl InferencePlan {
    pub fn value_count(&self) -> usize {
        self.input_count + self.nodes.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_lookup.len()
    }
}

/// Build the plan for `network`. Runs in O(connections) plus a topological sort of the
/// output-reachable subgraph.
pub fn build_plan(pop: &Population, network: &NetworkRecord, interface: InterfaceConfig) -> InferencePlan {
    let input_count = interface.input_count as u32;
    let output_base = input_count;

    let mut forward_to: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    let mut reverse: FxHashMap<u32, Vec<(u32, f64)>> = FxHashMap::default();
    for conn in pop.connections_of(network) {
        if !conn.enabled() {
            continue;
        }
        forward_to.entry(conn.from).or_default().push(conn.to);
        reverse.entry(conn.to).or_default().push((conn.from, conn.weight));
    }

    // Backward reachability from every output: the set of nodes whose value can influence some
    // output. Hidden nodes outside this set are dead weight and never get a plan entry.
    let mut relevant: FxHashSet<u32> = FxHashSet::default();
    let mut stack: Vec<u32> = (0..interface.output_count as u32).map(|i| output_base + i).collect();
    while let Some(node) = stack.pop() {
        if !relevant.insert(node) {
            continue;
        }
        if let Some(preds) = reverse.get(&node) {
            stack.extend(preds.iter().map(|&(p, _)| p));
        }
    }

    let mut in_degree: FxHashMap<u32, usize> = FxHashMap::default();
    for &node in relevant.iter().filter(|&&n| n >= input_count) {
        in_degree.entry(node).or_insert(0);
    }
    for (&from, edges) in &forward_to {
        if from < input_count || !relevant.contains(&from) {
            continue; // input sources are always satisfied, don't block readiness
        }
        for &to in edges {
            if relevant.contains(&to) {
                *in_degree.entry(to).or_insert(0) += 1;
            }
        }
    }

    let mut queue: Vec<u32> = in_degree.iter().filter(|&(_, &d)| d == 0).map(|(&n, _)| n).collect();
    queue.sort_unstable();
    let mut cursor = 0;
    while cursor < queue.len() {
        let node = queue[cursor];
        cursor += 1;
        if let Some(edges) = forward_to.get(&node) {
            for &to in edges {
                if let Some(d) = in_degree.get_mut(&to) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(to);
                    }
                }
            }
        }
    }
    let topo_order = queue;

    let mut position: FxHashMap<u32, u32> = (0..input_count).map(|i| (i, i)).collect();
    for (i, &node) in topo_order.iter().enumerate() {
        position.insert(node, input_count + i as u32);
    }

    let mut nodes = Vec::with_capacity(topo_order.len());
    let mut edge_from = Vec::new();
    let mut edge_weight = Vec::new();
    for &node in &topo_order {
        let begin = edge_from.len() as u32;
        if let Some(preds) = reverse.get(&node) {
            for &(from, weight) in preds {
                edge_from.push(position[&from]);
                edge_weight.push(weight);
            }
        }
        let end = edge_from.len() as u32;
        nodes.push(PlanNode { incoming_begin: begin, incoming_end: end });
    }

    let output_lookup = (0..interface.output_count as u32).map(|i| position[&(output_base + i)]).collect();

    InferencePlan {
        input_count: interface.input_count,
        nodes,
        edge_from,
        edge_weight,
        output_lookup,
    }
}
