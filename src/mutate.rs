//! Structural and weight mutation operators (`spec.md` §4.E). Every operator is a pure function
//! from one parent gene list to one [`GenomeDraft`]; the arena commit step happens later in the
//! orchestrator, once every offspring's final connection count is known (§5).

use crate::arena::{ConnectionInfo, ConnectionRef, GenomeDraft, NodeIndex};
use crate::config::{InterfaceConfig, MutationConfig, WeightConfig};
use crate::innovation::InnovationRegistry;
use fxhash::FxHashSet;
use rand::Rng;

/// Copy a parent's genes into a draft with no changes at all (used both as the add-connection
/// give-up fallback and as the champion-preservation operator).
pub fn clone_unchanged(parent: &[ConnectionRef], hidden_node_count: u32) -> GenomeDraft {
    GenomeDraft {
        hidden_node_count,
        genes: parent.iter().map(|g| (g.from, g.to, g.weight, g.info)).collect(),
    }
}

/// Can `start` reach `target` by following structural edges (regardless of `enabled`)? Used to
/// reject any new connection that would close a cycle, since inference only handles
/// feed-forward topologies.
fn reaches(parent: &[ConnectionRef], start: NodeIndex, target: NodeIndex) -> bool {
    let mut stack = vec![start];
    let mut seen = FxHashSet::default();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        for gene in parent {
            if gene.from == node {
                stack.push(gene.to);
            }
        }
    }
    false
}

/// Add a single new connection between two nodes not already directly connected and not
/// already connected in the other direction through any path (which would create a cycle).
/// Retries up to `|nodes| * |eligible destinations| + 1` times before giving up and returning
/// the parent unchanged (§9: a network that is already maximally (densely, acyclically)
/// connected has no valid pair to add).
pub fn add_connection(
    parent: &[ConnectionRef],
    hidden_node_count: u32,
    interface: InterfaceConfig,
    registry: &InnovationRegistry,
    weight_cfg: &WeightConfig,
    rng: &mut impl Rng,
) -> GenomeDraft {
    let output_base = interface.input_count + interface.output_count;
    let total_nodes = output_base + hidden_node_count as usize;
    // Sources: inputs ∪ hidden (never an output). Destinations: outputs ∪ hidden (never an input).
    let src_space = interface.input_count + hidden_node_count as usize;
    let dst_space = total_nodes.saturating_sub(interface.input_count).max(1);
    let attempts = src_space.max(1) * dst_space + 1;

    for _ in 0..attempts {
        let src_pick = rng.random_range(0..src_space.max(1));
        let src = if src_pick < interface.input_count {
            src_pick as NodeIndex
        } else {
            (output_base + (src_pick - interface.input_count)) as NodeIndex
        };
        let dst = interface.input_count as NodeIndex + rng.random_range(0..dst_space) as NodeIndex;
        if src == dst {
            continue;
        }
        if parent.iter().any(|g| g.from == src && g.to == dst) {
            continue;
        }
        if reaches(parent, dst, src) {
            continue;
        }

        let innovation = registry.register_or_lookup(src, dst);
        let weight = rng.random_range(weight_cfg.weight_min..=weight_cfg.weight_max);

        let mut genes: Vec<_> = parent.iter().map(|g| (g.from, g.to, g.weight, g.info)).collect();
        genes.push((src, dst, weight, ConnectionInfo::new(true, innovation)));
        genes.sort_by_key(|g| g.3.innovation());

        return GenomeDraft { hidden_node_count, genes };
    }

    clone_unchanged(parent, hidden_node_count)
}

/// Bisect a randomly chosen enabled connection: disable it, allocate a new hidden node, and
/// wire `from -> new` (weight 1.0, the standard NEAT convention so the split is initially a
/// near-identity function) and `new -> to` (inheriting the original weight). No-op if the
/// parent has no enabled connection to split.
pub fn add_node(
    parent: &[ConnectionRef],
    hidden_node_count: u32,
    interface: InterfaceConfig,
    registry: &InnovationRegistry,
    rng: &mut impl Rng,
) -> GenomeDraft {
    let enabled_indices: Vec<usize> = parent
        .iter()
        .enumerate()
        .filter(|(_, g)| g.enabled())
        .map(|(i, _)| i)
        .collect();
    if enabled_indices.is_empty() {
        return clone_unchanged(parent, hidden_node_count);
    }

    let split = enabled_indices[rng.random_range(0..enabled_indices.len())];
    let original = parent[split];
    let new_node = (interface.input_count + interface.output_count) as NodeIndex + hidden_node_count;

    let in_innovation = registry.register_or_lookup(original.from, new_node);
    let out_innovation = registry.register_or_lookup(new_node, original.to);

    let mut genes: Vec<_> = parent
        .iter()
        .enumerate()
        .map(|(i, g)| {
            if i == split {
                let mut info = g.info;
                info.set_enabled(false);
                (g.from, g.to, g.weight, info)
            } else {
                (g.from, g.to, g.weight, g.info)
            }
        })
        .collect();
    genes.push((original.from, new_node, 1.0, ConnectionInfo::new(true, in_innovation)));
    genes.push((new_node, original.to, original.weight, ConnectionInfo::new(true, out_innovation)));
    genes.sort_by_key(|g| g.3.innovation());

    GenomeDraft {
        hidden_node_count: hidden_node_count + 1,
        genes,
    }
}

/// Perturb connection weights. A Bernoulli(`p_network_mutation`) draw decides whether every
/// connection is touched or just one randomly chosen connection; each touched connection then
/// independently gets a Bernoulli(`p_uniform_mutation`) draw between a small offset and a full
/// resample (§4.E).
pub fn mutate_weights(
    parent: &[ConnectionRef],
    hidden_node_count: u32,
    weight_cfg: &WeightConfig,
    mutation_cfg: &MutationConfig,
    rng: &mut impl Rng,
) -> GenomeDraft {
    let mutate_all = rng.random_bool(mutation_cfg.p_network_mutation.clamp(0.0, 1.0));
    let single_target = if mutate_all || parent.is_empty() {
        None
    } else {
        Some(rng.random_range(0..parent.len()))
    };

    let genes = parent
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let weight = if mutate_all || single_target == Some(i) {
                perturb_weight(g.weight, weight_cfg, mutation_cfg, rng)
            } else {
                g.weight
            };
            (g.from, g.to, weight, g.info)
        })
        .collect();

    GenomeDraft { hidden_node_count, genes }
}

fn perturb_weight(current: f64, weight_cfg: &WeightConfig, mutation_cfg: &MutationConfig, rng: &mut impl Rng) -> f64 {
    if rng.random_bool(mutation_cfg.p_uniform_mutation.clamp(0.0, 1.0)) {
        let offset = rng.random_range(weight_cfg.offset_min..=weight_cfg.offset_max);
        (current + offset).clamp(weight_cfg.weight_min, weight_cfg.weight_max)
    } else {
        rng.random_range(weight_cfg.weight_min..=weight_cfg.weight_max)
    }
}
