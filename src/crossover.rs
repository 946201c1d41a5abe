//! The crossover operator (`spec.md` §4.F): a lock-step walk of two innovation-sorted gene
//! lists, producing one offspring [`GenomeDraft`].
//!
//! Every coin flip a crossover call makes (which parent a matching gene's weight comes from,
//! whether a disabled gene stays disabled, whether a tied-fitness parent's disjoint/excess genes
//! are included) is drawn from a throwaway RNG seeded once per offspring from the calling
//! thread's primary stream. That keeps the primary stream's per-offspring draw count fixed at
//! exactly one regardless of genome size or how many tie-breaks a particular crossover hits.

use crate::arena::{ConnectionRef, GenomeDraft};
use crate::random::WyRng;
use core::cmp::Ordering;
use rand::{Rng, SeedableRng};

/// Cross `a` and `b` into one offspring. `a_fitness`/`b_fitness` decide which parent is
/// structurally dominant (ties, within `fitness_epsilon`, fall back to a coin flip per disjoint
/// or excess gene). `seed` is drawn once from the caller's primary RNG stream.
#[allow(clippy::too_many_arguments)]
pub fn crossover(
    a: &[ConnectionRef],
    a_fitness: f64,
    a_hidden: u32,
    b: &[ConnectionRef],
    b_fitness: f64,
    b_hidden: u32,
    keep_disabled_rate: f64,
    fitness_epsilon: f64,
    seed: u64,
) -> GenomeDraft {
    let mut rng = WyRng::from_seed(seed.to_le_bytes());

    let a_fitter = a_fitness > b_fitness + fitness_epsilon;
    let b_fitter = b_fitness > a_fitness + fitness_epsilon;
    let tied = !a_fitter && !b_fitter;

    let hidden_node_count = if a_fitter {
        a_hidden
    } else if b_fitter {
        b_hidden
    } else {
        a_hidden.max(b_hidden)
    };

    let mut genes = Vec::with_capacity(a.len().max(b.len()));
    let mut ai = 0;
    let mut bi = 0;

    while ai < a.len() && bi < b.len() {
        match a[ai].innovation().cmp(&b[bi].innovation()) {
            Ordering::Equal => {
                let (chosen, other) = if rng.random_bool(0.5) { (a[ai], b[bi]) } else { (b[bi], a[ai]) };
                let mut info = chosen.info;
                if !chosen.enabled() || !other.enabled() {
                    info.set_enabled(!rng.random_bool(keep_disabled_rate.clamp(0.0, 1.0)));
                }
                genes.push((chosen.from, chosen.to, chosen.weight, info));
                ai += 1;
                bi += 1;
            }
            Ordering::Less => {
                if a_fitter || (tied && rng.random_bool(0.5)) {
                    let g = a[ai];
                    genes.push((g.from, g.to, g.weight, g.info));
                }
                ai += 1;
            }
            Ordering::Greater => {
                if b_fitter || (tied && rng.random_bool(0.5)) {
                    let g = b[bi];
                    genes.push((g.from, g.to, g.weight, g.info));
                }
                bi += 1;
            }
        }
    }
    while ai < a.len() {
        if a_fitter || (tied && rng.random_bool(0.5)) {
            let g = a[ai];
            genes.push((g.from, g.to, g.weight, g.info));
        }
        ai += 1;
    }
    while bi < b.len() {
        if b_fitter || (tied && rng.random_bool(0.5)) {
            let g = b[bi];
            genes.push((g.from, g.to, g.weight, g.info));
        }
        bi += 1;
    }

    genes.sort_by_key(|g| g.3.innovation());
    GenomeDraft { hidden_node_count, genes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ConnectionInfo;

    fn conn(from: u32, to: u32, weight: f64, innovation: u64, enabled: bool) -> ConnectionRef {
        ConnectionRef {
            from,
            to,
            weight,
            info: ConnectionInfo::new(enabled, innovation),
        }
    }

    #[test]
    fn disjoint_and_excess_come_from_the_fitter_parent_only() {
        let a = vec![conn(0, 2, 1.0, 0, true), conn(0, 3, 1.0, 5, true)]; // innovation 5 is excess
        let b = vec![conn(0, 2, 1.0, 0, true), conn(1, 2, 1.0, 1, true)]; // innovation 1 is disjoint

        let draft = crossover(&a, 10.0, 0, &b, 1.0, 0, 0.75, 0.001, 42);
        let innovations: Vec<u64> = draft.genes.iter().map(|g| g.3.innovation()).collect();
        assert!(innovations.contains(&5)); // a's excess kept, a is fitter
        assert!(!innovations.contains(&1)); // b's disjoint dropped, b is not fitter
    }

    #[test]
    fn matching_gene_weight_comes_from_exactly_one_parent() {
        let a = vec![conn(0, 2, 1.0, 0, true)];
        let b = vec![conn(0, 2, -1.0, 0, true)];

        for seed in 0..50u64 {
            let draft = crossover(&a, 1.0, 0, &b, 1.0, 0, 0.75, 0.001, seed);
            assert_eq!(draft.genes.len(), 1);
            assert!(draft.genes[0].2 == 1.0 || draft.genes[0].2 == -1.0);
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let a = vec![conn(0, 2, 1.0, 0, true), conn(0, 3, 0.5, 2, true)];
        let b = vec![conn(0, 2, -1.0, 0, true), conn(1, 2, 0.25, 1, true)];

        let first = crossover(&a, 1.0, 0, &b, 1.0, 0, 0.75, 0.001, 7);
        let second = crossover(&a, 1.0, 0, &b, 1.0, 0, 0.75, 0.001, 7);
        assert_eq!(first.genes, second.genes);
        assert_eq!(first.hidden_node_count, second.hidden_node_count);
    }

    #[test]
    fn tied_fitness_sometimes_includes_both_sides_disjoint_genes() {
        let a = vec![conn(0, 2, 1.0, 0, true), conn(0, 3, 1.0, 2, true)];
        let b = vec![conn(0, 2, 1.0, 0, true), conn(1, 2, 1.0, 1, true)];

        let mut saw_a_excess = false;
        let mut saw_b_disjoint = false;
        for seed in 0..200u64 {
            let draft = crossover(&a, 1.0, 0, &b, 1.0, 0, 0.75, 0.001, seed);
            let innovations: Vec<u64> = draft.genes.iter().map(|g| g.3.innovation()).collect();
            saw_a_excess |= innovations.contains(&2);
            saw_b_disjoint |= innovations.contains(&1);
        }
        assert!(saw_a_excess);
        assert!(saw_b_disjoint);
    }

    #[test]
    fn keep_disabled_rate_zero_always_reenables() {
        let a = vec![conn(0, 2, 1.0, 0, false)];
        let b = vec![conn(0, 2, 1.0, 0, true)];
        for seed in 0..20u64 {
            let draft = crossover(&a, 1.0, 0, &b, 1.0, 0, 0.0, 0.001, seed);
            assert!(draft.genes[0].3.enabled());
        }
    }

    #[test]
    fn keep_disabled_rate_one_always_stays_disabled() {
        let a = vec![conn(0, 2, 1.0, 0, false)];
        let b = vec![conn(0, 2, 1.0, 0, true)];
        for seed in 0..20u64 {
            let draft = crossover(&a, 1.0, 0, &b, 1.0, 0, 1.0, 0.001, seed);
            assert!(!draft.genes[0].3.enabled());
        }
    }

    #[test]
    fn hidden_node_count_follows_the_dominant_parent() {
        let a = vec![conn(0, 2, 1.0, 0, true)];
        let b = vec![conn(0, 2, 1.0, 0, true)];
        let draft = crossover(&a, 5.0, 3, &b, 1.0, 9, 0.75, 0.001, 1);
        assert_eq!(draft.hidden_node_count, 3);
    }
}
