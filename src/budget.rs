//! Offspring budgeting and ancestor sampling (`spec.md` §4.D).
//!
//! This is split into three pure, single-threaded-by-contract steps (the orchestrator runs all
//! of §4.D on one thread; only the per-offspring mutation/crossover work that follows is
//! partitioned across workers):
//!
//! 1. [`per_species_mean_fitness`] turns the ancestor fitness vector into one mean per species.
//! 2. [`offspring_partition`] turns those means into an exact offspring count per species.
//! 3. [`extinction_survivors`] / [`compose_species_offspring`] turn one species' budget into a
//!    composition (champion / mutation categories / crossover categories) over its survivors.

use crate::arena::SpeciesRecord;
use crate::config::{ExtinctionConfig, MutationConfig};
use rand::Rng;
use rand_distr::{Binomial, Distribution};

/// Mean fitness of each species' members, i.e. NEAT's explicit-fitness-sharing approximation
/// (§4.D).
pub fn per_species_mean_fitness(species: &[SpeciesRecord], fitness: &[f32]) -> Vec<f64> {
    species
        .iter()
        .map(|s| {
            let range = s.network_range();
            if range.is_empty() {
                return 0.0;
            }
            let sum: f64 = fitness[range.clone()].iter().map(|&f| f as f64).sum();
            sum / range.len() as f64
        })
        .collect()
}

/// Convert per-species mean fitness into an exact offspring count per species, summing to
/// `population_size`. Min-max normalizes fitness to `[0, 1]`; if every species ties (including
/// the degenerate all-zero-variance case), splits the population evenly. Otherwise each species
/// gets `floor(portion * population_size)`, and the remaining slots go to the species with the
/// largest fractional residues, `min(missing, species.len())` of them (§9, preserved quirk 3).
pub fn offspring_partition(mean_fitness: &[f64], population_size: usize) -> Vec<usize> {
    let n = mean_fitness.len();
    if n == 0 {
        return Vec::new();
    }

    let min = mean_fitness.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = mean_fitness.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    let portions: Vec<f64> = if span <= 0.0 {
        vec![1.0 / n as f64; n]
    } else {
        let normalized: Vec<f64> = mean_fitness.iter().map(|&f| (f - min) / span).collect();
        let sum: f64 = normalized.iter().sum();
        if sum <= 0.0 {
            vec![1.0 / n as f64; n]
        } else {
            normalized.into_iter().map(|v| v / sum).collect()
        }
    };

    let raw: Vec<f64> = portions.iter().map(|&p| p * population_size as f64).collect();
    let mut counts: Vec<usize> = raw.iter().map(|&r| r.floor() as usize).collect();
    let allocated: usize = counts.iter().sum();
    let missing = population_size.saturating_sub(allocated);

    let mut residues: Vec<(usize, f64)> = raw
        .iter()
        .zip(counts.iter())
        .enumerate()
        .map(|(i, (&r, &c))| (i, r - c as f64))
        .collect();
    residues.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(core::cmp::Ordering::Equal));

    let top_ups = missing.min(residues.len());
    for &(i, _) in residues.iter().take(top_ups) {
        counts[i] += 1;
    }

    counts
}

/// How many of a species' `budget` offspring fall into each reproduction category. Every field
/// sums exactly to `budget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeciesComposition {
    pub champion: bool,
    pub add_conn_count: usize,
    pub add_node_count: usize,
    pub weight_mutation_count: usize,
    pub inter_species_crossover_count: usize,
    pub in_species_crossover_count: usize,
}

impl SpeciesComposition {
    pub fn total(&self) -> usize {
        self.champion as usize
            + self.add_conn_count
            + self.add_node_count
            + self.weight_mutation_count
            + self.inter_species_crossover_count
            + self.in_species_crossover_count
    }
}

/// §4.D's per-species offspring composition: champion preservation, binomial mutation-category
/// split bounded by a target mutation count, and binomial inter-species-crossover split of
/// whatever remains.
pub fn compose_species_offspring(
    budget: usize,
    species_size: usize,
    num_species: usize,
    cfg: &MutationConfig,
    rng: &mut impl Rng,
) -> SpeciesComposition {
    if budget == 0 {
        return SpeciesComposition::default();
    }

    let champion = species_size >= cfg.min_network_champion_size;
    let champion_slot = champion as usize;
    let after_champion = budget.saturating_sub(champion_slot);

    let n = budget.saturating_sub(1) as u64;
    let mut add_conn_count = draw_binomial(n, cfg.p_add_conn, rng);
    let mut add_node_count = draw_binomial(n, cfg.p_add_node, rng);

    let target_mutation_count = ((budget as f64) * cfg.p_mutate).round() as usize;
    let target_mutation_count = target_mutation_count.min(after_champion);

    let mut prefer_conn = true;
    while add_conn_count + add_node_count > target_mutation_count {
        let shrank = if prefer_conn {
            shrink(&mut add_conn_count) || shrink(&mut add_node_count)
        } else {
            shrink(&mut add_node_count) || shrink(&mut add_conn_count)
        };
        prefer_conn = !prefer_conn;
        if !shrank {
            break;
        }
    }

    let weight_mutation_count = target_mutation_count.saturating_sub(add_conn_count + add_node_count);
    let after_mutation = after_champion - target_mutation_count;

    let inter_species_crossover_count = if num_species >= 2 {
        draw_binomial(n, cfg.p_inter_species, rng).min(after_mutation)
    } else {
        0
    };
    let in_species_crossover_count = after_mutation - inter_species_crossover_count;

    SpeciesComposition {
        champion,
        add_conn_count,
        add_node_count,
        weight_mutation_count,
        inter_species_crossover_count,
        in_species_crossover_count,
    }
}

fn shrink(count: &mut usize) -> bool {
    if *count > 0 {
        *count -= 1;
        true
    } else {
        false
    }
}

fn draw_binomial(n: u64, p: f64, rng: &mut impl Rng) -> usize {
    Binomial::new(n, p.clamp(0.0, 1.0))
        .expect("binomial probability out of range")
        .sample(rng) as usize
}

/// Number of a species' members to keep (sorted by fitness descending) after the extinction
/// filter: drop worst-fitness members bounded by *both* caps simultaneously, never down to
/// zero.
pub fn extinction_survivor_count(fitness_desc: &[f32], cfg: &ExtinctionConfig) -> usize {
    let n = fitness_desc.len();
    if n <= 1 {
        return n;
    }

    let cap_by_portion = (cfg.max_remove_population_portion * n as f64).floor() as usize;

    let min = fitness_desc.iter().cloned().fold(f32::INFINITY, f32::min) as f64;
    let max = fitness_desc.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let cutoff = min + (max - min) * cfg.max_remove_score_portion;
    let cap_by_score = fitness_desc.iter().filter(|&&f| (f as f64) < cutoff).count();

    let remove = cap_by_portion.min(cap_by_score).min(n - 1);
    n - remove
}

/// Uniform-with-replacement pick of one survivor.
pub fn sample_one(survivors: &[u32], rng: &mut impl Rng) -> u32 {
    survivors[rng.random_range(0..survivors.len())]
}

/// Uniform-with-replacement pick of two distinct survivors, for in-species crossover. Returns
/// `None` if fewer than two survivors exist (§7: promote to inter-species crossover or
/// add-connection mutation instead).
pub fn sample_distinct_pair(survivors: &[u32], rng: &mut impl Rng) -> Option<(u32, u32)> {
    if survivors.len() < 2 {
        return None;
    }
    loop {
        let a = sample_one(survivors, rng);
        let b = sample_one(survivors, rng);
        if a != b {
            return Some((a, b));
        }
    }
}

/// One in-species parent, paired with a uniformly random member of the rest of the population
/// (for inter-species crossover). Returns `None` if the species spans the whole population.
pub fn sample_inter_species_pair(
    survivors: &[u32],
    species_range: core::ops::Range<usize>,
    population_size: usize,
    rng: &mut impl Rng,
) -> Option<(u32, u32)> {
    if species_range.len() >= population_size {
        return None;
    }
    let in_species = sample_one(survivors, rng);
    loop {
        let idx = rng.random_range(0..population_size);
        if !species_range.contains(&idx) {
            return Some((in_species, idx as u32));
        }
    }
}
