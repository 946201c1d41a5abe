//! The species sorter (`spec.md` §4.C): buckets networks by compatibility distance to a
//! per-species characteristic member, and the compatibility-distance formula it's built on.

use crate::arena::{ConnectionRef, NetworkRecord, Population, SpeciesRecord};
use crate::config::DistanceConfig;
use crate::spinlock::Spinlock;
use core::cmp::Ordering;
use std::sync::Arc;

/// The bare minimum of a gene needed for compatibility distance: its structural identity and
/// its weight. Extracted from the connection columns so the sorter never has to hold a lock
/// across a whole network's connection slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacteristicGene {
    pub innovation: u64,
    pub weight: f64,
}

impl From<ConnectionRef> for CharacteristicGene {
    fn from(c: ConnectionRef) -> Self {
        Self {
            innovation: c.innovation(),
            weight: c.weight,
        }
    }
}

pub fn genes_of(pop: &Population, network: &NetworkRecord) -> Vec<CharacteristicGene> {
    pop.connections_of(network).map(CharacteristicGene::from).collect()
}

/// Compatibility distance between two (innovation-sorted) gene lists, per §4.C:
/// `c1*excess/N + c2*disjoint/N + c3*avg|weight_matching_delta|`, `N = max(|A|,|B|)` if >= 20
/// else 1.
pub fn compatibility_distance(a: &[CharacteristicGene], b: &[CharacteristicGene], cfg: &DistanceConfig) -> f64 {
    let mut ai = 0;
    let mut bi = 0;
    let mut disjoint = 0usize;
    let mut matching = 0usize;
    let mut weight_diff_sum = 0.0;

    while ai < a.len() && bi < b.len() {
        match a[ai].innovation.cmp(&b[bi].innovation) {
            Ordering::Equal => {
                matching += 1;
                weight_diff_sum += (a[ai].weight - b[bi].weight).abs();
                ai += 1;
                bi += 1;
            }
            Ordering::Less => {
                disjoint += 1;
                ai += 1;
            }
            Ordering::Greater => {
                disjoint += 1;
                bi += 1;
            }
        }
    }
    let excess = (a.len() - ai) + (b.len() - bi);

    let n = a.len().max(b.len());
    let norm = if n >= 20 { n as f64 } else { 1.0 };
    let avg_weight_diff = if matching > 0 {
        weight_diff_sum / matching as f64
    } else {
        0.0
    };

    cfg.c_excess * (excess as f64) / norm
        + cfg.c_disjoint * (disjoint as f64) / norm
        + cfg.c_avg_weight * avg_weight_diff
}

struct SpeciesEntry {
    characteristic: Vec<CharacteristicGene>,
    bucket: Spinlock<Vec<u32>>,
}

/// Cleared and rebuilt once per generation (§3 lifecycle): species identity does not persist
/// across generations in this design, only within the pass that assigns this generation's
/// offspring to species.
#[derive(Default)]
pub struct SpeciesSorter {
    entries: Spinlock<Vec<Arc<SpeciesEntry>>>,
}

impl SpeciesSorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Assign `network_idx` to the first species whose characteristic is within `threshold` of
    /// `genes`, creating a new species (with `genes` as its characteristic) if none matches.
    pub fn sort_into_bucket(&self, network_idx: u32, genes: &[CharacteristicGene], cfg: &DistanceConfig) {
        let snapshot = self.entries.lock().clone();
        if let Some(entry) = snapshot
            .iter()
            .find(|e| compatibility_distance(&e.characteristic, genes, cfg) < cfg.threshold)
        {
            entry.bucket.lock().push(network_idx);
            return;
        }

        let mut entries = self.entries.lock();
        if let Some(entry) = entries[snapshot.len()..]
            .iter()
            .find(|e| compatibility_distance(&e.characteristic, genes, cfg) < cfg.threshold)
        {
            entry.bucket.lock().push(network_idx);
            return;
        }

        entries.push(Arc::new(SpeciesEntry {
            characteristic: genes.to_vec(),
            bucket: Spinlock::new(vec![network_idx]),
        }));
    }

    /// Flatten the buckets into a permutation of network indices and the species ranges over
    /// that permutation (§4.C, "assign_species_and_sorted_networks"). Bucket order (and thus
    /// species order) follows creation order.
    pub fn finalize(&self) -> (Vec<u32>, Vec<SpeciesRecord>) {
        let entries = self.entries.lock();
        let mut order = Vec::new();
        let mut species = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let bucket = entry.bucket.lock();
            let begin = order.len() as u32;
            order.extend_from_slice(&bucket);
            let end = order.len() as u32;
            species.push(SpeciesRecord {
                network_begin: begin,
                network_end: end,
            });
        }
        (order, species)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn gene(inno: u64, weight: f64) -> CharacteristicGene {
        CharacteristicGene { innovation: inno, weight }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let cfg = DistanceConfig::default();
        let genes = vec![gene(0, 0.5), gene(1, -0.3), gene(4, 0.1)];
        assert_eq!(compatibility_distance(&genes, &genes, &cfg), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let cfg = DistanceConfig::default();
        let a = vec![gene(0, 0.5), gene(2, -0.3), gene(4, 0.1)];
        let b = vec![gene(0, 0.4), gene(1, 1.0), gene(4, 0.9)];
        assert!((compatibility_distance(&a, &b, &cfg) - compatibility_distance(&b, &a, &cfg)).abs() < 1e-12);
    }

    #[test]
    fn disjoint_and_excess_counted_separately() {
        let cfg = DistanceConfig {
            c_excess: 1.0,
            c_disjoint: 1.0,
            c_avg_weight: 0.0,
            threshold: 100.0,
        };
        // a: 0,1,3   b: 0,1,2,3,4,5 -> matching {0,1,3}; disjoint {2}; excess {4,5}
        let a = vec![gene(0, 0.0), gene(1, 0.0), gene(3, 0.0)];
        let b = vec![
            gene(0, 0.0),
            gene(1, 0.0),
            gene(2, 0.0),
            gene(3, 0.0),
            gene(4, 0.0),
            gene(5, 0.0),
        ];
        // N = max(3,6) = 6 < 20 => norm = 1
        assert_eq!(compatibility_distance(&a, &b, &cfg), 1.0 + 2.0);
    }

    #[test]
    fn single_species_when_all_within_threshold() {
        let sorter = SpeciesSorter::new();
        let cfg = DistanceConfig::default();
        let genes = vec![gene(0, 0.5)];
        for i in 0..10u32 {
            sorter.sort_into_bucket(i, &genes, &cfg);
        }
        let (order, species) = sorter.finalize();
        assert_eq!(species.len(), 1);
        assert_eq!(order.len(), 10);
        assert_eq!(species[0].network_range(), 0..10);
    }

    #[test]
    fn distant_genomes_form_separate_species() {
        let sorter = SpeciesSorter::new();
        let cfg = DistanceConfig {
            threshold: 0.5,
            ..DistanceConfig::default()
        };
        let close_a = vec![gene(0, 0.0)];
        let close_b = vec![gene(0, 0.01)];
        let far = vec![gene(0, 0.0), gene(1, 0.0), gene(2, 0.0), gene(3, 0.0)];

        sorter.sort_into_bucket(0, &close_a, &cfg);
        sorter.sort_into_bucket(1, &close_b, &cfg);
        sorter.sort_into_bucket(2, &far, &cfg);

        let (order, species) = sorter.finalize();
        assert_eq!(order.len(), 3);
        assert_eq!(species.len(), 2);
    }

    #[test]
    fn concurrent_sort_partitions_every_network_exactly_once() {
        let sorter = Arc::new(SpeciesSorter::new());
        let cfg = Arc::new(DistanceConfig {
            threshold: 0.5,
            ..DistanceConfig::default()
        });
        let groups = 6usize;
        let per_group = 20u32;

        thread::scope(|scope| {
            for g in 0..groups {
                let sorter = Arc::clone(&sorter);
                let cfg = Arc::clone(&cfg);
                scope.spawn(move || {
                    let genes = vec![gene(0, g as f64 * 10.0)];
                    for i in 0..per_group {
                        sorter.sort_into_bucket(g as u32 * per_group + i, &genes, &cfg);
                    }
                });
            }
        });

        let (order, species) = sorter.finalize();
        assert_eq!(order.len(), groups * per_group as usize);
        assert_eq!(species.len(), groups);
        let total: usize = species.iter().map(|s| s.size()).sum();
        assert_eq!(total, order.len());
    }
}
