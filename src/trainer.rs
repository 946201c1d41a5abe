//! The orchestrator (`spec.md` §4.I): sequences speciation, offspring budgeting, ancestor
//! sampling, mutation, crossover, and the species re-sort, partitioning the expensive passes
//! across a fixed worker pool.

use crate::arena::{GenomeDraft, NetworkRecord, Population};
use crate::budget;
use crate::config::{EvolutionConfig, InterfaceConfig};
use crate::crossover;
use crate::eval;
use crate::inference::{self, InferencePlan};
use crate::error::ReproduceError;
use crate::innovation::InnovationRegistry;
use crate::mutate;
use crate::random::{self, WyRng};
use crate::species::{self, SpeciesSorter};
use core::cmp::Ordering;
use core::ops::Range;
use rand::Rng;
use std::thread;
use tracing::info_span;

/// A population-wide, directly-executable evaluation plan: one compiled [`InferencePlan`] per
/// network, in the same order as the trainer's current generation. This is what `evolve` writes
/// and what `evaluate` reads a sub-range of.
#[derive(Debug, Clone, Default)]
pub struct InferenceGroup {
    pub input_count: usize,
    pub output_count: usize,
    pub networks: Vec<InferencePlan>,
}

/// Evaluate every network in `range` against flat, range-sized buffers: `inputs.len()` must be
/// `range.len() * plan.input_count` and `outputs.len()` must be `range.len() * plan.output_count`
/// (§9, quirk 4: buffers are sized to the range, *not* to the whole population).
pub fn evaluate(plan: &InferenceGroup, inputs: &[f64], outputs: &mut [f64], range: Range<usize>) {
    assert_eq!(inputs.len(), range.len() * plan.input_count, "input buffer does not match range arity");
    assert_eq!(outputs.len(), range.len() * plan.output_count, "output buffer does not match range arity");

    for (slot, network_idx) in range.enumerate() {
        let input_slice = &inputs[slot * plan.input_count..(slot + 1) * plan.input_count];
        let output_slice = &mut outputs[slot * plan.output_count..(slot + 1) * plan.output_count];
        eval::evaluate(&plan.networks[network_idx], input_slice, output_slice);
    }
}

enum Job {
    Champion(u32),
    AddConnection(u32),
    AddNode(u32),
    WeightMutation(u32),
    InSpeciesCrossover(u32, f32, u32, f32),
    InterSpeciesCrossover(u32, f32, u32, f32),
}

/// The evolutionary trainer: owns one generation's population plus the two cross-worker shared
/// structures (innovation registry, species sorter), both of which reset every `evolve` (§3
/// lifecycle; there is no process-wide singleton, these live and die with the `Trainer`).
pub struct Trainer {
    evolution: EvolutionConfig,
    interface: InterfaceConfig,
    population: Population,
    innovation: InnovationRegistry,
    species_sorter: SpeciesSorter,
    thread_count: usize,
    generation: u64,
    planning_rng: WyRng,
}

impl Trainer {
    /// A fresh population of `population_size` networks with no hidden nodes or connections, in
    /// a single species (§6).
    pub fn new(
        evolution: EvolutionConfig,
        interface: InterfaceConfig,
        population_size: usize,
        thread_count: usize,
    ) -> Result<Self, ReproduceError> {
        if population_size == 0 {
            return Err(ReproduceError::EmptySpecies { wanted: population_size });
        }
        Ok(Self {
            evolution,
            interface,
            population: Population::seed(population_size),
            innovation: InnovationRegistry::new(),
            species_sorter: SpeciesSorter::new(),
            thread_count: thread_count.max(1),
            generation: 0,
            planning_rng: WyRng::seeded(random::fresh_seed()),
        })
    }

    pub fn population_size(&self) -> usize {
        self.population.network_count()
    }

    pub fn species_count(&self) -> usize {
        self.population.species.len()
    }

    pub fn network(&self, idx: usize) -> &NetworkRecord {
        &self.population.networks[idx]
    }

    fn chunk_bounds(&self, total: usize) -> Vec<Range<usize>> {
        let thread_count = self.thread_count.min(total.max(1));
        let base = total / thread_count;
        let rem = total % thread_count;
        let mut bounds = Vec::with_capacity(thread_count);
        let mut start = 0;
        for i in 0..thread_count {
            let size = base + usize::from(i < rem);
            bounds.push(start..start + size);
            start += size;
        }
        bounds
    }

    /// Advance to the next generation. `ancestor_fitness[i]` is the fitness of network `i` of
    /// the generation this call consumes; `out_inference` is overwritten with the new
    /// generation's inference plans.
    pub fn evolve(&mut self, ancestor_fitness: &[f32], out_inference: &mut InferenceGroup) {
        assert_eq!(ancestor_fitness.len(), self.population.network_count());
        let generation = self.generation;
        let _span = info_span!("evolve", generation).entered();

        self.innovation.clear();
        self.species_sorter.clear();

        let jobs = self.plan_offspring(ancestor_fitness);
        let drafts = self.build_drafts(&jobs);
        self.commit(drafts);
        self.respeciate();

        self.generation += 1;
        *out_inference = self.build_inference_group();
    }

    /// Evaluate every network of the current generation in `range` (see the free function
    /// [`evaluate`] for the buffer-sizing contract).
    pub fn evaluate(&self, plan: &InferenceGroup, inputs: &[f64], outputs: &mut [f64], range: Range<usize>) {
        evaluate(plan, inputs, outputs, range)
    }

    /// §4.D: per-species budgets, extinction filter, ancestor sampling. Single-threaded (cheap
    /// relative to the mutation/crossover/evaluation passes that follow), and its RNG draws must
    /// happen in one deterministic order per generation.
    fn plan_offspring(&mut self, ancestor_fitness: &[f32]) -> Vec<Job> {
        let means = budget::per_species_mean_fitness(&self.population.species, ancestor_fitness);
        let counts = budget::offspring_partition(&means, self.population.network_count());
        let num_species = self.population.species.len();
        let population_size = self.population.network_count();

        let mut jobs = Vec::with_capacity(population_size);
        for (species, &species_budget) in self.population.species.iter().zip(counts.iter()) {
            if species_budget == 0 {
                continue;
            }
            let range = species.network_range();
            let species_size = range.len();

            let mut members: Vec<u32> = range.clone().map(|i| i as u32).collect();
            members.sort_by(|&a, &b| {
                ancestor_fitness[b as usize]
                    .partial_cmp(&ancestor_fitness[a as usize])
                    .unwrap_or(Ordering::Equal)
            });
            let fitness_desc: Vec<f32> = members.iter().map(|&m| ancestor_fitness[m as usize]).collect();
            let survivor_count = budget::extinction_survivor_count(&fitness_desc, &self.evolution.extinction);
            let survivors = &members[..survivor_count];

            let composition =
                budget::compose_species_offspring(species_budget, species_size, num_species, &self.evolution.mutation, &mut self.planning_rng);

            if composition.champion {
                jobs.push(Job::Champion(members[0]));
            }
            for _ in 0..composition.add_conn_count {
                jobs.push(Job::AddConnection(budget::sample_one(survivors, &mut self.planning_rng)));
            }
            for _ in 0..composition.add_node_count {
                jobs.push(Job::AddNode(budget::sample_one(survivors, &mut self.planning_rng)));
            }
            for _ in 0..composition.weight_mutation_count {
                jobs.push(Job::WeightMutation(budget::sample_one(survivors, &mut self.planning_rng)));
            }
            for _ in 0..composition.in_species_crossover_count {
                // §7: a species with fewer than two survivors can't crossover with itself;
                // promote the slot to an inter-species crossover, or failing that (a single
                // species spanning the whole population) to an add-connection mutation.
                match budget::sample_distinct_pair(survivors, &mut self.planning_rng) {
                    Some((a, b)) => jobs.push(Job::InSpeciesCrossover(
                        a,
                        ancestor_fitness[a as usize],
                        b,
                        ancestor_fitness[b as usize],
                    )),
                    None => match budget::sample_inter_species_pair(survivors, range.clone(), population_size, &mut self.planning_rng) {
                        Some((a, b)) => jobs.push(Job::InterSpeciesCrossover(
                            a,
                            ancestor_fitness[a as usize],
                            b,
                            ancestor_fitness[b as usize],
                        )),
                        None => jobs.push(Job::AddConnection(budget::sample_one(survivors, &mut self.planning_rng))),
                    },
                }
            }
            for _ in 0..composition.inter_species_crossover_count {
                match budget::sample_inter_species_pair(survivors, range.clone(), population_size, &mut self.planning_rng) {
                    Some((a, b)) => jobs.push(Job::InterSpeciesCrossover(
                        a,
                        ancestor_fitness[a as usize],
                        b,
                        ancestor_fitness[b as usize],
                    )),
                    None => jobs.push(Job::AddConnection(budget::sample_one(survivors, &mut self.planning_rng))),
                }
            }
        }
        jobs
    }

    /// §4.E/§4.F, partitioned across the worker pool. Each worker owns a dedicated RNG stream
    /// seeded once from `planning_rng` before any thread spawns.
    fn build_drafts(&mut self, jobs: &[Job]) -> Vec<GenomeDraft> {
        let bounds = self.chunk_bounds(jobs.len());
        let seeds: Vec<u64> = bounds.iter().map(|_| self.planning_rng.random()).collect();
        let population = &self.population;
        let innovation = &self.innovation;
        let evolution = &self.evolution;
        let interface = self.interface;

        let chunks: Vec<Vec<GenomeDraft>> = thread::scope(|scope| {
            let handles: Vec<_> = bounds
                .iter()
                .cloned()
                .zip(seeds)
                .map(|(range, seed)| {
                    scope.spawn(move || {
                        let mut rng = WyRng::seeded(seed);
                        jobs[range]
                            .iter()
                            .map(|job| build_one(job, population, innovation, evolution, interface, &mut rng))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("mutation worker panicked")).collect()
        });

        chunks.into_iter().flatten().collect()
    }

    /// Size and fill the next generation's arena from `drafts`, then swap it in.
    fn commit(&mut self, drafts: Vec<GenomeDraft>) {
        let mut conn_begin = vec![0u32; drafts.len()];
        let mut conn_end = vec![0u32; drafts.len()];
        let mut cursor = 0u32;
        for (i, draft) in drafts.iter().enumerate() {
            conn_begin[i] = cursor;
            cursor += draft.connection_count() as u32;
            conn_end[i] = cursor;
        }

        let mut next = Population::new();
        next.reserve_networks(drafts.len());
        next.reserve_connections(cursor as usize);
        for (i, draft) in drafts.iter().enumerate() {
            next.networks[i] = NetworkRecord {
                hidden_node_count: draft.hidden_node_count,
                conn_begin: conn_begin[i],
                conn_end: conn_end[i],
            };
        }

        let bounds = self.chunk_bounds(drafts.len());
        let conn_bounds: Vec<usize> = bounds
            .iter()
            .map(|r| if r.end == 0 { 0 } else { conn_end[r.end - 1] as usize })
            .collect();

        {
            let mut from_rest = next.conn_from.as_mut_slice();
            let mut to_rest = next.conn_to.as_mut_slice();
            let mut weight_rest = next.conn_weight.as_mut_slice();
            let mut info_rest = next.conn_info.as_mut_slice();

            let mut from_chunks = Vec::with_capacity(bounds.len());
            let mut to_chunks = Vec::with_capacity(bounds.len());
            let mut weight_chunks = Vec::with_capacity(bounds.len());
            let mut info_chunks = Vec::with_capacity(bounds.len());
            let mut prev = 0usize;
            for &end in &conn_bounds {
                let (f0, f1) = from_rest.split_at_mut(end - prev);
                from_rest = f1;
                from_chunks.push(f0);
                let (t0, t1) = to_rest.split_at_mut(end - prev);
                to_rest = t1;
                to_chunks.push(t0);
                let (w0, w1) = weight_rest.split_at_mut(end - prev);
                weight_rest = w1;
                weight_chunks.push(w0);
                let (i0, i1) = info_rest.split_at_mut(end - prev);
                info_rest = i1;
                info_chunks.push(i0);
                prev = end;
            }

            thread::scope(|scope| {
                for (((range, from_chunk), to_chunk), (weight_chunk, info_chunk)) in
                    bounds.iter().cloned().zip(from_chunks).zip(to_chunks).zip(weight_chunks.into_iter().zip(info_chunks))
                {
                    let drafts_slice = &drafts[range];
                    scope.spawn(move || write_chunk(drafts_slice, from_chunk, to_chunk, weight_chunk, info_chunk));
                }
            });
        }

        self.population = next;
    }

    /// §4.C, partitioned across the worker pool: assign every new network to a species, then
    /// permute `networks` into contiguous per-species ranges (the connection columns never
    /// move; only the small `NetworkRecord` index travels).
    fn respeciate(&mut self) {
        let population = &self.population;
        let sorter = &self.species_sorter;
        let distance = &self.evolution.distance;
        let bounds = self.chunk_bounds(population.network_count());

        thread::scope(|scope| {
            for range in bounds {
                scope.spawn(move || {
                    for idx in range {
                        let genes = species::genes_of(population, &population.networks[idx]);
                        sorter.sort_into_bucket(idx as u32, &genes, distance);
                    }
                });
            }
        });

        let (order, species_records) = self.species_sorter.finalize();
        self.population.networks = order.iter().map(|&i| self.population.networks[i as usize]).collect();
        self.population.species = species_records;
    }

    fn build_inference_group(&self) -> InferenceGroup {
        let population = &self.population;
        let interface = self.interface;
        let bounds = self.chunk_bounds(population.network_count());

        let chunks: Vec<Vec<InferencePlan>> = thread::scope(|scope| {
            let handles: Vec<_> = bounds
                .into_iter()
                .map(|range| {
                    scope.spawn(move || {
                        range
                            .map(|idx| inference::build_plan(population, &population.networks[idx], interface))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("inference worker panicked")).collect()
        });

        InferenceGroup {
            input_count: self.interface.input_count,
            output_count: self.interface.output_count,
            networks: chunks.into_iter().flatten().collect(),
        }
    }
}

fn build_one(
    job: &Job,
    population: &Population,
    innovation: &InnovationRegistry,
    evolution: &EvolutionConfig,
    interface: InterfaceConfig,
    rng: &mut WyRng,
) -> GenomeDraft {
    let genes_of = |idx: u32| {
        let network = &population.networks[idx as usize];
        (population.connections_of(network).collect::<Vec<_>>(), network.hidden_node_count)
    };

    match *job {
        Job::Champion(idx) => {
            let (genes, hidden) = genes_of(idx);
            mutate::clone_unchanged(&genes, hidden)
        }
        Job::AddConnection(idx) => {
            let (genes, hidden) = genes_of(idx);
            mutate::add_connection(&genes, hidden, interface, innovation, &evolution.weights, rng)
        }
        Job::AddNode(idx) => {
            let (genes, hidden) = genes_of(idx);
            mutate::add_node(&genes, hidden, interface, innovation, rng)
        }
        Job::WeightMutation(idx) => {
            let (genes, hidden) = genes_of(idx);
            mutate::mutate_weights(&genes, hidden, &evolution.weights, &evolution.mutation, rng)
        }
        Job::InSpeciesCrossover(a, a_fitness, b, b_fitness) | Job::InterSpeciesCrossover(a, a_fitness, b, b_fitness) => {
            let (a_genes, a_hidden) = genes_of(a);
            let (b_genes, b_hidden) = genes_of(b);
            let seed = random::draw_seed(rng);
            crossover::crossover(
                &a_genes,
                a_fitness as f64,
                a_hidden,
                &b_genes,
                b_fitness as f64,
                b_hidden,
                evolution.mutation.keep_disabled_rate,
                evolution.fitness_epsilon,
                seed,
            )
        }
    }
}

fn write_chunk(
    drafts: &[GenomeDraft],
    mut from: &mut [crate::arena::NodeIndex],
    mut to: &mut [crate::arena::NodeIndex],
    mut weight: &mut [f64],
    mut info: &mut [crate::arena::ConnectionInfo],
) {
    for draft in drafts {
        let n = draft.connection_count();
        let (f0, f1) = from.split_at_mut(n);
        from = f1;
        let (t0, t1) = to.split_at_mut(n);
        to = t1;
        let (w0, w1) = weight.split_at_mut(n);
        weight = w1;
        let (i0, i1) = info.split_at_mut(n);
        info = i1;
        draft.write_into(f0, t0, w0, i0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ConnectionInfo, ConnectionRef};

    fn trivial_interface() -> InterfaceConfig {
        InterfaceConfig { input_count: 2, output_count: 1 }
    }

    #[test]
    fn evolve_emits_a_generation_span() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut trainer = Trainer::new(EvolutionConfig::default(), trivial_interface(), 4, 1).unwrap();
        let mut group = InferenceGroup::default();
        trainer.evolve(&[0.0; 4], &mut group);
        assert_eq!(trainer.population_size(), 4);
    }

    #[test]
    fn trivial_population_survives_one_generation() {
        let mut evolution = EvolutionConfig::default();
        evolution.mutation.p_add_conn = 0.0;
        evolution.mutation.p_add_node = 0.0;

        let mut trainer = Trainer::new(evolution, trivial_interface(), 4, 1).unwrap();
        let mut group = InferenceGroup::default();
        trainer.evolve(&[0.0; 4], &mut group);

        assert_eq!(trainer.population_size(), 4);
        assert_eq!(trainer.species_count(), 1);
        for i in 0..4 {
            assert_eq!(trainer.network(i).hidden_node_count, 0);
            assert_eq!(trainer.network(i).connection_count(), 0);
        }
        assert_eq!(group.networks.len(), 4);
    }

    #[test]
    fn forced_add_connection_never_exceeds_one_connection() {
        let mut evolution = EvolutionConfig::default();
        evolution.mutation.p_add_conn = 1.0;
        evolution.mutation.p_add_node = 0.0;
        evolution.mutation.p_mutate = 1.0;
        evolution.mutation.min_network_champion_size = usize::MAX; // no champion slot eating the budget

        let mut trainer = Trainer::new(evolution, trivial_interface(), 6, 2).unwrap();
        let mut group = InferenceGroup::default();
        trainer.evolve(&[1.0; 6], &mut group);

        for i in 0..6 {
            assert!(trainer.network(i).connection_count() <= 1);
        }
    }

    #[test]
    fn forced_add_node_expands_a_nonempty_parent() {
        let mut evolution = EvolutionConfig::default();
        evolution.mutation.p_add_node = 1.0;
        evolution.mutation.p_add_conn = 0.0;
        evolution.mutation.p_mutate = 1.0;
        evolution.mutation.min_network_champion_size = 0; // champion slot makes the composition exact

        let interface = InterfaceConfig { input_count: 1, output_count: 1 };
        let mut trainer = Trainer::new(evolution, interface, 5, 1).unwrap();
        trainer.population.conn_from = vec![0, 0, 0, 0, 0];
        trainer.population.conn_to = vec![1, 1, 1, 1, 1];
        trainer.population.conn_weight = vec![0.5, 0.5, 0.5, 0.5, 0.5];
        trainer.population.conn_info = vec![ConnectionInfo::new(true, 0); 5];
        trainer.population.networks = (0..5u32)
            .map(|i| NetworkRecord { hidden_node_count: 0, conn_begin: i, conn_end: i + 1 })
            .collect();
        trainer.innovation.register_or_lookup(0, 1);

        let mut group = InferenceGroup::default();
        trainer.evolve(&[1.0; 5], &mut group);

        // budget = 5: one champion slot (copied unchanged) plus four add-node offspring.
        let mut saw_add_node = false;
        for i in 0..5 {
            let net = trainer.network(i);
            match (net.hidden_node_count, net.connection_count()) {
                (0, 1) => {}
                (1, 3) => saw_add_node = true,
                other => panic!("unexpected network shape {other:?}"),
            }
        }
        assert!(saw_add_node);
    }

    #[test]
    fn hand_built_two_hop_network_matches_manual_computation() {
        let mut pop = Population::new();
        // inputs 0,1 -> hidden 3, hidden 3 -> output 2 (output_base = input_count = 2).
        pop.conn_from = vec![0, 1, 3];
        pop.conn_to = vec![3, 3, 2];
        pop.conn_weight = vec![0.8, -0.6, 1.5];
        pop.conn_info = (0..3).map(|i| ConnectionInfo::new(true, i)).collect();
        let net = NetworkRecord { hidden_node_count: 1, conn_begin: 0, conn_end: 3 };
        let interface = InterfaceConfig { input_count: 2, output_count: 1 };
        let plan = inference::build_plan(&pop, &net, interface);

        let mut out = [0.0];
        eval::evaluate(&plan, &[1.0, 0.0], &mut out);
        let hidden_value = eval::activate(0.8 * 1.0 + -0.6 * 0.0);
        let expected = eval::activate(1.5 * hidden_value);
        assert!((out[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn plan_based_and_naive_evaluation_agree() {
        let mut pop = Population::new();
        pop.conn_from = vec![0, 2];
        pop.conn_to = vec![2, 1];
        pop.conn_weight = vec![1.2, -0.7];
        pop.conn_info = vec![ConnectionInfo::new(true, 0), ConnectionInfo::new(true, 1)];
        let net = NetworkRecord { hidden_node_count: 1, conn_begin: 0, conn_end: 2 };
        let interface = InterfaceConfig { input_count: 1, output_count: 1 };
        let plan = inference::build_plan(&pop, &net, interface);

        let mut out = [0.0];
        eval::evaluate(&plan, &[0.3], &mut out);

        let naive = naive_evaluate(&pop, &net, interface, &[0.3]);
        assert!((out[0] - naive[0]).abs() < 1e-6);
    }

    /// Reference evaluator that walks connections directly (no topological sort), iterating
    /// enough passes to converge on an acyclic graph. Test-only oracle for the plan evaluator.
    fn naive_evaluate(pop: &Population, net: &NetworkRecord, interface: InterfaceConfig, inputs: &[f64]) -> Vec<f64> {
        let total_nodes = interface.input_count + interface.output_count + net.hidden_node_count as usize;
        let mut values = vec![0.0; total_nodes];
        values[..interface.input_count].copy_from_slice(inputs);

        let conns: Vec<ConnectionRef> = pop.connections_of(net).filter(|c| c.enabled()).collect();
        for _ in 0..total_nodes {
            let mut sums = vec![0.0; total_nodes];
            for c in &conns {
                sums[c.to as usize] += values[c.from as usize] * c.weight;
            }
            for node in interface.input_count..total_nodes {
                values[node] = eval::activate(sums[node]);
            }
        }
        values[interface.input_count..interface.input_count + interface.output_count].to_vec()
    }

    macro_rules! thread_count_test {
        ($name:ident, $count:expr) => {
            paste::paste! {
                #[test]
                fn [<evolve_partitions_correctly_with_ $name _threads>]() {
                    let mut evolution = EvolutionConfig::default();
                    evolution.mutation.p_inter_species = 0.1;
                    let mut trainer = Trainer::new(evolution, trivial_interface(), 37, $count).unwrap();
                    let mut group = InferenceGroup::default();
                    for gen in 0..3 {
                        let fitness: Vec<f32> = (0..trainer.population_size() as u32).map(|i| (i % 5) as f32).collect();
                        trainer.evolve(&fitness, &mut group);
                        assert_eq!(trainer.population_size(), 37, "generation {gen} lost or gained networks");
                        assert_eq!(group.networks.len(), 37);
                    }
                }
            }
        };
    }

    thread_count_test!(one, 1);
    thread_count_test!(two, 2);
    thread_count_test!(four, 4);
    thread_count_test!(eight, 8);
}
