//! Configuration surface for the trainer. Loading these from a file, env vars, or a CLI is a
//! harness concern and lives outside this crate; here we only define the shapes and the
//! defaults the evolution pipeline is tuned against.

/// Mutation-related probabilities and thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationConfig {
    pub p_add_conn: f64,
    pub p_add_node: f64,
    pub p_inter_species: f64,
    pub keep_disabled_rate: f64,
    pub p_mutate: f64,
    pub p_network_mutation: f64,
    pub p_uniform_mutation: f64,
    pub min_network_champion_size: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            p_add_conn: 0.05,
            p_add_node: 0.03,
            p_inter_species: 0.001,
            keep_disabled_rate: 0.75,
            p_mutate: 0.25,
            p_network_mutation: 0.8,
            p_uniform_mutation: 0.9,
            min_network_champion_size: 5,
        }
    }
}

/// Extinction-filter bounds applied to a species before ancestor sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtinctionConfig {
    pub max_remove_population_portion: f64,
    pub max_remove_score_portion: f64,
}

impl Default for ExtinctionConfig {
    fn default() -> Self {
        Self {
            max_remove_population_portion: 0.2,
            max_remove_score_portion: 0.2,
        }
    }
}

/// Range a freshly-drawn or perturbed connection weight is pulled from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    pub weight_min: f64,
    pub weight_max: f64,
    pub offset_min: f64,
    pub offset_max: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            weight_min: 0.0,
            weight_max: 1.0,
            offset_min: -0.01,
            offset_max: 0.01,
        }
    }
}

/// Coefficients for the compatibility-distance formula used by the species sorter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConfig {
    pub threshold: f64,
    pub c_excess: f64,
    pub c_disjoint: f64,
    pub c_avg_weight: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            c_excess: 1.0,
            c_disjoint: 1.0,
            c_avg_weight: 0.4,
        }
    }
}

/// Top-level knob bag for one trainer instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvolutionConfig {
    pub mutation: MutationConfig,
    pub extinction: ExtinctionConfig,
    pub weights: WeightConfig,
    pub distance: DistanceConfig,
    /// Tie tolerance for "matching fitness" in crossover.
    pub fitness_epsilon: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mutation: MutationConfig::default(),
            extinction: ExtinctionConfig::default(),
            weights: WeightConfig::default(),
            distance: DistanceConfig::default(),
            fitness_epsilon: 0.001,
        }
    }
}

/// Fixed input/output arity for the whole run. Does not change after `Trainer::new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub input_count: usize,
    pub output_count: usize,
}
