pub mod arena;
pub mod budget;
pub mod config;
pub mod crossover;
pub mod error;
pub mod eval;
pub mod inference;
pub mod innovation;
pub mod mutate;
pub mod random;
pub mod species;
pub mod spinlock;
pub mod trainer;

pub use arena::{ConnectionInfo, ConnectionRef, GenomeDraft, NetworkRecord, Population, SpeciesRecord};
pub use config::{DistanceConfig, EvolutionConfig, ExtinctionConfig, InterfaceConfig, MutationConfig, WeightConfig};
pub use error::ReproduceError;
pub use eval::{activate, ACTIVATION_STEEPNESS};
pub use inference::{InferencePlan, PlanNode};
pub use trainer::{evaluate, InferenceGroup, Trainer};
