//! Degenerate-input faults (`spec.md` §7). Contract violations are not represented here; those
//! are programmer error and are reported with `panic!`/`debug_assert!` at the call site instead.

use thiserror::Error;

/// Failures that can occur while turning a species' survivors into offspring.
///
/// None of these should ever reach a caller of [`crate::trainer::Trainer::evolve`]: the
/// budgeting pass (`crate::budget`) is responsible for never requesting more of a category than
/// the species can support, per the degenerate-input policies in §7. This type exists so that
/// the internal reproduction helpers can fail loudly during development rather than silently
/// producing a truncated offspring arena.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReproduceError {
    #[error("wanted {wanted} crossover offspring from {available} species members, need at least 2")]
    TooFewForCrossover { wanted: usize, available: usize },

    #[error("wanted {wanted} offspring copied from an empty species")]
    TooFewForCopy { wanted: usize },

    #[error("wanted {wanted} offspring from an empty species")]
    EmptySpecies { wanted: usize },
}
