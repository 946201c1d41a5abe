//! The innovation registry (`spec.md` §4.B): maps an unordered node pair to a monotone
//! innovation number, shared across all mutation workers within one generation.

use crate::spinlock::Spinlock;

/// `(min(from, to), max(from, to))`, the structural identity a gene is registered under.
pub type NodePair = (u32, u32);

#[derive(Debug, Default)]
struct Inner {
    /// Sorted by pair; `numbers[i]` is the innovation number assigned to `pairs[i]`.
    pairs: Vec<NodePair>,
    numbers: Vec<u64>,
    counter: u64,
}

/// Cleared at the start of every `evolve`: innovation numbers are a per-generation equivalence,
/// not a lifetime history (§9, open question 2).
#[derive(Default)]
pub struct InnovationRegistry {
    inner: Spinlock<Inner>,
}

impl InnovationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.pairs.clear();
        inner.numbers.clear();
        inner.counter = 0;
    }

    /// Locate `(from, to)`'s unordered pair by binary search; on miss, insert in place and
    /// assign the next innovation number. The lock is held only across the search and optional
    /// insertion.
    pub fn register_or_lookup(&self, from: u32, to: u32) -> u64 {
        let pair = (from.min(to), from.max(to));
        let mut inner = self.inner.lock();
        match inner.pairs.binary_search(&pair) {
            Ok(idx) => inner.numbers[idx],
            Err(insert_at) => {
                let number = inner.counter;
                inner.counter += 1;
                inner.pairs.insert(insert_at, pair);
                inner.numbers.insert(insert_at, number);
                number
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
