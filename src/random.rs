//! RNG plumbing shared across the evolution pipeline.
//!
//! Two RNG roles exist during `evolve`: a per-thread *primary* stream used for ordinary
//! mutation/crossover coin flips, and a per-offspring *secondary* stream that crossover reseeds
//! deterministically so that its counting pass and emitting pass agree on every tie-break
//! (`spec.md` §4.F).

use rand::{RngCore, SeedableRng};
use std::io::{self, Read};

/// A small, fast, non-cryptographic RNG. Good enough for evolutionary search, and cheap enough
/// to spin up fresh per offspring for the crossover tie-break trick without it mattering.
#[derive(Clone)]
pub struct WyRng {
    state: u64,
}

impl WyRng {
    pub fn seeded(state: u64) -> Self {
        Self { state }
    }
}

impl SeedableRng for WyRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::seeded(u64::from_le_bytes(seed))
    }
}

impl RngCore for WyRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        const WY_CONST_0: u64 = 0x2d35_8dcc_aa6c_78a5;
        const WY_CONST_1: u64 = 0x8bb8_4b93_962e_acc9;
        self.state = self.state.wrapping_add(WY_CONST_0);
        let t = u128::from(self.state) * u128::from(self.state ^ WY_CONST_1);
        (t as u64) ^ (t >> 64) as u64
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let mut idx = 0;
        while idx < dst.len() {
            let lim = core::cmp::min(8, dst.len() - idx);
            dst[idx..idx + lim].copy_from_slice(&self.next_u64().to_ne_bytes()[..lim]);
            idx += lim;
        }
    }
}

/// Scale a whole percent into a `u64` threshold such that `rng.next_u64() < percent(p)` passes
/// with probability `p / 100`.
pub const fn percent(p: u64) -> u64 {
    p.saturating_mul(u64::MAX / 100)
}

/// Draw a `bool` that is `true` with probability `p` (clamped to `[0, 1]`).
pub fn bernoulli(rng: &mut impl RngCore, p: f64) -> bool {
    let p = p.clamp(0.0, 1.0);
    (rng.next_u64() as f64) < p * (u64::MAX as f64)
}

/// Seed drawn from `/dev/urandom`, used to seed a thread's primary RNG at worker-pool startup.
pub fn seed_urandom() -> io::Result<u64> {
    let mut file = std::fs::File::open("/dev/urandom")?;
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Fallback seed derived from the current time, used where `/dev/urandom` is unavailable.
pub fn seed_time() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// Best-effort seed for a fresh per-thread RNG.
pub fn fresh_seed() -> u64 {
    seed_urandom().unwrap_or_else(|_| seed_time())
}

/// Draw a fresh 64-bit seed from an existing RNG stream. Used by crossover's counting pass to
/// mint the per-offspring secondary-stream seed that the emitting pass later replays.
pub fn draw_seed(rng: &mut impl RngCore) -> u64 {
    rng.next_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wyrng_same_seed_same_stream() {
        let mut a = WyRng::seeded(42);
        let mut b = WyRng::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn wyrng_different_seed_diverges() {
        let mut a = WyRng::seeded(1);
        let mut b = WyRng::seeded(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0), 0);
        assert!(percent(100) >= u64::MAX - (u64::MAX / 100));
    }

    #[test]
    fn bernoulli_extremes() {
        let mut rng = WyRng::seeded(7);
        assert!(!bernoulli(&mut rng, 0.0));
        assert!(bernoulli(&mut rng, 1.0));
    }
}
