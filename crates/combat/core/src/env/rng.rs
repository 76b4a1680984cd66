//! RNG oracle for deterministic random number generation.
//!
//! Every combat roll (hit tables, proc chances, damage variance) draws from
//! an injected [`RngOracle`]. Implementations must be deterministic: given
//! the same seed they must produce the same value, so a fight can be
//! replayed from its event log.

/// RNG oracle for deterministic random number generation.
pub trait RngOracle: Send + Sync {
    /// Generate a random u32 value from a seed.
    fn next_u32(&self, seed: u64) -> u32;

    /// Roll in `0..bound` (exclusive). The hit tables roll `0..10000`.
    fn roll(&self, seed: u64, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.next_u32(seed) % bound
    }

    /// Percent check: true with probability `chance` (clamped to 0..=100).
    fn roll_chance(&self, seed: u64, chance: f32) -> bool {
        if chance <= 0.0 {
            return false;
        }
        if chance >= 100.0 {
            return true;
        }
        // Basis-point resolution matches the hit tables.
        self.roll(seed, 10_000) < (chance * 100.0) as u32
    }

    /// Random value in `[min, max]` inclusive.
    fn range(&self, seed: u64, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        let range = max - min + 1;
        min + (self.next_u32(seed) % range)
    }
}

/// PCG random number generator (Permuted Congruential Generator).
///
/// PCG-XSH-RR: 32-bit output permuted from 64-bit state. Deterministic,
/// single multiply + xorshift + rotate, passes PractRand/TestU01.
///
/// Reference: <https://www.pcg-random.org/>
#[derive(Clone, Copy, Debug, Default)]
pub struct PcgRng;

impl PcgRng {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    /// Advance the LCG state by one step.
    #[inline]
    fn pcg_step(state: u64) -> u64 {
        state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT)
    }

    /// XSH-RR output permutation (xorshift high, random rotate).
    #[inline]
    fn pcg_output(state: u64) -> u32 {
        let xorshifted = (((state >> 18) ^ state) >> 27) as u32;
        let rot = (state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

impl RngOracle for PcgRng {
    fn next_u32(&self, seed: u64) -> u32 {
        let state = Self::pcg_step(seed);
        Self::pcg_output(state)
    }
}

/// Compute a deterministic seed from combat state components.
///
/// * `combat_seed` - base seed fixed when the arena is created
/// * `nonce` - event sequence number (increments per resolved action)
/// * `actor_id` - unit performing the roll
/// * `context` - distinguishes multiple rolls inside one action
///   (0 = hit table, 1 = reflect, 2 = proc chance)
pub fn compute_seed(combat_seed: u64, nonce: u64, actor_id: u32, context: u32) -> u64 {
    // SplitMix64 / FxHash style mixing constants.
    let mut hash = combat_seed;
    hash ^= nonce.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= (actor_id as u64).wrapping_mul(0x517cc1b727220a95);
    hash ^= (context as u64).wrapping_mul(0x85ebca6b);

    // Final avalanche step.
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;

    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcg_is_deterministic() {
        let rng = PcgRng;
        assert_eq!(rng.next_u32(42), rng.next_u32(42));
        assert_ne!(rng.next_u32(42), rng.next_u32(43));
    }

    #[test]
    fn roll_stays_in_bound() {
        let rng = PcgRng;
        for seed in 0..100u64 {
            assert!(rng.roll(seed, 10_000) < 10_000);
        }
    }

    #[test]
    fn roll_chance_extremes_are_exact() {
        let rng = PcgRng;
        assert!(!rng.roll_chance(1, 0.0));
        assert!(!rng.roll_chance(1, -5.0));
        assert!(rng.roll_chance(1, 100.0));
    }

    #[test]
    fn compute_seed_separates_contexts() {
        let a = compute_seed(7, 1, 2, 0);
        let b = compute_seed(7, 1, 2, 1);
        assert_ne!(a, b);
    }
}
