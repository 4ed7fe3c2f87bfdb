//! Random number generator abstraction for determinism.
//!
//! In production, this wraps a real RNG. In tests, a seeded or
//! scripted implementation is injected.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;
}

/// Production RNG seeded from the operating system.
#[derive(Debug)]
pub struct SystemRng(StdRng);

impl SystemRng {
    /// Creates an RNG seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Creates an RNG with a fixed seed, for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for SystemRng {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicRng for SystemRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        self.0.random_range(min..=max)
    }
}

/// Shuffles `items` in place with Fisher–Yates, drawing from `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn DeterministicRng) {
    for i in (1..items.len()).rev() {
        let upper = u32::try_from(i).unwrap_or(u32::MAX);
        let j = rng.next_u32_range(0, upper) as usize;
        items.swap(i, j.min(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_stays_in_range() {
        let mut rng = SystemRng::seeded(7);
        for _ in 0..100 {
            let v = rng.next_u32_range(3, 5);
            assert!((3..=5).contains(&v));
        }
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut rng = SystemRng::seeded(42);
        let mut items: Vec<u32> = (0..20).collect();

        shuffle(&mut items, &mut rng);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_draws_once_per_swap() {
        struct Counting(u32);
        impl DeterministicRng for Counting {
            fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
                self.0 += 1;
                min
            }
        }
        let mut rng = Counting(0);
        let mut items = vec!['a', 'b', 'c', 'd'];

        shuffle(&mut items, &mut rng);

        assert_eq!(rng.0, 3);
        assert_eq!(items, vec!['b', 'c', 'd', 'a']);
    }

    #[test]
    fn test_shuffle_of_empty_and_single_is_noop() {
        let mut rng = SystemRng::seeded(1);
        let mut empty: Vec<u8> = Vec::new();
        shuffle(&mut empty, &mut rng);
        assert!(empty.is_empty());

        let mut single = vec![9];
        shuffle(&mut single, &mut rng);
        assert_eq!(single, vec![9]);
    }
}
