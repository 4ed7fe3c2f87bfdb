//! Deterministic `DeterministicRng` implementations for tests.

use cadex_core::rng::DeterministicRng;

/// Always draws the lower bound. Shuffling `n` items with it produces one
/// fixed permutation, which is enough for tests that only need *some*
/// stable turn order.
#[derive(Debug, Default)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}

/// Replays scripted draws, clamped into the requested range. Panics when
/// the script runs out, which surfaces a test that draws more often than
/// it expects to.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRng {
    /// Create a new `SequenceRng` replaying `values` in order.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }

    /// Number of scripted draws not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.values.len() - self.index
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        let Some(val) = self.values.get(self.index).copied() else {
            panic!("SequenceRng exhausted after {} draws", self.index);
        };
        self.index += 1;
        val.clamp(min, max)
    }
}
