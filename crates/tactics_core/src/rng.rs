//! Seeded randomness for behaviors.
//!
//! The core never touches system randomness. Anything random (which ally to
//! protect, which template to spawn) draws from a [`DeterministicRng`] owned
//! by the battle, so a seed fully determines a run.

use serde::{Deserialize, Serialize};

/// SplitMix64 generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Create a generator from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `0..upper`. Returns 0 when `upper` is 0.
    pub fn next_below(&mut self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() % u64::from(upper)) as u32
    }

    /// Uniformly chosen element.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.next_below(items.len() as u32) as usize;
        items.get(index)
    }

    /// Weighted pick: each item is chosen with probability `weight / total`.
    ///
    /// Returns `None` for an empty slice or when every weight is zero.
    pub fn weighted_choice<'a, T>(
        &mut self,
        items: &'a [T],
        weight: impl Fn(&T) -> u32,
    ) -> Option<&'a T> {
        let total: u32 = items.iter().map(&weight).sum();
        if total == 0 {
            return None;
        }

        let roll = self.next_below(total);
        let mut cumulative = 0;
        for item in items {
            cumulative += weight(item);
            if roll < cumulative {
                return Some(item);
            }
        }
        None
    }
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}
