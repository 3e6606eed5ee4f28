//! Frozen seeded random number generator driving all quiz shuffles.
//!
//! The teacher client and every student client derive the same per-student
//! permutations independently, so the generator must produce bit-identical
//! output for identical inputs on every call, in any process, on any platform.
//! The algorithm is therefore FROZEN: a rolling 31-multiplier hash folds the
//! seed string into 32 bits of state, and a linear-congruential step function
//! (Numerical Recipes constants) produces each draw. Do not change either
//! constant: doing so silently desynchronizes mixed-version fleets. The
//! golden tests below pin the exact sequences.
//!
//! This module is pure and total: it performs no I/O, has no failure mode,
//! and treats empty and single-element inputs as the identity permutation.
//!
//! # Usage
//!
//! ```
//! use livequiz::rng::{shuffle, permutation, SeededRng};
//!
//! let mut items = vec!["a", "b", "c", "d"];
//! shuffle("session-9-student-3-questions", &mut items);
//!
//! // Identical seed, identical order, every time.
//! let order = permutation("session-9-student-3-questions", 4);
//! # let _ = (items, order);
//! ```

/// Multiplier of the linear-congruential step.
const LCG_MULTIPLIER: u32 = 1_664_525;

/// Increment of the linear-congruential step.
const LCG_INCREMENT: u32 = 1_013_904_223;

/// Multiplier of the rolling seed hash.
const SEED_HASH_MULTIPLIER: u32 = 31;

/// Deterministic 32-bit generator seeded from an opaque seed string.
///
/// Not statistically strong and NOT cryptographically secure; its single job
/// is portable, reproducible shuffling of small lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// Creates a generator from a seed string via the frozen rolling hash.
    ///
    /// The empty string maps to state 0, which is a valid starting point:
    /// the additive LCG constant moves it on the first step.
    #[must_use]
    pub fn from_seed_str(seed: &str) -> Self {
        let mut state: u32 = 0;
        for &byte in seed.as_bytes() {
            state = state
                .wrapping_mul(SEED_HASH_MULTIPLIER)
                .wrapping_add(u32::from(byte));
        }
        Self { state }
    }

    /// Advances the generator and returns the next 32-bit value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Returns a uniformly distributed index in `[0, bound)`.
    ///
    /// Uses the multiply-shift reduction, which is integer-only and identical
    /// on every platform. `bound == 0` returns 0 without advancing semantics
    /// worth preserving (the caller never asks for an index into nothing).
    #[inline]
    #[must_use]
    pub fn gen_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((u64::from(self.next_u32()) * bound as u64) >> 32) as usize
    }
}

/// Shuffles `items` in place with a Fisher–Yates walk driven by `seed`.
///
/// Identical `(seed, items)` produce an identical permutation on every call.
/// Zero- and one-element slices are left untouched.
pub fn shuffle<T>(seed: &str, items: &mut [T]) {
    if items.len() < 2 {
        return;
    }
    let mut rng = SeededRng::from_seed_str(seed);
    for i in (1..items.len()).rev() {
        let j = rng.gen_index(i + 1);
        items.swap(i, j);
    }
}

/// Returns the permutation `shuffle(seed, ..)` applies to a list of length `len`.
///
/// `result[shuffled_position] == canonical_position`; this is how canonical
/// question and option identity survives per-student reordering.
#[must_use]
pub fn permutation(seed: &str, len: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    shuffle(seed, &mut indices);
    indices
}


// =============================================================================
// Property-Based Tests
// =============================================================================
