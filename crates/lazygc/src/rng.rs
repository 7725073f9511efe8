//! Pseudo-random engine for the automatic-sweep countdown.
//!
//! The heap only needs a few bits of jitter per reseed, so this is a small
//! hand-rolled generator rather than a dependency. Not suitable for
//! anything security-sensitive.

// ── XorShift64Star ───────────────────────────────────────────────────────────

/// xorshift64* engine: 64-bit state, period 2^64-1.
///
/// The state must never be zero; a zero seed is replaced by a fixed
/// non-zero constant.
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    /// Fallback seed used when the caller passes 0.
    const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

    /// Create a new engine from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { Self::DEFAULT_SEED } else { seed },
        }
    }

    /// Generate a raw u64 value.
    pub fn generate_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Generate a value in `0..bound`. `bound` must be non-zero.
    ///
    /// Uses a plain modulo; the tiny bias is irrelevant for scheduling
    /// jitter.
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        self.generate_u64() % bound
    }
}
