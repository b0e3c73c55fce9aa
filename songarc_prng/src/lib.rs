// Deterministic, portable pseudo-random number generator for song planning.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding,
// plus a small stable hasher used for seeded yes/no decisions that must not
// consume generator state (base-reference selection in the variation planner).
//
// This crate is the single source of randomness for `songarc_plan`: template
// selection, tension jitter, per-bar micro jitter, and variation hashing all
// go through it. Swapping the algorithm changes every golden output, so the
// generator and the seed-derivation helpers are part of the planner's contract.
//
// **Critical constraint: determinism.** Every method must produce identical
// output given the same prior state, regardless of platform, compiler version,
// or optimization level. The core generator uses integer arithmetic only; the
// float helpers derive from the integer stream by exact bit shifts.

use serde::{Deserialize, Serialize};

/// Multiplier used when deriving a per-section sub-seed from the song seed.
pub const SECTION_SEED_STRIDE: u64 = 397;

/// Xoshiro256++ PRNG seeded from a single `u64`.
///
/// Each planning stage owns its own `PlanRng`, seeded deterministically from
/// the song seed, so stages never perturb one another's streams.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanRng {
    s: [u64; 4],
}

impl PlanRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `PlanRng` instances created with the same seed produce identical
    /// output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1).
    ///
    /// Uses the upper 53 bits of a `u64` to fill the mantissa of an f64.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a value in [-0.5, 0.5), the shape every jitter term uses.
    pub fn next_centered(&mut self) -> f64 {
        self.next_f64() - 0.5
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }
}

/// Derive the sub-seed for section `index`: `seed XOR (index × 397)`.
///
/// Sub-seeds differ by position but are fully determined by the song seed.
pub fn mix_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(SECTION_SEED_STRIDE)
}

/// FNV-1a accumulator with a SplitMix64 finalizer.
///
/// Used where a decision must be a pure function of its inputs rather than a
/// draw from a shared stream. Field order matters: callers must write fields
/// in a fixed order.
#[derive(Clone, Debug)]
pub struct StableHasher {
    state: u64,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StableHasher {
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes the string bytes followed by a 0xff terminator so that adjacent
    /// strings cannot alias ("ab","c" vs "a","bc").
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes());
        self.write_bytes(&[0xff])
    }

    pub fn finish(&self) -> u64 {
        let mut z = self.state;
        splitmix64(&mut z)
    }

    /// The finished hash reduced to `0..100`.
    pub fn percent(&self) -> u8 {
        (self.finish() % 100) as u8
    }
}

/// SplitMix64 step, used for seeding and as the hash finalizer.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
