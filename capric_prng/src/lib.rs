// Deterministic, portable randomness for the Capric composer.
//
// `GameRng` is xoshiro256++ (Blackman & Vigna, 2019) seeded through
// SplitMix64. It is hand-rolled so every platform produces the same song for
// the same seed, and so the workspace never pulls in the `rand` crate.
//
// Generators never name `GameRng` directly. They take `&mut impl
// RandomSource`, whose only required method is `next_u64`; every derived
// draw (floats, ranges, coin flips) is a default method on the trait. That
// keeps the derivation in one place and lets tests feed a `ScriptedRng`
// that replays a fixed list of raw values.
//
// The core generator must stay integer-only. Floating point appears only in
// the derived `next_f64`, which is a pure function of the integer stream.

use serde::{Deserialize, Serialize};

/// Source of random draws used by every composition step.
pub trait RandomSource {
    /// Next raw 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Uniform `f64` in [0, 1), built from the upper 53 bits.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo
    /// bias. Returns `low` when the range is empty.
    fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        let span = high - low;
        if span.is_power_of_two() {
            return low + (self.next_u64() & (span - 1));
        }
        let threshold = span.wrapping_neg() % span;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % span);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`; `low` when empty.
    fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform `usize` in `[low, high]`; `low` when `low > high`.
    fn range_usize_inclusive(&mut self, low: usize, high: usize) -> usize {
        if low > high {
            return low;
        }
        self.range_u64(low as u64, high as u64 + 1) as usize
    }

    /// Uniform `i32` in `[low, high]`; `low` when `low > high`.
    fn range_i32_inclusive(&mut self, low: i32, high: i32) -> i32 {
        if low > high {
            return low;
        }
        let span = (high as i64 - low as i64 + 1) as u64;
        (low as i64 + self.range_u64(0, span) as i64) as i32
    }

    /// `true` with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Xoshiro256++ generator; the only production randomness in the workspace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Seed a generator. Equal seeds give equal streams.
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

    /// Derive an independent generator for a sub-task (one per track), so a
    /// change in one track's draw count does not shift the others.
    pub fn fork(&mut self, salt: u64) -> Self {
        Self::new(self.step() ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    fn step(&mut self) -> u64 {
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
}

impl RandomSource for GameRng {
    fn next_u64(&mut self) -> u64 {
        self.step()
    }
}

/// Replays a fixed cycle of raw values. Handy for pinning a generator's
/// choices in tests: every value `v` maps to `next_f64() == v >> 11 / 2^53`,
/// so `ScriptedRng::from_unit(&[0.0])` makes every coin flip succeed.
#[derive(Clone, Debug)]
pub struct ScriptedRng {
    values: Vec<u64>,
    pos: usize,
}

impl ScriptedRng {
    pub fn new(values: Vec<u64>) -> Self {
        Self { values, pos: 0 }
    }

    /// Build from unit-interval floats, so `next_f64` returns (almost exactly)
    /// the given values in order.
    pub fn from_unit(values: &[f64]) -> Self {
        let raw = values
            .iter()
            .map(|v| {
                let clamped = v.clamp(0.0, 0.999_999_999);
                ((clamped * (1u64 << 53) as f64) as u64) << 11
            })
            .collect();
        Self::new(raw)
    }
}

impl RandomSource for ScriptedRng {
    fn next_u64(&mut self) -> u64 {
        if self.values.is_empty() {
            return 0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn forks_are_deterministic_and_distinct() {
        let mut a = GameRng::new(7);
        let mut b = GameRng::new(7);
        let mut fa = a.fork(1);
        let mut fb = b.fork(1);
        assert_eq!(fa.next_u64(), fb.next_u64());

        let mut c = GameRng::new(7);
        let mut fc = c.fork(2);
        let mut d = GameRng::new(7);
        let mut fd = d.fork(1);
        assert_ne!(fc.next_u64(), fd.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = GameRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_within_bounds() {
        let mut rng = GameRng::new(555);
        for _ in 0..10_000 {
            let v = rng.range_usize(5, 15);
            assert!((5..15).contains(&v), "range_usize out of range: {v}");
        }
    }

    #[test]
    fn range_usize_inclusive_reaches_upper_bound() {
        let mut rng = GameRng::new(1);
        let mut saw_max = false;
        for _ in 0..10_000 {
            let v = rng.range_usize_inclusive(0, 1);
            assert!(v <= 1);
            if v == 1 {
                saw_max = true;
            }
        }
        assert!(saw_max);
    }

    #[test]
    fn range_i32_inclusive_handles_negative_bounds() {
        let mut rng = GameRng::new(31);
        let mut seen = [false; 11];
        for _ in 0..10_000 {
            let v = rng.range_i32_inclusive(-5, 5);
            assert!((-5..=5).contains(&v));
            seen[(v + 5) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn empty_ranges_return_low() {
        let mut rng = GameRng::new(3);
        assert_eq!(rng.range_usize(4, 4), 4);
        assert_eq!(rng.range_usize_inclusive(9, 2), 9);
        assert_eq!(rng.range_i32_inclusive(3, -3), 3);
    }

    #[test]
    fn random_bool_distribution() {
        let mut rng = GameRng::new(42);
        let n = 10_000;
        let hits = (0..n).filter(|_| rng.random_bool(0.5)).count();
        let pct = hits as f64 / n as f64;
        assert!((0.45..0.55).contains(&pct), "got {:.1}%", pct * 100.0);
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = GameRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn scripted_rng_cycles_values() {
        let mut rng = ScriptedRng::new(vec![1, 2, 3]);
        let got: Vec<u64> = (0..5).map(|_| rng.next_u64()).collect();
        assert_eq!(got, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn scripted_rng_from_unit_reproduces_floats() {
        let mut rng = ScriptedRng::from_unit(&[0.25, 0.75]);
        assert!((rng.next_f64() - 0.25).abs() < 1e-9);
        assert!((rng.next_f64() - 0.75).abs() < 1e-9);
        assert!(rng.random_bool(0.3));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = GameRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: GameRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
