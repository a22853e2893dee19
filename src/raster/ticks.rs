//! Signed 64-bit tick arithmetic on 32-bit words.
//!
//! Mirrors what a shader without `int64` support has to do: positions travel
//! as `(lo, hi)` word pairs, the window shift is added with an explicit carry,
//! and negative results are folded back through two's complement while
//! converting to float.

/// A signed 64-bit tick split into two's-complement 32-bit words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SplitTick {
    pub lo: u32,
    pub hi: u32,
}

const WORD: f64 = 4_294_967_296.0;
const SIGN_BIT: u32 = 0x8000_0000;

impl SplitTick {
    pub const fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    pub const fn from_i64(value: i64) -> Self {
        let bits = value as u64;
        Self {
            lo: bits as u32,
            hi: (bits >> 32) as u32,
        }
    }

    pub const fn to_i64(self) -> i64 {
        (((self.hi as u64) << 32) | self.lo as u64) as i64
    }

    pub const fn is_negative(self) -> bool {
        self.hi & SIGN_BIT != 0
    }

    /// Add-with-carry on the low words, carry-propagated add on the high words.
    pub fn wrapping_add(self, rhs: SplitTick) -> SplitTick {
        let (lo, carry) = add_with_carry(self.lo, rhs.lo);
        let hi = self.hi.wrapping_add(rhs.hi).wrapping_add(carry);
        SplitTick { lo, hi }
    }

    /// Two's-complement negation: invert both words, then add one with carry.
    pub fn wrapping_neg(self) -> SplitTick {
        SplitTick::new(!self.lo, !self.hi).wrapping_add(SplitTick::new(1, 0))
    }

    /// Signed float conversion.
    ///
    /// Negative values are inverted word by word, which yields `|v| - 1`; the
    /// missing one is added back after the conversion.
    pub fn to_f32(self) -> f32 {
        let negative = self.is_negative();
        let (lo, hi) = if negative {
            (!self.lo, !self.hi)
        } else {
            (self.lo, self.hi)
        };
        let magnitude = hi as f64 * WORD + lo as f64;
        if negative {
            (-magnitude - 1.0) as f32
        } else {
            magnitude as f32
        }
    }
}

impl From<i64> for SplitTick {
    fn from(value: i64) -> Self {
        SplitTick::from_i64(value)
    }
}

/// `uaddCarry`: 32-bit sum plus the carry out (0 or 1).
#[inline]
pub fn add_with_carry(a: u32, b: u32) -> (u32, u32) {
    let (sum, overflow) = a.overflowing_add(b);
    (sum, overflow as u32)
}

/// Flattens ticks into `[lo0, hi0, lo1, hi1, ...]`, the layout the emulated
/// kernel variants bind.
pub fn split_ticks(ticks: &[i64]) -> Vec<u32> {
    let mut words = Vec::with_capacity(ticks.len() * 2);
    for &tick in ticks {
        let split = SplitTick::from_i64(tick);
        words.push(split.lo);
        words.push(split.hi);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn assert_matches_native(tick: i64, shift: i64) {
        let emulated = SplitTick::from(tick).wrapping_add(SplitTick::from(shift));
        let native = tick.wrapping_add(shift);
        assert_eq!(emulated.to_i64(), native, "{tick} + {shift}");

        let expected = native as f32;
        let got = emulated.to_f32();
        let tolerance = expected.abs() * f32::EPSILON;
        assert!(
            (got - expected).abs() <= tolerance,
            "{tick} + {shift}: {got} vs {expected}"
        );
    }

    #[test]
    fn carry_crosses_word_boundary() {
        assert_eq!(add_with_carry(u32::MAX, 1), (0, 1));
        assert_eq!(add_with_carry(7, 8), (15, 0));
        let sum = SplitTick::from(0xffff_ffff).wrapping_add(SplitTick::from(1));
        assert_eq!(sum, SplitTick::new(0, 1));
    }

    #[test]
    fn negative_results_fold_the_plus_one() {
        assert_eq!(SplitTick::from(-1).to_f32(), -1.0);
        assert_eq!(SplitTick::from(-4096).to_f32(), -4096.0);
        assert_eq!(SplitTick::from(i64::MIN).to_f32(), i64::MIN as f32);
        assert_eq!(SplitTick::from(10).wrapping_add(SplitTick::from(-25)).to_f32(), -15.0);
    }

    #[test]
    fn negation_matches_native() {
        for v in [0i64, 1, -1, 0xffff_ffff, -0x1_0000_0000, 5_000_000_000, i64::MIN, i64::MAX] {
            assert_eq!(SplitTick::from(v).wrapping_neg().to_i64(), v.wrapping_neg(), "{v}");
        }
    }

    #[test]
    fn boundary_sums_match_native() {
        let edges = [
            0,
            1,
            -1,
            i32::MAX as i64,
            i32::MIN as i64,
            u32::MAX as i64,
            -(u32::MAX as i64),
            1 << 53,
            -(1 << 53) - 1,
            i64::MAX,
            i64::MIN,
        ];
        for &a in &edges {
            for &b in &edges {
                assert_matches_native(a, b);
            }
        }
    }

    #[test]
    fn random_sums_match_native() {
        let mut rng = StdRng::seed_from_u64(0x64_b17);
        for _ in 0..20_000 {
            // Mix full-range values with timebase-sized ones.
            let a: i64 = if rng.gen_bool(0.5) {
                rng.gen()
            } else {
                rng.gen_range(-(1i64 << 40)..(1i64 << 40))
            };
            let b: i64 = rng.gen_range(-(1i64 << 40)..(1i64 << 40));
            assert_matches_native(a, b);
        }
    }

    #[test]
    fn split_layout_is_lo_then_hi() {
        assert_eq!(split_ticks(&[1, -1]), vec![1, 0, u32::MAX, u32::MAX]);
    }
}
