//! Signed Qm.n fixed-point arithmetic used for current accumulation and
//! synaptic weights.
//!
//! Accumulating many synaptic contributions in floating point is
//! order-dependent, and summation needs to be deterministic regardless of
//! the order terminals are visited in. A saturating fixed-point accumulator
//! is associative and commutative up to saturation, which floating point
//! addition is not.

/// Number of bits reserved so that ~32 simultaneous max-weight incoming
/// spikes cannot silently wrap the accumulator.
const HEADROOM_BITS: u32 = 5;

/// A signed Qm.n fixed-point value stored in a 32-bit integer.
///
/// `fbits` fractional bits are shared across every value produced by the
/// same [`FixedPointFormat`]; the raw integer is therefore only meaningful
/// alongside the format that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(pub i32);

impl Fixed {
    /// The representable zero value in any format.
    pub const ZERO: Fixed = Fixed(0);

    /// Raw underlying integer.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// Chosen fractional-bit count for a finalized network, plus the
/// conversions and saturating arithmetic that depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointFormat {
    fbits: u32,
}

impl FixedPointFormat {
    /// Build a format from an explicit fractional-bit count.
    pub fn with_fbits(fbits: u32) -> Self {
        debug_assert!(fbits < 31, "fbits must leave a sign bit and headroom");
        Self { fbits }
    }

    /// Derive the fractional-bit count from the largest absolute synaptic
    /// weight that will be stored:
    /// `fbits = 31 − ceil(log2(max_abs_weight)) − 5`.
    pub fn for_max_abs_weight(max_abs_weight: f64) -> Self {
        let max_abs_weight = if max_abs_weight <= 0.0 {
            1.0
        } else {
            max_abs_weight
        };
        let integer_bits = max_abs_weight.log2().ceil().max(0.0) as u32;
        let fbits = 31u32
            .saturating_sub(integer_bits)
            .saturating_sub(HEADROOM_BITS);
        Self { fbits: fbits.max(1) }
    }

    /// The fractional-bit count this format uses.
    pub const fn fbits(self) -> u32 {
        self.fbits
    }

    /// Convert a float into this fixed-point format, saturating at the
    /// representable range.
    pub fn from_f32(self, value: f32) -> Fixed {
        let scaled = (value as f64) * (1i64 << self.fbits) as f64;
        let clamped = scaled.clamp(i32::MIN as f64, i32::MAX as f64);
        Fixed(clamped as i32)
    }

    /// Convert a fixed-point value back to float.
    pub fn to_f32(self, value: Fixed) -> f32 {
        (value.0 as f64 / (1i64 << self.fbits) as f64) as f32
    }

    /// Saturating add, returning the sum and whether saturation occurred.
    ///
    /// Overflow is non-fatal: the caller is told so it can set a diagnostic
    /// overflow bit, but the cycle pipeline keeps running.
    pub fn saturating_add(self, a: Fixed, b: Fixed) -> (Fixed, bool) {
        match a.0.checked_add(b.0) {
            Some(sum) => (Fixed(sum), false),
            None => {
                let saturated = if b.0 > 0 { i32::MAX } else { i32::MIN };
                (Fixed(saturated), true)
            }
        }
    }

    /// Clamp a weight into `[floor, ceiling]`, both given in this format.
    pub fn clamp(self, value: Fixed, floor: Fixed, ceiling: Fixed) -> Fixed {
        Fixed(value.0.clamp(floor.0, ceiling.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_close() {
        let fmt = FixedPointFormat::for_max_abs_weight(10.0);
        for v in [0.0f32, 1.5, -3.25, 9.9, -9.9] {
            let fx = fmt.from_f32(v);
            let back = fmt.to_f32(fx);
            assert!((back - v).abs() < 0.01, "{v} round-tripped to {back}");
        }
    }

    #[test]
    fn saturating_add_detects_overflow() {
        let fmt = FixedPointFormat::with_fbits(0);
        let a = Fixed(i32::MAX - 1);
        let b = Fixed(10);
        let (sum, overflowed) = fmt.saturating_add(a, b);
        assert!(overflowed);
        assert_eq!(sum.0, i32::MAX);
    }

    #[test]
    fn saturating_add_commutative_and_associative_up_to_saturation() {
        let fmt = FixedPointFormat::for_max_abs_weight(4.0);
        let values = [
            fmt.from_f32(1.0),
            fmt.from_f32(-2.0),
            fmt.from_f32(3.5),
            fmt.from_f32(-0.25),
        ];
        let forward = values
.iter()
.fold(Fixed::ZERO, |acc, &v| fmt.saturating_add(acc, v).0);
        let backward = values
.iter()
.rev()
.fold(Fixed::ZERO, |acc, &v| fmt.saturating_add(acc, v).0);
        assert_eq!(forward, backward);
    }

    #[test]
    fn clamp_respects_bounds() {
        let fmt = FixedPointFormat::for_max_abs_weight(10.0);
        let floor = fmt.from_f32(0.0);
        let ceiling = fmt.from_f32(5.0);
        let too_high = fmt.from_f32(9.0);
        let clamped = fmt.clamp(too_high, floor, ceiling);
        assert_eq!(clamped, ceiling);
    }

    #[test]
    fn fbits_rule_reserves_headroom() {
        let fmt = FixedPointFormat::for_max_abs_weight(4.0);
        // max_abs_weight=4 -> integer_bits=2 -> fbits = 31-2-5 = 24
        assert_eq!(fmt.fbits(), 24);
    }
}
