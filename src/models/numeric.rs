//! Fixed-point arithmetic primitives shared by both converter backends.
//!
//! The unit system is chosen so that products and quotients stay exact in
//! integer math: `µV × nA = fW` and `fW / µV = nA`. Fractional quantities
//! carry an explicit scale suffix (`n4`, `n8`, `n20`, `n28`): the value is
//! stored as an integer times 2^-n. Every operation saturates instead of
//! wrapping, matching the overflow policy of the deployed firmware.

/// Number of buckets per axis in the efficiency lookup tables.
pub const LUT_SIZE: usize = 12;

/// Power in femtowatts from a voltage in microvolts and a current in
/// nanoamperes. `u32 × u32` cannot overflow `u64`, so this is exact.
pub fn power_fw(voltage_uv: u32, current_na: u32) -> u64 {
    u64::from(voltage_uv) * u64::from(current_na)
}

/// Applies an n8 fraction (efficiency, 256 = unity) to a power value.
pub fn scale_n8(power_fw: u64, eta_n8: u32) -> u64 {
    power_fw.saturating_mul(u64::from(eta_n8)) >> 8
}

/// Applies an n4 multiplier (inverse efficiency, 16 = unity) to a power value.
pub fn scale_n4(power_fw: u64, inv_eta_n4: u32) -> u64 {
    power_fw.saturating_mul(u64::from(inv_eta_n4)) >> 4
}

/// Current in nanoamperes drawn from a power at a rail voltage.
///
/// The divisor is floored at 1 µV so a fully drained rail charges from
/// incoming power instead of dividing by zero.
pub fn current_na(power_fw: u64, voltage_uv: u32) -> u64 {
    power_fw / u64::from(voltage_uv.max(1))
}

/// log2-bucket index into a lookup table.
///
/// The value is pre-shifted, then bucketed by the position of its most
/// significant set bit (floor rule: 1 maps to bucket 1, 2..=3 to bucket 2,
/// 4..=7 to bucket 3, ...). Zero maps to bucket 0 and the result is clamped
/// into table bounds, so the index is never out of range.
pub fn lut_index(value: u32, shift: u32) -> usize {
    let scaled = if shift >= 32 { 0 } else { value >> shift };
    if scaled == 0 {
        return 0;
    }
    let msb = 32 - scaled.leading_zeros();
    (msb as usize).min(LUT_SIZE - 1)
}

/// Pre-shift that spreads values up to `max_value` over the full bucket
/// range, derived from the bit width of the largest representable reading.
pub fn lut_shift(max_value: u32) -> u32 {
    let bits = 32 - max_value.leading_zeros();
    bits.saturating_sub(LUT_SIZE as u32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_units_compose_exactly() {
        // 2.5 V * 10 mA = 25 mW = 2.5e13 fW
        assert_eq!(power_fw(2_500_000, 10_000_000), 25_000_000_000_000);
        // and back: fW / µV = nA
        assert_eq!(current_na(25_000_000_000_000, 2_500_000), 10_000_000);
    }

    #[test]
    fn unity_scales_are_identity() {
        assert_eq!(scale_n8(123_456_789, 256), 123_456_789);
        assert_eq!(scale_n4(123_456_789, 16), 123_456_789);
    }

    #[test]
    fn half_efficiency_halves_power() {
        assert_eq!(scale_n8(1_000_000, 128), 500_000);
    }

    #[test]
    fn scaling_saturates_instead_of_wrapping() {
        let p = scale_n4(u64::MAX, 32);
        assert_eq!(p, u64::MAX >> 4);
    }

    #[test]
    fn drained_rail_does_not_divide_by_zero() {
        assert_eq!(current_na(1_000, 0), 1_000);
    }

    // Characterization of the bucketing rule: floor-style MSB position,
    // zero in bucket 0, clamped at the table bound.
    #[test]
    fn lut_index_floor_rule() {
        assert_eq!(lut_index(0, 0), 0);
        assert_eq!(lut_index(1, 0), 1);
        assert_eq!(lut_index(2, 0), 2);
        assert_eq!(lut_index(3, 0), 2);
        assert_eq!(lut_index(4, 0), 3);
        assert_eq!(lut_index(7, 0), 3);
        assert_eq!(lut_index(8, 0), 4);
        assert_eq!(lut_index(u32::MAX, 0), LUT_SIZE - 1);
    }

    #[test]
    fn lut_index_applies_shift_before_bucketing() {
        assert_eq!(lut_index(1024, 10), 1);
        assert_eq!(lut_index(1023, 10), 0);
        assert_eq!(lut_index(u32::MAX, 32), 0);
    }

    #[test]
    fn lut_shift_spreads_full_scale_over_all_buckets() {
        // 5 V in µV needs 23 bits; shifting by 12 leaves an MSB of 11.
        let shift = lut_shift(5_000_000);
        assert_eq!(shift, 12);
        assert_eq!(lut_index(5_000_000, shift), LUT_SIZE - 1);
        // 18-bit ADC full scale lands in the top bucket as well.
        let shift = lut_shift((1 << 18) - 1);
        assert_eq!(lut_index((1 << 18) - 1, shift), LUT_SIZE - 1);
    }

    #[test]
    fn lut_shift_of_small_range_is_zero() {
        assert_eq!(lut_shift(1000), 0);
    }
}
