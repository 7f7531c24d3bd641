use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Grams, millilitres,
/// seconds, progress fractions and quality scores all use this type.
pub type Fixed64 = I32F32;

/// Checked division for Fixed64 that returns None on zero divisor.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

/// Clamp a value into `[0, 1]`.
#[inline]
pub fn clamp01(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::ONE)
}

/// Linear interpolation between `a` and `b`. `t` is clamped to `[0, 1]`.
#[inline]
pub fn lerp(a: Fixed64, b: Fixed64, t: Fixed64) -> Fixed64 {
    a + (b - a) * clamp01(t)
}

/// `elapsed / duration` clamped to `[0, 1]`. A non-positive duration counts
/// as already finished.
#[inline]
pub fn fraction(elapsed: Fixed64, duration: Fixed64) -> Fixed64 {
    if duration <= Fixed64::ZERO {
        return Fixed64::ONE;
    }
    checked_div_64(elapsed, duration).map_or(Fixed64::ONE, clamp01)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    #[test]
    fn dyadic_sums_are_exact() {
        assert_eq!(fx(1.5) + fx(2.0), fx(3.5));
        assert_eq!(fx(0.25) * fx(10.0), fx(2.5));
    }

    #[test]
    fn fixed64_checked_div_by_zero() {
        let a = fx(1.0);
        let zero = fx(0.0);
        assert!(checked_div_64(a, zero).is_none());
    }

    #[test]
    fn fixed64_determinism() {
        let a = fx(1.0 / 3.0);
        let b = fx(1.0 / 3.0);
        assert_eq!(a, b);
        assert_eq!(a * fx(3.0), b * fx(3.0));
    }

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(fx(-0.5)), Fixed64::ZERO);
        assert_eq!(clamp01(fx(0.25)), fx(0.25));
        assert_eq!(clamp01(fx(7.0)), Fixed64::ONE);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        let a = fx(0.7);
        let b = fx(1.2);
        assert_eq!(lerp(a, b, Fixed64::ZERO), a);
        assert_eq!(lerp(a, b, Fixed64::ONE), b);
        assert_eq!(lerp(a, b, fx(2.0)), b);
        let mid: f64 = lerp(a, b, fx(0.5)).to_num();
        assert!((mid - 0.95).abs() < 1e-6);
    }

    #[test]
    fn fraction_clamps_and_handles_zero_duration() {
        let two = fx(2.0);
        assert_eq!(fraction(fx(0.5), two), fx(0.25));
        assert_eq!(fraction(fx(3.0), two), Fixed64::ONE);
        assert_eq!(fraction(Fixed64::ZERO, Fixed64::ZERO), Fixed64::ONE);
    }
}
