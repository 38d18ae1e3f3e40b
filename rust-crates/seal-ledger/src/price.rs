//! Fixed-point price encoding shared with the ledger (8 implied decimals).

pub const PRICE_DECIMALS: u32 = 8;
pub const PRICE_SCALE: u64 = 10u64.pow(PRICE_DECIMALS);

// Products within this distance of an integer are float noise, not a fraction
// of the smallest unit. Large prices get a few ulps of slack on top.
const ENCODE_EPSILON: f64 = 1e-6;
const ENCODE_ULPS: f64 = 4.0;

pub fn price_from_fixed(raw: u64) -> f64 {
    raw as f64 / PRICE_SCALE as f64
}

/// Multiplies by 1e8 and truncates. Non-finite and non-positive prices encode
/// as `0`; prices beyond `u64` saturate.
pub fn price_to_fixed(price: f64) -> u64 {
    if !price.is_finite() || price <= 0.0 {
        return 0;
    }
    let scaled = price * PRICE_SCALE as f64;
    let nearest = scaled.round();
    let tolerance = ENCODE_EPSILON.max(scaled * ENCODE_ULPS * f64::EPSILON);
    let units = if (scaled - nearest).abs() < tolerance {
        nearest
    } else {
        scaled.trunc()
    };
    units as u64
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn price_to_fixed__spec_example__encodes_exactly() {
        assert_eq!(price_to_fixed(1234.56), 123_456_000_000);
        assert_eq!(price_from_fixed(123_456_000_000), 1234.56);
    }

    #[test]
    fn price_to_fixed__float_noise_below_integer__is_not_truncated_away() {
        // 0.29 * 1e8 evaluates to 28999999.999999996
        assert_eq!(price_to_fixed(0.29), 29_000_000);
    }

    #[test]
    fn price_to_fixed__sub_unit_fraction__truncates() {
        assert_eq!(price_to_fixed(1.123_456_789), 112_345_678);
    }

    #[test]
    fn price_to_fixed__invalid_inputs__encode_as_zero() {
        assert_eq!(price_to_fixed(f64::NAN), 0);
        assert_eq!(price_to_fixed(f64::INFINITY), 0);
        assert_eq!(price_to_fixed(-3.0), 0);
        assert_eq!(price_to_fixed(0.0), 0);
    }

    proptest! {
        #[test]
        fn price_to_fixed__whole_cents__encode_exactly(cents in 1u64..1_000_000_000u64) {
            let price = cents as f64 / 100.0;
            prop_assert_eq!(price_to_fixed(price), cents * 1_000_000);
            let decoded = price_from_fixed(price_to_fixed(price));
            prop_assert!((decoded - price).abs() <= 1e-8 * price.max(1.0));
        }
    }
}
