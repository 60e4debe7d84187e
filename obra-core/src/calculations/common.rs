//! Shared decimal helpers for the settlement and certification calculators.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// Values at exactly 0.005 are rounded away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use obra_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Applies a percentage expressed on a 0–100 scale.
///
/// The result is exact: dividing by 100 only shifts the decimal scale.
///
/// ```
/// use rust_decimal_macros::dec;
/// use obra_core::calculations::common::percent_of;
///
/// assert_eq!(percent_of(dec!(10000), dec!(5)), dec!(500));
/// assert_eq!(percent_of(dec!(1234.56), dec!(2.5)), dec!(30.864));
/// ```
pub fn percent_of(amount: Decimal, percentage: Decimal) -> Decimal {
    amount * percentage / Decimal::ONE_HUNDRED
}

/// Expresses `part` as a percentage of `whole`, unrounded.
///
/// A `whole` that is zero or negative yields zero.
///
/// ```
/// use rust_decimal_macros::dec;
/// use obra_core::calculations::common::{round_half_up, share_percent};
///
/// assert_eq!(share_percent(dec!(60), dec!(100)), dec!(60));
/// assert_eq!(round_half_up(share_percent(dec!(1), dec!(3))), dec!(33.33));
/// assert_eq!(share_percent(dec!(25), dec!(0)), dec!(0));
/// assert_eq!(share_percent(dec!(25), dec!(-100)), dec!(0));
/// ```
pub fn share_percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    part * Decimal::ONE_HUNDRED / whole
}

/// Largest magnitude accepted for a single quantity, price, rate or amount.
///
/// Products and sums of values within this bound stay inside `Decimal`'s
/// range, so the calculators never overflow on accepted input.
pub const INPUT_LIMIT: i64 = 1_000_000_000_000;

/// Whether `value` lies within `-INPUT_LIMIT..=INPUT_LIMIT`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use obra_core::calculations::common::within_input_limit;
///
/// assert!(within_input_limit(dec!(-1000000000000)));
/// assert!(!within_input_limit(dec!(1000000000000.01)));
/// ```
pub fn within_input_limit(value: Decimal) -> bool {
    value.abs() <= Decimal::from(INPUT_LIMIT)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    // =========================================================================
    // round_half_up tests
    // =========================================================================

    #[test]
    fn round_half_up_rounds_down_below_midpoint() {
        assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
    }

    #[test]
    fn round_half_up_rounds_up_at_midpoint() {
        assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
    }

    #[test]
    fn round_half_up_handles_negative_values() {
        assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46)); // Away from zero
    }

    #[test]
    fn round_half_up_handles_large_values() {
        assert_eq!(round_half_up(dec!(999999.999)), dec!(1000000.00));
    }

    // =========================================================================
    // percent_of tests
    // =========================================================================

    #[test]
    fn percent_of_zero_percentage_is_zero() {
        assert_eq!(percent_of(dec!(8450.75), dec!(0)), dec!(0));
    }

    #[test]
    fn percent_of_full_percentage_is_identity() {
        assert_eq!(percent_of(dec!(8450.75), dec!(100)), dec!(8450.75));
    }

    #[test]
    fn percent_of_keeps_fractional_cents() {
        assert_eq!(percent_of(dec!(10.01), dec!(5)), dec!(0.5005));
    }

    // =========================================================================
    // share_percent tests
    // =========================================================================

    #[test]
    fn share_percent_guards_zero_whole() {
        assert_eq!(share_percent(dec!(40), dec!(0)), dec!(0));
    }

    #[test]
    fn share_percent_can_exceed_one_hundred() {
        assert_eq!(share_percent(dec!(130), dec!(100)), dec!(130.00));
    }

    #[test]
    fn share_percent_guards_negative_whole() {
        assert_eq!(share_percent(dec!(40), dec!(-200)), dec!(0));
        assert_eq!(share_percent(dec!(-40), dec!(-200)), dec!(0));
    }

    #[test]
    fn share_percent_keeps_full_precision() {
        let two_thirds = share_percent(dec!(2), dec!(3));

        assert!(two_thirds > dec!(66.666666));
        assert!(two_thirds < dec!(66.666667));
        assert_eq!(round_half_up(two_thirds), dec!(66.67));
        assert_eq!(share_percent(dec!(1), dec!(8)), dec!(12.5));
    }

    // =========================================================================
    // within_input_limit tests
    // =========================================================================

    #[test]
    fn input_limit_is_inclusive_and_symmetric() {
        assert!(within_input_limit(dec!(1000000000000)));
        assert!(within_input_limit(dec!(-1000000000000)));
        assert!(within_input_limit(dec!(0)));
        assert!(!within_input_limit(dec!(1000000000000.001)));
        assert!(!within_input_limit(Decimal::MAX));
        assert!(!within_input_limit(Decimal::MIN));
    }

    #[test]
    fn product_of_limits_does_not_overflow() {
        let limit = Decimal::from(INPUT_LIMIT);

        let square = limit.checked_mul(limit).unwrap();

        assert!(square.checked_mul(dec!(1000)).is_some());
        assert_eq!(percent_of(limit, limit), dec!(10000000000000000000000));
    }
}
