// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-decimal monetary precision policy.
//!
//! Every cost component is rounded to [`MONEY_SCALE`] decimal places with
//! midpoint-away-from-zero rounding. Stores that cannot hold decimals persist
//! the amount as an integer count of nano-units, which keeps SQL `SUM` exact.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places kept for every monetary amount (nano-units).
pub const MONEY_SCALE: u32 = 9;

/// Round an amount to the monetary scale.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Convert an amount to integer nano-units, saturating at the `i64` range.
pub fn to_nanos(amount: Decimal) -> i64 {
    let rounded = round_money(amount);
    let mantissa = rounded.mantissa();
    i64::try_from(mantissa).unwrap_or(if mantissa.is_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Convert integer nano-units back into a decimal amount.
pub fn from_nanos(nanos: i64) -> Decimal {
    Decimal::new(nanos, MONEY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn nanos_are_exact_for_representable_amounts() {
        let amount = Decimal::from_str("0.0000015").unwrap();
        assert_eq!(to_nanos(amount), 1500);
        assert_eq!(from_nanos(1500), amount);
    }

    #[test]
    fn rounding_is_midpoint_away_from_zero() {
        let amount = Decimal::from_str("0.0000000005").unwrap();
        assert_eq!(round_money(amount), Decimal::from_str("0.000000001").unwrap());
        let below = Decimal::from_str("0.0000000004").unwrap();
        assert_eq!(round_money(below), Decimal::ZERO);
    }

    #[test]
    fn round_money_keeps_scale() {
        let amount = Decimal::from_str("1.5").unwrap();
        assert_eq!(round_money(amount).scale(), MONEY_SCALE);
        assert_eq!(round_money(amount), amount);
    }
}
