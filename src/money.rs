//! Fixed-precision monetary arithmetic.
//!
//! Prices, sizes and balances are `rust_decimal::Decimal` throughout; binary
//! floating point is never used for order sizes or rates. Addition,
//! subtraction and multiplication are exact; division rounds half-to-even to
//! twelve fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::consts::{DIV_SCALE, DUST_EPSILON};
use crate::errors::{Error, Result};

/// Parse a decimal out of config or venue text.
pub fn parse(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|e| Error::InvalidConfig(format!("malformed decimal {s:?}: {e}")))
}

/// `1.0` means one percent, not 100%.
pub fn percent_to_ratio(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

/// Offset `value` by `percent` of itself. A negative percent reduces, which
/// is how the buy ladder walks away from the market.
pub fn apply_percent(value: Decimal, percent: Decimal) -> Decimal {
    value + value * percent_to_ratio(percent)
}

/// Division rounded half-to-even to [`DIV_SCALE`] fractional digits.
pub fn div_round(numerator: Decimal, denominator: Decimal) -> Decimal {
    (numerator / denominator).round_dp_with_strategy(DIV_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Below or at the default fully-filled threshold.
pub fn is_dust(value: Decimal) -> bool {
    is_dust_within(value, DUST_EPSILON)
}

/// Below or at a venue-specific threshold.
pub fn is_dust_within(value: Decimal, epsilon: Decimal) -> bool {
    value <= epsilon
}

/// Arithmetic mean of the best ask and best bid.
pub fn midpoint(lowest_ask: Decimal, highest_bid: Decimal) -> Decimal {
    div_round(lowest_ask + highest_bid, Decimal::TWO)
}
