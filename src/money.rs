// Currency and odds arithmetic. All values are fixed-point `Decimal`.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::{EngineError, EngineResult};

/// Currency precision (cents)
pub const CURRENCY_DP: u32 = 2;

/// Smallest legal decimal price
pub const MIN_ODDS: Decimal = dec!(1.00);

/// Largest price the catalog will publish
pub const MAX_ODDS: Decimal = dec!(1000.00);

/// Round a currency amount to cents, half up.
///
/// Amounts handled by the engine are never negative, so away-from-zero on the
/// midpoint is the same as half up.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// True when the amount carries no more than cent precision.
pub fn is_cent_precise(value: Decimal) -> bool {
    value.normalize().scale() <= CURRENCY_DP
}

/// A positive, cent-precise amount. The error is the human-readable reason.
pub fn check_amount(value: Decimal) -> Result<Decimal, String> {
    if value <= Decimal::ZERO {
        return Err(format!("{} must be greater than zero", value));
    }
    if !is_cent_precise(value) {
        return Err(format!("{} has more than {} decimal places", value, CURRENCY_DP));
    }
    Ok(value)
}

/// Product of decimal prices, unrounded. An empty list multiplies to 1.
///
/// Fails with `OddsOutOfRange` when the product leaves `Decimal` range.
pub fn combine_odds<I>(prices: I) -> EngineResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    prices.into_iter().try_fold(Decimal::ONE, |acc, price| {
        acc.checked_mul(price).ok_or_else(|| {
            EngineError::OddsOutOfRange("combined odds exceed the supported range".into())
        })
    })
}

/// `stake * odds`, rounded to cents.
pub fn payout(stake: Decimal, odds: Decimal) -> EngineResult<Decimal> {
    stake.checked_mul(odds).map(round_currency).ok_or_else(|| {
        EngineError::OddsOutOfRange(format!("payout of {} at {} overflows", stake, odds))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_currency(dec!(1.005)), dec!(1.01));
        assert_eq!(round_currency(dec!(1.004)), dec!(1.00));
        assert_eq!(round_currency(dec!(2.675)), dec!(2.68));
        assert_eq!(round_currency(dec!(0.125)), dec!(0.13));
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount(dec!(20)).is_ok());
        assert!(check_amount(dec!(20.50)).is_ok());
        assert!(check_amount(dec!(20.500)).is_ok());
        assert!(check_amount(dec!(0)).is_err());
        assert!(check_amount(dec!(-5)).is_err());
        assert!(check_amount(dec!(1.001)).is_err());
    }

    #[test]
    fn test_combined_odds_and_payout() {
        let odds = combine_odds(vec![dec!(1.50), dec!(2.00)]).unwrap();
        assert_eq!(odds, dec!(3.00));
        assert_eq!(payout(dec!(20), odds).unwrap(), dec!(60.00));

        let odds = combine_odds(vec![dec!(1.85), dec!(2.15), dec!(1.33)]).unwrap();
        assert_eq!(payout(dec!(10), odds).unwrap(), dec!(52.90));
    }

    #[test]
    fn test_overflowing_odds_are_an_error() {
        let err = combine_odds(vec![dec!(100.00); 20]).unwrap_err();
        assert_eq!(err.code(), "ODDS_OUT_OF_RANGE");

        let near_max = combine_odds(vec![dec!(1000.00); 9]).unwrap();
        assert!(payout(dec!(10000), near_max).is_err());
    }
}
