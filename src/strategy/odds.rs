//! Odds and stake arithmetic.
//!
//! Stake sizing targets a fixed maximum payout per combination:
//! `stake = max_payout / combined_odds`, then rounded conservatively so
//! the advertised payout is never under-funded:
//!
//! 1. never below 1 TL before rounding,
//! 2. rounded to two decimals,
//! 3. raised to the 10 TL minimum stake,
//! 4. any fractional remainder rounded *up* to the next whole amount.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use crate::types::{AnalysisError, StakePlan};

/// Floor applied to the raw stake before rounding.
const MIN_RAW_STAKE: Decimal = dec!(1);

/// Smallest stake the wagering service accepts.
pub const MIN_STAKE: Decimal = dec!(10);

/// Round a currency amount to two decimals, half away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert feed odds into an exact decimal for money arithmetic.
pub fn odds_to_decimal(odds: f64) -> Result<Decimal, AnalysisError> {
    if !odds.is_finite() || odds <= 0.0 {
        return Err(AnalysisError::Pricing { odds });
    }
    Decimal::from_f64(odds)
        .filter(|d| d.is_sign_positive() && !d.is_zero())
        .ok_or(AnalysisError::Pricing { odds })
}

/// Apply the stake rounding policy to a raw (unrounded) stake.
pub fn round_stake(raw: Decimal) -> Decimal {
    let mut stake = round2(raw.max(MIN_RAW_STAKE));
    if stake < MIN_STAKE {
        stake = MIN_STAKE;
    }
    if !stake.fract().is_zero() {
        stake = stake.trunc() + Decimal::ONE;
    }
    stake.normalize()
}

/// Price a combination so that it pays out `max_payout` if it wins.
///
/// Fails for non-finite or non-positive combined odds, and for odds so
/// extreme that the stake or payout leaves the decimal range.
pub fn price_stake(combined_odds: f64, max_payout: Decimal) -> Result<StakePlan, AnalysisError> {
    let unpriceable = AnalysisError::Pricing { odds: combined_odds };
    let odds = odds_to_decimal(combined_odds)?;
    let raw = max_payout.checked_div(odds).ok_or_else(|| unpriceable.clone())?;
    let stake_amount = round_stake(raw);
    let potential_payout = round2(stake_amount.checked_mul(odds).ok_or(unpriceable)?);
    let profit = round2(potential_payout - stake_amount);

    Ok(StakePlan {
        stake_amount,
        odds: combined_odds,
        potential_payout,
        profit,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(33.3333)), dec!(33.33));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn test_round_stake_rounds_up_fraction() {
        assert_eq!(round_stake(dec!(33.3333)), dec!(34));
        assert_eq!(round_stake(dec!(22.2222)), dec!(23));
        assert_eq!(round_stake(dec!(25.001)), dec!(25));
        assert_eq!(round_stake(dec!(25.006)), dec!(26));
    }

    #[test]
    fn test_round_stake_minimum() {
        assert_eq!(round_stake(dec!(0.2)), dec!(10));
        assert_eq!(round_stake(dec!(9.99)), dec!(10));
        assert_eq!(round_stake(dec!(10)), dec!(10));
    }

    #[test]
    fn test_price_stake_example() {
        let plan = price_stake(3.0, dec!(100)).unwrap();
        assert_eq!(plan.stake_amount, dec!(34));
        assert_eq!(plan.potential_payout, dec!(102));
        assert_eq!(plan.profit, dec!(68));

        let plan = price_stake(4.5, dec!(100)).unwrap();
        assert_eq!(plan.stake_amount, dec!(23));
        assert_eq!(plan.potential_payout, dec!(103.5));
        assert_eq!(plan.profit, dec!(80.5));
    }

    #[test]
    fn test_price_stake_long_odds_hits_minimum() {
        let plan = price_stake(880.0, dec!(2500)).unwrap();
        assert_eq!(plan.stake_amount, dec!(10));
        assert_eq!(plan.potential_payout, dec!(8800));
        assert_eq!(plan.profit, dec!(8790));
    }

    #[test]
    fn test_price_stake_is_whole_and_at_least_minimum() {
        for odds in [1.01, 1.7, 2.35, 7.77, 13.3, 99.0, 1234.5] {
            let plan = price_stake(odds, dec!(2500)).unwrap();
            assert!(plan.stake_amount >= MIN_STAKE, "odds {odds}");
            assert!(plan.stake_amount.fract().is_zero(), "odds {odds}");
            assert!(plan.potential_payout >= dec!(2500) || plan.stake_amount == MIN_STAKE);
        }
    }

    #[test]
    fn test_price_stake_rejects_invalid_odds() {
        assert!(matches!(
            price_stake(0.0, dec!(100)),
            Err(AnalysisError::Pricing { .. })
        ));
        assert!(price_stake(-1.5, dec!(100)).is_err());
        assert!(price_stake(f64::NAN, dec!(100)).is_err());
        assert!(price_stake(f64::INFINITY, dec!(100)).is_err());
    }

    #[test]
    fn test_price_stake_out_of_range_odds_fail_cleanly() {
        // Stake would exceed the decimal range.
        assert!(matches!(
            price_stake(1e-27, dec!(2500)),
            Err(AnalysisError::Pricing { .. })
        ));
        // Payout would exceed the decimal range.
        assert!(matches!(
            price_stake(1e28, dec!(100)),
            Err(AnalysisError::Pricing { .. })
        ));
    }
}
