//! Cross-product expansion of two legs.

use rust_decimal::Decimal;
use tracing::trace;

use crate::strategy::odds::price_stake;
use crate::types::{Combination, Leg, PricedCombination};

/// Expand every pick of `leg_a` against every pick of `leg_b`.
///
/// Pairs touching an outcome with non-positive or non-finite odds are
/// dropped silently: malformed feed rows are tolerated, not reported.
pub fn expand(leg_a: &Leg, leg_b: &Leg) -> Vec<Combination> {
    let ref_a = leg_a.to_ref();
    let ref_b = leg_b.to_ref();

    let valid_b: Vec<_> = leg_b.outcomes.iter().filter(|o| o.has_valid_odds()).collect();

    let mut combinations = Vec::with_capacity(leg_a.outcomes.len() * valid_b.len());
    for pick_a in leg_a.outcomes.iter().filter(|o| o.has_valid_odds()) {
        for pick_b in &valid_b {
            combinations.push(Combination {
                leg_a: ref_a.clone(),
                leg_b: ref_b.clone(),
                pick_a: pick_a.clone(),
                pick_b: (*pick_b).clone(),
                combined_odds: pick_a.odds * pick_b.odds,
            });
        }
    }

    trace!(
        leg_a = %ref_a,
        leg_b = %ref_b,
        count = combinations.len(),
        "Expanded leg pair"
    );
    combinations
}

/// Expand and price a leg pair. Combinations that cannot be priced
/// (invalid odds, or a stake or payout outside the decimal range) are
/// skipped.
pub fn expand_priced(leg_a: &Leg, leg_b: &Leg, max_payout: Decimal) -> Vec<PricedCombination> {
    expand(leg_a, leg_b)
        .into_iter()
        .filter_map(|combination| match price_stake(combination.combined_odds, max_payout) {
            Ok(stake) => Some(PricedCombination { combination, stake }),
            Err(e) => {
                trace!(error = %e, combination = %combination, "Skipping unpriceable combination");
                None
            }
        })
        .collect()
}
