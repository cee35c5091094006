//! Cost analyzer.
//!
//! Prices every candidate leg pair drawn from two event groups and picks
//! the pair whose full cross product is cheapest to cover.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::strategy::combination::expand_priced;
use crate::strategy::odds::round2;
use crate::types::{AnalysisError, CostAnalysisResult, Leg, PairCost, PricedCombination};

/// Default maximum payout per combination (TL).
pub const DEFAULT_MAX_PAYOUT: Decimal = rust_decimal_macros::dec!(2500);

/// Configuration for cost analysis.
#[derive(Debug, Clone)]
pub struct CostAnalyzerConfig {
    pub max_payout: Decimal,
    /// Skip pairing a leg with itself when both groups come from one event.
    pub same_event_filter: bool,
}

impl Default for CostAnalyzerConfig {
    fn default() -> Self {
        Self {
            max_payout: DEFAULT_MAX_PAYOUT,
            same_event_filter: true,
        }
    }
}

/// Finds the cheapest leg pair across two groups of legs.
#[derive(Debug, Clone, Default)]
pub struct CostAnalyzer {
    config: CostAnalyzerConfig,
}

struct PairEvaluation<'a> {
    leg_a: &'a Leg,
    leg_b: &'a Leg,
    combinations: Vec<PricedCombination>,
    total_cost: Decimal,
}

impl CostAnalyzer {
    pub fn new(config: CostAnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CostAnalyzerConfig {
        &self.config
    }

    /// Evaluate every ordered `(leg_a, leg_b)` pair and build the result
    /// from the pair with the lowest total stake. Ties keep the first pair
    /// in iteration order.
    ///
    /// Pure: identical inputs always produce an identical result.
    pub fn analyze(
        &self,
        group_a: &[Leg],
        group_b: &[Leg],
    ) -> Result<CostAnalysisResult, AnalysisError> {
        let max_payout = self.config.max_payout;
        if max_payout <= Decimal::ZERO {
            return Err(AnalysisError::InvalidInput(format!(
                "max payout must be positive, got {max_payout}"
            )));
        }

        let mut best: Option<PairEvaluation<'_>> = None;
        let mut pair_costs = Vec::new();

        for leg_a in group_a {
            for leg_b in group_b {
                if self.config.same_event_filter && leg_a.is_same_leg(leg_b) {
                    debug!(leg = %leg_a.to_ref(), "Skipping self-pairing");
                    continue;
                }

                let combinations = expand_priced(leg_a, leg_b, max_payout);
                if combinations.is_empty() {
                    debug!(
                        leg_a = %leg_a.to_ref(),
                        leg_b = %leg_b.to_ref(),
                        "Leg pair has no priceable combinations"
                    );
                    continue;
                }

                let Some(total_cost) = combinations
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.stake.stake_amount))
                else {
                    debug!(
                        leg_a = %leg_a.to_ref(),
                        leg_b = %leg_b.to_ref(),
                        "Leg pair total cost out of range"
                    );
                    continue;
                };
                pair_costs.push(PairCost {
                    leg_a: leg_a.to_ref(),
                    leg_b: leg_b.to_ref(),
                    valid_combinations: combinations.len(),
                    total_cost,
                    average_cost: round2(total_cost / Decimal::from(combinations.len())),
                });

                let is_cheaper = best
                    .as_ref()
                    .map_or(true, |current| total_cost < current.total_cost);
                if is_cheaper {
                    best = Some(PairEvaluation {
                        leg_a,
                        leg_b,
                        combinations,
                        total_cost,
                    });
                }
            }
        }

        let best = best.ok_or(AnalysisError::NoValidPair)?;
        pair_costs.sort_by(|a, b| a.total_cost.cmp(&b.total_cost));

        let result = build_result(best, pair_costs);
        info!(
            leg_a = %result.leg_a.to_ref(),
            leg_b = %result.leg_b.to_ref(),
            combinations = result.combinations.len(),
            total_cost = %result.total_cost,
            max_payout = %max_payout,
            "Cheapest leg pair selected"
        );
        Ok(result)
    }
}

fn build_result(best: PairEvaluation<'_>, pair_costs: Vec<PairCost>) -> CostAnalysisResult {
    let mut combinations = best.combinations;
    // Stable: equal stakes keep expansion order.
    combinations.sort_by(|a, b| a.stake.stake_amount.cmp(&b.stake.stake_amount));

    let count = Decimal::from(combinations.len());
    let min_stake = combinations
        .first()
        .map(|c| c.stake.stake_amount)
        .unwrap_or_default();
    let max_stake = combinations
        .last()
        .map(|c| c.stake.stake_amount)
        .unwrap_or_default();

    CostAnalysisResult {
        leg_a: best.leg_a.clone(),
        leg_b: best.leg_b.clone(),
        total_cost: best.total_cost,
        average_cost: round2(best.total_cost / count),
        min_stake,
        max_stake,
        combinations,
        pair_costs,
    }
}

/// Convenience wrapper over [`CostAnalyzer::analyze`].
pub fn analyze(
    group_a: &[Leg],
    group_b: &[Leg],
    max_payout: Decimal,
    same_event_filter: bool,
) -> Result<CostAnalysisResult, AnalysisError> {
    CostAnalyzer::new(CostAnalyzerConfig {
        max_payout,
        same_event_filter,
    })
    .analyze(group_a, group_b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutcomeEntry;
    use rust_decimal_macros::dec;

    fn leg(event_id: u64, sequence_no: u32, odds: &[f64]) -> Leg {
        let outcomes = odds
            .iter()
            .enumerate()
            .map(|(i, &o)| OutcomeEntry::new(i as u32 + 1, format!("Horse {}", i + 1), o))
            .collect();
        Leg::new(event_id, sequence_no, format!("{sequence_no}. Ayak"), outcomes)
    }

    #[test]
    fn test_worked_example() {
        let a = Leg::new(
            1,
            1,
            "A",
            vec![OutcomeEntry::new(1, "X", 2.0), OutcomeEntry::new(2, "Y", 3.0)],
        );
        let b = Leg::new(2, 1, "B", vec![OutcomeEntry::new(1, "P", 1.5)]);

        let result = analyze(&[a], &[b], dec!(100), true).unwrap();
        assert_eq!(result.combinations.len(), 2);
        assert_eq!(result.total_cost, dec!(57));
        // Ascending stake: the 4.5 combination (23) comes before 3.0 (34).
        assert_eq!(result.combinations[0].stake.stake_amount, dec!(23));
        assert_eq!(result.combinations[1].stake.stake_amount, dec!(34));
        assert_eq!(result.min_stake, dec!(23));
        assert_eq!(result.max_stake, dec!(34));
        assert_eq!(result.average_cost, dec!(28.5));
    }

    #[test]
    fn test_total_cost_is_sum_of_stakes() {
        let group_a = vec![leg(1, 1, &[2.2, 3.4, 5.1]), leg(1, 2, &[1.9, 6.0])];
        let group_b = vec![leg(2, 1, &[1.4, 2.6, 9.0]), leg(2, 2, &[3.3])];
        let result = analyze(&group_a, &group_b, dec!(2500), true).unwrap();
        let sum: Decimal = result.combinations.iter().map(|c| c.stake.stake_amount).sum();
        assert_eq!(result.total_cost, sum);
    }

    #[test]
    fn test_selects_cheapest_pair() {
        // Long odds need smaller stakes: the second B leg is cheaper.
        let group_a = vec![leg(1, 1, &[2.0, 3.0])];
        let group_b = vec![leg(2, 1, &[1.2, 1.3]), leg(2, 2, &[8.0, 9.0])];
        let result = analyze(&group_a, &group_b, dec!(2500), true).unwrap();
        assert_eq!(result.leg_b.sequence_no, 2);
        assert_eq!(result.pair_costs.len(), 2);
        assert!(result.pair_costs[0].total_cost <= result.pair_costs[1].total_cost);
        assert_eq!(result.pair_costs[0].total_cost, result.total_cost);
    }

    #[test]
    fn test_tie_keeps_first_pair() {
        let group_a = vec![leg(1, 1, &[2.0])];
        let group_b = vec![leg(2, 1, &[4.0]), leg(2, 2, &[4.0])];
        let result = analyze(&group_a, &group_b, dec!(100), true).unwrap();
        assert_eq!(result.leg_b.sequence_no, 1);
    }

    #[test]
    fn test_stable_sort_on_equal_stakes() {
        let a = leg(1, 1, &[2.0, 2.0, 2.0]);
        let b = leg(2, 1, &[2.0]);
        let result = analyze(&[a], &[b], dec!(100), true).unwrap();
        let picks: Vec<_> = result.combinations.iter().map(|c| c.combination.pick_a.pick_no).collect();
        assert_eq!(picks, vec![1, 2, 3]);
    }

    #[test]
    fn test_same_event_filter_excludes_self_pairing() {
        let legs = vec![leg(988, 1, &[1.1, 1.2]), leg(988, 2, &[5.0, 6.0])];

        let filtered = analyze(&legs, &legs, dec!(2500), true).unwrap();
        assert!(!filtered.leg_a.is_same_leg(&filtered.leg_b));
        // 2x2 ordered pairs minus the two self-pairings.
        assert_eq!(filtered.pair_costs.len(), 2);

        // Without the filter, leg 2 x leg 2 (longest odds) wins.
        let unfiltered = analyze(&legs, &legs, dec!(2500), false).unwrap();
        assert_eq!(unfiltered.pair_costs.len(), 4);
        assert!(unfiltered.leg_a.is_same_leg(&unfiltered.leg_b));
        assert_eq!(unfiltered.leg_a.sequence_no, 2);
    }

    #[test]
    fn test_no_valid_pair() {
        let a = leg(1, 1, &[0.0, -1.0]);
        let b = leg(2, 1, &[2.0]);
        assert_eq!(
            analyze(&[a], &[b], dec!(100), true),
            Err(AnalysisError::NoValidPair)
        );
        assert_eq!(
            analyze(&[], &[leg(2, 1, &[2.0])], dec!(100), true),
            Err(AnalysisError::NoValidPair)
        );
    }

    #[test]
    fn test_only_self_pairs_is_no_valid_pair() {
        let legs = vec![leg(5, 1, &[2.0])];
        assert_eq!(
            analyze(&legs, &legs, dec!(100), true),
            Err(AnalysisError::NoValidPair)
        );
    }

    #[test]
    fn test_empty_pair_skipped_not_cheapest() {
        // A pair with no valid combinations would cost 0; it must not win.
        let group_a = vec![leg(1, 1, &[2.0])];
        let group_b = vec![leg(2, 1, &[0.0]), leg(2, 2, &[3.0])];
        let result = analyze(&group_a, &group_b, dec!(100), true).unwrap();
        assert_eq!(result.leg_b.sequence_no, 2);
        assert_eq!(result.pair_costs.len(), 1);
    }

    #[test]
    fn test_out_of_range_odds_are_skipped() {
        let a = leg(1, 1, &[2.0, 1e-27]);
        let b = leg(2, 1, &[1.5]);
        let result = analyze(&[a], &[b], dec!(100), true).unwrap();
        assert_eq!(result.combinations.len(), 1);
        assert_eq!(result.total_cost, dec!(34));
    }

    #[test]
    fn test_rejects_non_positive_payout() {
        let a = leg(1, 1, &[2.0]);
        let b = leg(2, 1, &[2.0]);
        assert!(matches!(
            analyze(&[a], &[b], Decimal::ZERO, true),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let group_a = vec![leg(1, 1, &[2.2, 3.4, 5.1]), leg(1, 2, &[1.9, 6.0])];
        let group_b = vec![leg(2, 1, &[1.4, 2.6, 9.0]), leg(2, 2, &[3.3, 0.0])];
        let first = analyze(&group_a, &group_b, dec!(2500), true).unwrap();
        let second = analyze(&group_a, &group_b, dec!(2500), true).unwrap();
        assert_eq!(first, second);
    }
}
