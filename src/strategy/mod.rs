//! Strategy engine — combination expansion, stake pricing, and leg-pair
//! cost analysis.
//!
//! Everything here is pure computation: no I/O, no shared state.

pub mod combination;
pub mod cost;
pub mod odds;

pub use combination::{expand, expand_priced};
pub use cost::{analyze, CostAnalyzer, CostAnalyzerConfig, DEFAULT_MAX_PAYOUT};
pub use odds::{price_stake, round2, MIN_STAKE};
