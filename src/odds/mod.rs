pub mod math;
pub mod stake;

pub use math::{
    edge_percent, full_kelly_fraction, implied_probability, model_probability_from_edge,
    recommended_stake,
};
pub use stake::{analyze_bet, BetAnalysis, BetSignal, StakeCalculator, StakeRecommendation};
