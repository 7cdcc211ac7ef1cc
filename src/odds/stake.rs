//! Stake recommendations for the risk calculator.

use serde::{Deserialize, Serialize};

use crate::config::{
    edge_thresholds, AGGRESSIVE_KELLY_MULTIPLIER, DEFAULT_BANKROLL, DEFAULT_KELLY_MULTIPLIER,
};
use crate::error::OddsError;
use crate::odds::math::{
    edge_percent, full_kelly_fraction, implied_probability, recommended_stake,
};

/// Derived view of one bet at a given bankroll and risk dial. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeRecommendation {
    pub odds: f64,
    pub edge_percent: f64,
    pub implied_probability: f64,
    pub model_probability: f64,
    /// Full Kelly, may be negative.
    pub kelly_fraction: f64,
    pub kelly_multiplier: f64,
    /// Fraction of bankroll actually recommended (clamped at zero).
    pub recommended_fraction: f64,
    pub recommended_stake: f64,
    /// Multiplier exceeds the aggressive threshold; the caller should warn.
    pub aggressive: bool,
}

impl StakeRecommendation {
    pub fn is_bet(&self) -> bool {
        self.recommended_stake > 0.0
    }
}

/// Bankroll plus risk dial. Attaches the "aggressive" policy flag that the
/// arithmetic itself does not decide.
#[derive(Debug, Clone)]
pub struct StakeCalculator {
    pub bankroll: f64,
    pub kelly_multiplier: f64,
    pub aggressive_threshold: f64,
}

impl StakeCalculator {
    pub fn new(bankroll: f64, kelly_multiplier: f64) -> Self {
        Self {
            bankroll,
            kelly_multiplier,
            aggressive_threshold: AGGRESSIVE_KELLY_MULTIPLIER,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BANKROLL, DEFAULT_KELLY_MULTIPLIER)
    }

    pub fn is_aggressive(&self) -> bool {
        self.kelly_multiplier > self.aggressive_threshold
    }

    pub fn recommend(
        &self,
        model_probability: f64,
        odds: f64,
    ) -> Result<StakeRecommendation, OddsError> {
        let implied = implied_probability(odds)?;
        let edge = edge_percent(model_probability, odds)?;
        let kelly = full_kelly_fraction(model_probability, odds)?;
        let stake = recommended_stake(self.bankroll, model_probability, odds, self.kelly_multiplier)?;

        Ok(StakeRecommendation {
            odds,
            edge_percent: edge,
            implied_probability: implied,
            model_probability,
            kelly_fraction: kelly,
            kelly_multiplier: self.kelly_multiplier,
            recommended_fraction: (kelly * self.kelly_multiplier).max(0.0),
            recommended_stake: stake,
            aggressive: self.is_aggressive(),
        })
    }
}

impl Default for StakeCalculator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetSignal {
    Bet,
    Pass,
}

/// Quick verdict for a single opportunity: edge, quarter-style Kelly stake, and
/// whether it crosses the elite alert line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetAnalysis {
    pub edge_percent: f64,
    pub kelly_stake: f64,
    pub recommendation: BetSignal,
    pub is_elite_alert: bool,
}

pub fn analyze_bet(
    bankroll: f64,
    model_probability: f64,
    odds: f64,
    kelly_multiplier: f64,
) -> Result<BetAnalysis, OddsError> {
    let edge = edge_percent(model_probability, odds)?;
    let stake = recommended_stake(bankroll, model_probability, odds, kelly_multiplier)?;
    Ok(BetAnalysis {
        edge_percent: edge,
        kelly_stake: stake,
        recommendation: if edge > 0.0 { BetSignal::Bet } else { BetSignal::Pass },
        is_elite_alert: edge > edge_thresholds::ELITE,
    })
}
