//! Probability, edge and Kelly arithmetic for decimal odds.
//!
//! Every screen and endpoint goes through these functions so the numbers agree:
//!
//! ```text
//! implied  = 1 / odds
//! edge %   = (p * odds - 1) * 100
//! kelly f* = (b * p - q) / b = (p * odds - 1) / (odds - 1)
//! ```
//!
//! where `b = odds - 1` (net odds) and `q = 1 - p`.

use crate::error::OddsError;

fn check_odds(odds: f64) -> Result<f64, OddsError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(OddsError::InvalidOdds(odds));
    }
    Ok(odds)
}

fn check_probability(p: f64) -> Result<f64, OddsError> {
    if !(0.0..=1.0).contains(&p) {
        // NaN fails `contains` as well.
        return Err(OddsError::InvalidProbability(p));
    }
    Ok(p)
}

/// Win probability encoded by a decimal price, ignoring bookmaker margin.
///
/// ```
/// use statsedge::odds::implied_probability;
/// assert!((implied_probability(2.0).unwrap() - 0.5).abs() < 1e-12);
/// assert!(implied_probability(1.0).is_err());
/// ```
pub fn implied_probability(odds: f64) -> Result<f64, OddsError> {
    Ok(1.0 / check_odds(odds)?)
}

/// Edge in percent of stake. Negative means the market is priced against the model
/// and is returned as-is.
pub fn edge_percent(model_probability: f64, odds: f64) -> Result<f64, OddsError> {
    let p = check_probability(model_probability)?;
    let odds = check_odds(odds)?;
    Ok((p * odds - 1.0) * 100.0)
}

/// Full Kelly fraction of bankroll. Negative when there is no edge.
pub fn full_kelly_fraction(model_probability: f64, odds: f64) -> Result<f64, OddsError> {
    let p = check_probability(model_probability)?;
    let odds = check_odds(odds)?;
    let b = odds - 1.0;
    let q = 1.0 - p;
    Ok((b * p - q) / b)
}

/// Fractional Kelly stake amount, clamped at zero.
pub fn recommended_stake(
    bankroll: f64,
    model_probability: f64,
    odds: f64,
    kelly_multiplier: f64,
) -> Result<f64, OddsError> {
    if !bankroll.is_finite() || bankroll < 0.0 {
        return Err(OddsError::InvalidBankroll(bankroll));
    }
    if !kelly_multiplier.is_finite() || kelly_multiplier < 0.0 {
        return Err(OddsError::InvalidMultiplier(kelly_multiplier));
    }
    let kelly = full_kelly_fraction(model_probability, odds)?;
    Ok((kelly * kelly_multiplier).max(0.0) * bankroll)
}

/// Inverse of [`edge_percent`]: the model probability a stored edge implies at `odds`.
///
/// Rows that carry only an edge are resolved here and nowhere else.
pub fn model_probability_from_edge(edge_percent: f64, odds: f64) -> Result<f64, OddsError> {
    let odds = check_odds(odds)?;
    let p = (1.0 + edge_percent / 100.0) / odds;
    // Absorb rounding at the interval ends so an exact round trip of p = 0 or 1 holds.
    if p > 1.0 && p - 1.0 < ROUNDING_SLACK {
        return Ok(1.0);
    }
    if p < 0.0 && -p < ROUNDING_SLACK {
        return Ok(0.0);
    }
    check_probability(p)
}

const ROUNDING_SLACK: f64 = 1e-12;
