//! Credit refund on a lost daily gold pick.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::GOLD_INSURANCE_CAP;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
    /// Void / push: stake returned by the book, nothing to insure.
    Void,
}

impl BetOutcome {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "won" | "win" => Ok(BetOutcome::Won),
            "lost" | "loss" => Ok(BetOutcome::Lost),
            "void" | "push" => Ok(BetOutcome::Void),
            other => Err(AppError::Validation(format!("unknown bet outcome `{other}`"))),
        }
    }
}

/// Credit owed for a settled bet, if any. Only a lost gold pick qualifies, capped at
/// [`GOLD_INSURANCE_CAP`].
pub fn refund_for(bet_amount: Decimal, outcome: BetOutcome, is_gold: bool) -> Result<Option<Decimal>> {
    if bet_amount.is_sign_negative() {
        return Err(AppError::Validation(format!(
            "bet amount must be >= 0, got {bet_amount}"
        )));
    }
    if outcome != BetOutcome::Lost || !is_gold || bet_amount.is_zero() {
        return Ok(None);
    }
    Ok(Some(bet_amount.min(GOLD_INSURANCE_CAP)))
}
