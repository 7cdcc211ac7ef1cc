//! What a viewer is allowed to receive for one pick.

use chrono::NaiveDate;
use serde::Serialize;

use crate::gate::tier_gate::Access;
use crate::types::{Analysis, ConfidenceTier, EdgeBadge, Pick, StructuredAnalysis};

/// Pick as sent to a client. Prices and edge stay visible so the feed can be
/// browsed; the narrative is only present when `access` is `Unlocked`.
#[derive(Debug, Clone, Serialize)]
pub struct PickView {
    pub id: String,
    pub index: usize,
    pub league_name: String,
    pub match_label: String,
    pub home: String,
    pub away: String,
    pub market_type: String,
    pub selection: String,
    pub odds: f64,
    pub edge_percentage: f64,
    pub implied_probability: f64,
    pub model_probability: f64,
    pub confidence: ConfidenceTier,
    pub badge: EdgeBadge,
    pub event_date: Option<NaiveDate>,
    pub is_gold: bool,
    pub access: Access,
    pub elite_locked: bool,
    pub analysis: Option<AnalysisView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisView {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StructuredAnalysis>,
}

pub fn redact(pick: &Pick, index: usize, access: Access, elite_locked: bool) -> PickView {
    let (home, away) = pick.teams();
    let analysis = access.is_unlocked().then(|| AnalysisView {
        text: pick.analysis.display_text().to_string(),
        details: match &pick.analysis {
            Analysis::Structured(s) => Some(s.clone()),
            Analysis::PlainText { .. } => None,
        },
    });

    PickView {
        id: pick.id.clone(),
        index,
        league_name: pick.league_name.clone(),
        match_label: pick.match_label.clone(),
        home: home.to_string(),
        away: away.to_string(),
        market_type: pick.market_type.clone(),
        selection: pick.selection.clone(),
        odds: pick.odds,
        edge_percentage: pick.edge_percentage,
        implied_probability: pick.implied_probability(),
        model_probability: pick.model_probability,
        confidence: pick.confidence(),
        badge: pick.badge(),
        event_date: pick.event_date,
        is_gold: pick.is_gold,
        access,
        elite_locked,
        analysis,
    }
}
