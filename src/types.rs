use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{edge_thresholds, ANALYSIS_PLACEHOLDER};

// ---------------------------------------------------------------------------
// Pick
// ---------------------------------------------------------------------------

/// One wagering opportunity as produced by the upstream model pipeline.
/// Read-only here; built once by the normalizer at the data boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub id: String,
    pub league_name: String,
    /// "Home vs Away"
    pub match_label: String,
    pub market_type: String,
    pub selection: String,
    /// Decimal odds, always > 1.0.
    pub odds: f64,
    pub edge_percentage: f64,
    /// Canonical model probability in [0, 1].
    pub model_probability: f64,
    pub analysis: Analysis,
    pub event_date: Option<NaiveDate>,
    pub is_gold: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Pick {
    /// `(home, away)` split from the match label, with generic fallbacks.
    pub fn teams(&self) -> (&str, &str) {
        let mut parts = self.match_label.splitn(2, " vs ");
        let home = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let away = parts.next().map(str::trim).filter(|s| !s.is_empty());
        (home.unwrap_or("Home Team"), away.unwrap_or("Away Team"))
    }

    pub fn implied_probability(&self) -> f64 {
        1.0 / self.odds
    }

    pub fn confidence(&self) -> ConfidenceTier {
        ConfidenceTier::from_edge(self.edge_percentage)
    }

    pub fn badge(&self) -> EdgeBadge {
        EdgeBadge::from_edge(self.edge_percentage)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Narrative attached to a pick. Parsed once, never re-parsed by presentation code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Analysis {
    PlainText { text: String },
    Structured(StructuredAnalysis),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    pub narrative: String,
    /// Whether the narrative came from an explicit `analysis_text` key.
    pub has_analysis_text: bool,
    pub key_stats: BTreeMap<String, String>,
    pub key_insights: Vec<String>,
    pub verdict: Option<String>,
    pub market: Option<String>,
    pub factors: Option<String>,
}

impl Analysis {
    pub fn plain(text: impl Into<String>) -> Self {
        Analysis::PlainText { text: text.into() }
    }

    pub fn narrative(&self) -> &str {
        match self {
            Analysis::PlainText { text } => text,
            Analysis::Structured(s) => &s.narrative,
        }
    }

    /// Narrative, or the generic placeholder when there is nothing to show.
    pub fn display_text(&self) -> &str {
        let text = self.narrative();
        if text.trim().is_empty() {
            ANALYSIS_PLACEHOLDER
        } else {
            text
        }
    }

    pub fn key_insights(&self) -> &[String] {
        match self {
            Analysis::PlainText { .. } => &[],
            Analysis::Structured(s) => &s.key_insights,
        }
    }

    pub fn key_stats(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Analysis::PlainText { .. } => None,
            Analysis::Structured(s) => Some(&s.key_stats),
        }
    }

    pub fn verdict(&self) -> Option<&str> {
        match self {
            Analysis::PlainText { .. } => None,
            Analysis::Structured(s) => s.verdict.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_edge(edge_percentage: f64) -> Self {
        if edge_percentage > edge_thresholds::HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if edge_percentage > edge_thresholds::MEDIUM_CONFIDENCE {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::Low => "LOW",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::High => "HIGH",
        };
        write!(f, "{s}")
    }
}

/// Card badge for the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeBadge {
    Standard,
    High,
    Gold,
}

impl EdgeBadge {
    pub fn from_edge(edge_percentage: f64) -> Self {
        if edge_percentage > edge_thresholds::GOLD_BADGE {
            EdgeBadge::Gold
        } else if edge_percentage > edge_thresholds::HIGH_BADGE {
            EdgeBadge::High
        } else {
            EdgeBadge::Standard
        }
    }
}

// ---------------------------------------------------------------------------
// Viewer / entitlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Elite,
}

impl SubscriptionTier {
    /// Lenient parse of the row store's `subscription_status`. Unknown values are free.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pro" => SubscriptionTier::Pro,
            "elite" | "syndicate" => SubscriptionTier::Elite,
            _ => SubscriptionTier::Free,
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Elite => "elite",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub purchased_pick_ids: HashSet<String>,
}

impl Entitlement {
    pub fn free(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: SubscriptionTier::Free,
            purchased_pick_ids: HashSet::new(),
        }
    }

    pub fn has_purchased(&self, pick_id: &str) -> bool {
        self.purchased_pick_ids.contains(pick_id)
    }
}

/// Who is looking. Passed explicitly to the gate on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewer {
    Anonymous,
    Authenticated(Entitlement),
}

impl Viewer {
    pub fn entitlement(&self) -> Option<&Entitlement> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(e) => Some(e),
        }
    }

    pub fn tier(&self) -> Option<SubscriptionTier> {
        self.entitlement().map(|e| e.tier)
    }
}

// ---------------------------------------------------------------------------
// Entitlement events (realtime channel → ViewerStore)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementEvent {
    /// Full profile row as observed. Merged, never lowers entitlement.
    Snapshot(Entitlement),
    /// Single pick bought (payment confirmation).
    Purchase { user_id: String, pick_id: String },
    /// Explicit tier change that may lower access (cancellation, refund).
    Downgrade { user_id: String, tier: SubscriptionTier },
    /// Profile deleted.
    Revoke { user_id: String },
}

impl EntitlementEvent {
    pub fn user_id(&self) -> &str {
        match self {
            EntitlementEvent::Snapshot(e) => &e.user_id,
            EntitlementEvent::Purchase { user_id, .. }
            | EntitlementEvent::Downgrade { user_id, .. }
            | EntitlementEvent::Revoke { user_id } => user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teams_split_with_fallbacks() {
        let mut pick = crate::picks::sample_pick("p1");
        pick.match_label = "Arsenal vs Brighton".to_string();
        assert_eq!(pick.teams(), ("Arsenal", "Brighton"));

        pick.match_label = "Arsenal".to_string();
        assert_eq!(pick.teams(), ("Arsenal", "Away Team"));
    }

    #[test]
    fn confidence_and_badge_thresholds_are_exclusive() {
        assert_eq!(ConfidenceTier::from_edge(8.0), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_edge(8.01), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_edge(4.0), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_edge(-3.0), ConfidenceTier::Low);

        assert_eq!(EdgeBadge::from_edge(9.0), EdgeBadge::Standard);
        assert_eq!(EdgeBadge::from_edge(10.5), EdgeBadge::High);
        assert_eq!(EdgeBadge::from_edge(11.5), EdgeBadge::Gold);
    }

    #[test]
    fn placeholder_replaces_empty_narrative() {
        assert_eq!(Analysis::plain("  ").display_text(), ANALYSIS_PLACEHOLDER);
        assert_eq!(Analysis::plain("Value on home").display_text(), "Value on home");
    }

    #[test]
    fn tier_parse_is_lenient() {
        assert_eq!(SubscriptionTier::parse("PRO"), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::parse("elite"), SubscriptionTier::Elite);
        assert_eq!(SubscriptionTier::parse(""), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::parse("trial"), SubscriptionTier::Free);
        assert!(SubscriptionTier::Elite > SubscriptionTier::Pro);
    }
}
