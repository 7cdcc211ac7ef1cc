//! Feed ordering, filtering and facet extraction over normalized picks.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::Pick;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    #[default]
    All,
    Today,
    Tomorrow,
    /// Today onwards, no upper bound.
    Upcoming,
}

impl DateFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(DateFilter::All),
            "today" => Some(DateFilter::Today),
            "tomorrow" => Some(DateFilter::Tomorrow),
            "upcoming" | "week" => Some(DateFilter::Upcoming),
            _ => None,
        }
    }

    /// Picks without an event date only pass `All`.
    pub fn matches(&self, event_date: Option<NaiveDate>, today: NaiveDate) -> bool {
        match (self, event_date) {
            (DateFilter::All, _) => true,
            (_, None) => false,
            (DateFilter::Today, Some(d)) => d == today,
            (DateFilter::Tomorrow, Some(d)) => Some(d) == today.checked_add_days(Days::new(1)),
            (DateFilter::Upcoming, Some(d)) => d >= today,
        }
    }
}

/// `None` on league/market means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    pub league: Option<String>,
    pub market: Option<String>,
    #[serde(default)]
    pub date: DateFilter,
}

impl FeedFilter {
    pub fn matches(&self, pick: &Pick, today: NaiveDate) -> bool {
        let league_ok = self
            .league
            .as_deref()
            .map_or(true, |l| pick.league_name.eq_ignore_ascii_case(l));
        let market_ok = self
            .market
            .as_deref()
            .map_or(true, |m| pick.market_type.eq_ignore_ascii_case(m));
        league_ok && market_ok && self.date.matches(pick.event_date, today)
    }
}

/// A feed pick with its rank in the full, unfiltered feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Position the tier gate evaluates. Filtering does not renumber.
    pub rank: usize,
    pub pick: Pick,
}

/// Non-gold picks, highest edge first. Equal edges keep their store order.
pub fn ranked_feed(picks: &[Pick]) -> Vec<Pick> {
    let mut feed: Vec<Pick> = picks.iter().filter(|p| !p.is_gold).cloned().collect();
    feed.sort_by(|a, b| b.edge_percentage.total_cmp(&a.edge_percentage));
    feed
}

/// Ranked feed narrowed by `filter`, each entry keeping its unfiltered rank so a
/// filter can never move a pick into the free teaser positions.
pub fn build_feed(picks: &[Pick], filter: &FeedFilter, today: NaiveDate) -> Vec<FeedEntry> {
    ranked_feed(picks)
        .into_iter()
        .enumerate()
        .filter(|(_, p)| filter.matches(p, today))
        .map(|(rank, pick)| FeedEntry { rank, pick })
        .collect()
}

/// Rank of `pick_id` in the unfiltered feed.
pub fn rank_of(picks: &[Pick], pick_id: &str) -> Option<usize> {
    ranked_feed(picks).iter().position(|p| p.id == pick_id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    pub leagues: Vec<String>,
    pub markets: Vec<String>,
}

/// Distinct non-empty league and market names across non-gold picks, sorted.
pub fn facets(picks: &[Pick]) -> Facets {
    let mut leagues = BTreeSet::new();
    let mut markets = BTreeSet::new();
    for p in picks.iter().filter(|p| !p.is_gold) {
        if !p.league_name.is_empty() {
            leagues.insert(p.league_name.clone());
        }
        if !p.market_type.is_empty() {
            markets.insert(p.market_type.clone());
        }
    }
    Facets {
        leagues: leagues.into_iter().collect(),
        markets: markets.into_iter().collect(),
    }
}

/// Most recently created gold pick. Picks without a timestamp sort oldest; ties break
/// on id so the choice is deterministic.
pub fn select_gold_pick(picks: &[Pick]) -> Option<&Pick> {
    picks
        .iter()
        .filter(|p| p.is_gold)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}
