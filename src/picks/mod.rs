pub mod feed;
pub mod normalizer;

pub use feed::{
    build_feed, facets, rank_of, ranked_feed, select_gold_pick, DateFilter, Facets, FeedEntry,
    FeedFilter,
};
pub use normalizer::{normalize, normalize_rows, parse_analysis, to_record, NormalizeStats};

#[cfg(test)]
pub(crate) fn sample_pick(id: &str) -> crate::types::Pick {
    use crate::types::{Analysis, Pick};

    Pick {
        id: id.to_string(),
        league_name: "Premier League".to_string(),
        match_label: "Arsenal vs Brighton".to_string(),
        market_type: "1X2".to_string(),
        selection: "Arsenal".to_string(),
        odds: 1.85,
        edge_percentage: 7.3,
        model_probability: 0.58,
        analysis: Analysis::plain("Home side undervalued after the cup rotation."),
        event_date: chrono::NaiveDate::from_ymd_opt(2026, 10, 19),
        is_gold: false,
        created_at: None,
    }
}
