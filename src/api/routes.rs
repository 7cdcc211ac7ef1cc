use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::health::HealthState;
use crate::baas::BaasClient;
use crate::config::DEFAULT_KELLY_MULTIPLIER;
use crate::error::{AppError, Result};
use crate::gate::{redact, Access, PickView, TierGate};
use crate::genai::{DeepAnalysis, GenAiClient};
use crate::insurance::{refund_for, BetOutcome};
use crate::odds::{analyze_bet, BetAnalysis, StakeCalculator, StakeRecommendation};
use crate::picks::{build_feed, facets, rank_of, select_gold_pick, DateFilter, Facets, FeedFilter};
use crate::state::{PickStore, TierCounts, ViewerStore};
use crate::types::{EntitlementEvent, SubscriptionTier, Viewer};

#[derive(Clone)]
pub struct ApiState {
    pub picks: Arc<PickStore>,
    pub viewers: Arc<ViewerStore>,
    pub baas: BaasClient,
    pub genai: GenAiClient,
    pub gate: TierGate,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/picks", get(get_picks))
        .route("/picks/gold", get(get_gold_pick))
        .route("/stake", post(post_stake))
        .route("/analyze-bet", post(post_analyze_bet))
        .route("/analysis", post(post_analysis))
        .route("/insurance/refund", post(post_insurance_refund))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Viewer resolution
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// No token means anonymous. A token the auth service rejects is an error, not a
/// silent downgrade to anonymous.
async fn resolve_viewer(state: &ApiState, headers: &HeaderMap) -> Result<Viewer> {
    let Some(token) = bearer_token(headers) else {
        return Ok(Viewer::Anonymous);
    };
    let user_id = state.baas.resolve_user(token).await?;

    // First sighting: seed from the profile row. Later changes arrive via realtime.
    if !state.viewers.contains(&user_id) {
        match state.baas.fetch_profile(&user_id).await {
            Ok(Some(ent)) => {
                state.viewers.apply(EntitlementEvent::Snapshot(ent));
            }
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, "Profile read failed, treating as free: {e}"),
        }
    }
    Ok(state.viewers.viewer(&user_id))
}

// ---------------------------------------------------------------------------
// Query / request structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PicksQuery {
    pub league: Option<String>,
    pub market: Option<String>,
    pub date: Option<String>,
}

impl PicksQuery {
    fn to_filter(&self) -> Result<FeedFilter> {
        let date = match self.date.as_deref() {
            None => DateFilter::All,
            Some(s) => DateFilter::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown date filter `{s}`")))?,
        };
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
                .map(str::to_string)
        };
        Ok(FeedFilter {
            league: non_empty(&self.league),
            market: non_empty(&self.market),
            date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StakeRequest {
    /// Take odds and model probability from a stored pick.
    pub pick_id: Option<String>,
    pub odds: Option<f64>,
    pub model_probability: Option<f64>,
    pub bankroll: Option<f64>,
    pub kelly_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeBetRequest {
    pub bankroll: f64,
    pub model_probability: f64,
    pub odds: f64,
    pub kelly_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub pick_id: Option<String>,
    pub matchup: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub bet_amount: Decimal,
    pub outcome: String,
    #[serde(default)]
    pub is_gold: bool,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub picks: usize,
    pub rejected_rows: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub refresh_failures: u64,
    pub realtime_connected: bool,
    pub entitlement_events: u64,
    pub known_viewers: usize,
    pub viewer_tiers: TierCounts,
    pub genai_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub viewer_tier: Option<SubscriptionTier>,
    pub free_teaser_count: usize,
    pub total: usize,
    pub facets: Facets,
    pub picks: Vec<PickView>,
}

#[derive(Debug, Serialize)]
pub struct GoldResponse {
    pub pick: Option<PickView>,
}

#[derive(Debug, Serialize)]
pub struct StakeResponse {
    #[serde(flatten)]
    pub recommendation: StakeRecommendation,
    pub elite_locked: bool,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let snap = state.picks.snapshot();
    let failures = state.health.refresh_failures();
    Json(HealthResponse {
        status: if snap.refreshed_at.is_some() && failures == 0 { "ok" } else { "degraded" },
        picks: snap.picks.len() + snap.gold.len(),
        rejected_rows: snap.rejected,
        refreshed_at: snap.refreshed_at,
        refresh_failures: failures,
        realtime_connected: state.health.realtime_connected(),
        entitlement_events: state.health.entitlement_events(),
        known_viewers: state.viewers.len(),
        viewer_tiers: state.viewers.tier_counts(),
        genai_configured: state.genai.is_configured(),
    })
}

async fn get_picks(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<PicksQuery>,
) -> Result<Json<FeedResponse>> {
    let filter = params.to_filter()?;
    let viewer = resolve_viewer(&state, &headers).await?;
    Ok(Json(feed_response(&state, &viewer, &filter, Utc::now().date_naive())))
}

fn feed_response(
    state: &ApiState,
    viewer: &Viewer,
    filter: &FeedFilter,
    today: chrono::NaiveDate,
) -> FeedResponse {
    let snap = state.picks.snapshot();
    let entries = build_feed(&snap.picks, filter, today);

    let picks: Vec<PickView> = entries
        .iter()
        .map(|e| {
            let access = state.gate.access(viewer, &e.pick, e.rank);
            let elite_locked = TierGate::elite_locked(viewer, e.pick.edge_percentage);
            redact(&e.pick, e.rank, access, elite_locked)
        })
        .collect();

    FeedResponse {
        viewer_tier: viewer.tier(),
        free_teaser_count: state.gate.free_teaser_count,
        total: picks.len(),
        facets: facets(&snap.picks),
        picks,
    }
}

async fn get_gold_pick(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<GoldResponse>> {
    let viewer = resolve_viewer(&state, &headers).await?;
    Ok(Json(gold_response(&state, &viewer)))
}

fn gold_response(state: &ApiState, viewer: &Viewer) -> GoldResponse {
    let snap = state.picks.snapshot();
    let pick = select_gold_pick(&snap.gold).map(|gold| {
        let access = if TierGate::require_authenticated(viewer).is_err() {
            Access::AuthenticationRequired
        } else if TierGate::gold_unlocked(viewer, gold) {
            Access::Unlocked
        } else {
            Access::PaymentRequired
        };
        redact(gold, 0, access, false)
    });
    GoldResponse { pick }
}

async fn post_stake(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<StakeRequest>,
) -> Result<Json<StakeResponse>> {
    let viewer = resolve_viewer(&state, &headers).await?;
    Ok(Json(stake_response(&state, &viewer, req)?))
}

fn stake_response(state: &ApiState, viewer: &Viewer, req: StakeRequest) -> Result<StakeResponse> {
    let (model_probability, odds) = match req.pick_id.as_deref() {
        Some(id) => {
            let pick = state
                .picks
                .find(id)
                .ok_or_else(|| AppError::Validation(format!("unknown pick `{id}`")))?;
            (pick.model_probability, pick.odds)
        }
        None => match (req.model_probability, req.odds) {
            (Some(p), Some(o)) => (p, o),
            _ => {
                return Err(AppError::Validation(
                    "either pick_id or both model_probability and odds are required".into(),
                ))
            }
        },
    };

    let mut calc = StakeCalculator::with_defaults();
    if let Some(b) = req.bankroll {
        calc.bankroll = b;
    }
    if let Some(k) = req.kelly_multiplier {
        calc.kelly_multiplier = k;
    }

    let recommendation = calc.recommend(model_probability, odds)?;
    let elite_locked = TierGate::elite_locked(viewer, recommendation.edge_percent);
    Ok(StakeResponse {
        recommendation,
        elite_locked,
    })
}

async fn post_analyze_bet(Json(req): Json<AnalyzeBetRequest>) -> Result<Json<BetAnalysis>> {
    let analysis = analyze_bet(
        req.bankroll,
        req.model_probability,
        req.odds,
        req.kelly_multiplier.unwrap_or(DEFAULT_KELLY_MULTIPLIER),
    )?;
    Ok(Json(analysis))
}

/// Deep analysis for a matchup. Signed-in viewers only; for a stored pick the viewer
/// must also have it unlocked, and elite-edge feed picks need the Elite tier.
async fn post_analysis(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<AnalysisRequest>,
) -> Result<Json<DeepAnalysis>> {
    let viewer = resolve_viewer(&state, &headers).await?;
    let matchup = analysis_matchup(&state, &viewer, &req)?;
    Ok(Json(state.genai.deep_analysis(&matchup).await))
}

fn analysis_matchup(state: &ApiState, viewer: &Viewer, req: &AnalysisRequest) -> Result<String> {
    TierGate::require_authenticated(viewer)?;

    match (req.pick_id.as_deref(), req.matchup.as_deref()) {
        (Some(id), _) => {
            let snap = state.picks.snapshot();
            let pick = state
                .picks
                .find(id)
                .ok_or_else(|| AppError::Validation(format!("unknown pick `{id}`")))?;
            let unlocked = if pick.is_gold {
                TierGate::gold_unlocked(viewer, &pick)
            } else {
                rank_of(&snap.picks, id).is_some_and(|rank| state.gate.unlocked(viewer, &pick, rank))
            };
            if !unlocked {
                return Err(AppError::PaymentRequired(id.to_string()));
            }
            // A purchased gold pick includes its analysis; feed picks above the elite
            // edge need the Elite plan.
            if !pick.is_gold && TierGate::elite_locked(viewer, pick.edge_percentage) {
                return Err(AppError::PaymentRequired(format!("{id} requires the Elite plan")));
            }
            Ok(pick.match_label)
        }
        (None, Some(m)) if !m.trim().is_empty() => Ok(m.trim().to_string()),
        _ => Err(AppError::Validation("pick_id or matchup is required".into())),
    }
}

async fn post_insurance_refund(Json(req): Json<RefundRequest>) -> Result<Json<RefundResponse>> {
    let outcome = BetOutcome::parse(&req.outcome)?;
    let refund = refund_for(req.bet_amount, outcome, req.is_gold)?;
    Ok(Json(RefundResponse { refund }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::picks::sample_pick;
    use crate::state::PickSnapshot;
    use crate::types::Entitlement;
    use axum::http::HeaderValue;
    use chrono::NaiveDate;

    fn test_state() -> ApiState {
        let cfg = test_config();
        let picks = PickStore::new();

        let mut feed = Vec::new();
        for (i, edge) in [12.0, 9.5, 7.3, 5.0].iter().enumerate() {
            let mut p = sample_pick(&format!("p{i}"));
            p.edge_percentage = *edge;
            feed.push(p);
        }
        let mut gold = sample_pick("gold-1");
        gold.is_gold = true;
        gold.analysis = crate::types::Analysis::plain("Gold write-up");

        picks.replace(PickSnapshot {
            picks: feed,
            gold: vec![gold],
            refreshed_at: Some(Utc::now()),
            rejected: 0,
        });

        ApiState {
            picks,
            viewers: ViewerStore::new(),
            baas: BaasClient::new(&cfg).unwrap(),
            genai: GenAiClient::new(&cfg).unwrap(),
            gate: TierGate::new(cfg.free_teaser_count),
            health: Arc::new(HealthState::new()),
        }
    }

    fn signed_in(tier: SubscriptionTier, purchased: &[&str]) -> Viewer {
        let mut e = Entitlement::free("u1");
        e.tier = tier;
        e.purchased_pick_ids = purchased.iter().map(|s| s.to_string()).collect();
        Viewer::Authenticated(e)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn anonymous_feed_is_fully_redacted() {
        let state = test_state();
        let Json(resp) = get_picks(State(state), HeaderMap::new(), Query(PicksQuery::default()))
            .await
            .unwrap();

        assert_eq!(resp.total, 4);
        assert!(resp.viewer_tier.is_none());
        assert!(resp
            .picks
            .iter()
            .all(|p| p.access == Access::AuthenticationRequired && p.analysis.is_none()));
        // Numbers stay visible.
        assert_eq!(resp.picks[0].edge_percentage, 12.0);
    }

    #[test]
    fn free_viewer_gets_two_teasers() {
        let state = test_state();
        let viewer = signed_in(SubscriptionTier::Free, &["p3"]);
        let resp = feed_response(&state, &viewer, &FeedFilter::default(), today());

        let access: Vec<Access> = resp.picks.iter().map(|p| p.access).collect();
        assert_eq!(
            access,
            [
                Access::Unlocked,
                Access::Unlocked,
                Access::PaymentRequired,
                Access::Unlocked
            ]
        );
        assert!(resp.picks[0].elite_locked);
        assert!(!resp.picks[1].elite_locked);
    }

    #[test]
    fn pro_viewer_unlocks_whole_feed() {
        let state = test_state();
        let viewer = signed_in(SubscriptionTier::Pro, &[]);
        let resp = feed_response(&state, &viewer, &FeedFilter::default(), today());
        assert!(resp.picks.iter().all(|p| p.access == Access::Unlocked));
    }

    #[test]
    fn gold_pick_access() {
        let state = test_state();

        let anon = gold_response(&state, &Viewer::Anonymous).pick.unwrap();
        assert_eq!(anon.access, Access::AuthenticationRequired);

        let pro = gold_response(&state, &signed_in(SubscriptionTier::Pro, &[]))
            .pick
            .unwrap();
        assert_eq!(pro.access, Access::PaymentRequired);
        assert!(pro.analysis.is_none());

        let buyer = gold_response(&state, &signed_in(SubscriptionTier::Free, &["gold-1"]))
            .pick
            .unwrap();
        assert_eq!(buyer.access, Access::Unlocked);
        assert_eq!(buyer.analysis.unwrap().text, "Gold write-up");
    }

    #[test]
    fn stake_from_stored_pick() {
        let state = test_state();
        let req = StakeRequest {
            pick_id: Some("p2".into()),
            odds: None,
            model_probability: None,
            bankroll: Some(5_000.0),
            kelly_multiplier: Some(0.25),
        };
        let resp = stake_response(&state, &Viewer::Anonymous, req).unwrap();
        assert!((resp.recommendation.recommended_stake - 107.352_94).abs() < 1e-3);
        assert!(!resp.elite_locked);
    }

    #[test]
    fn stake_requires_inputs() {
        let state = test_state();
        let req = StakeRequest {
            pick_id: None,
            odds: Some(2.0),
            model_probability: None,
            bankroll: None,
            kelly_multiplier: None,
        };
        assert!(matches!(
            stake_response(&state, &Viewer::Anonymous, req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn stake_rejects_bad_odds() {
        let state = test_state();
        let req = StakeRequest {
            pick_id: None,
            odds: Some(1.0),
            model_probability: Some(0.5),
            bankroll: None,
            kelly_multiplier: None,
        };
        let err = stake_response(&state, &Viewer::Anonymous, req).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_bet_endpoint() {
        let Json(a) = post_analyze_bet(Json(AnalyzeBetRequest {
            bankroll: 1_000.0,
            model_probability: 0.5,
            odds: 2.5,
            kelly_multiplier: None,
        }))
        .await
        .unwrap();
        assert!(a.is_elite_alert);
    }

    #[test]
    fn analysis_is_gated() {
        let state = test_state();
        let req = AnalysisRequest {
            pick_id: Some("p2".into()),
            matchup: None,
        };

        assert!(matches!(
            analysis_matchup(&state, &Viewer::Anonymous, &req),
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            analysis_matchup(&state, &signed_in(SubscriptionTier::Free, &[]), &req),
            Err(AppError::PaymentRequired(_))
        ));
        assert_eq!(
            analysis_matchup(&state, &signed_in(SubscriptionTier::Pro, &[]), &req).unwrap(),
            "Arsenal vs Brighton"
        );

        let free_text = AnalysisRequest {
            pick_id: None,
            matchup: Some(" Inter vs Milan ".into()),
        };
        assert_eq!(
            analysis_matchup(&state, &signed_in(SubscriptionTier::Free, &[]), &free_text).unwrap(),
            "Inter vs Milan"
        );
    }

    #[test]
    fn elite_edge_analysis_needs_elite_tier() {
        let state = test_state();
        // p0 sits at edge 12.0, inside the free teaser slots.
        let req = AnalysisRequest {
            pick_id: Some("p0".into()),
            matchup: None,
        };

        for tier in [SubscriptionTier::Free, SubscriptionTier::Pro] {
            assert!(matches!(
                analysis_matchup(&state, &signed_in(tier, &["p0"]), &req),
                Err(AppError::PaymentRequired(_))
            ));
        }
        assert_eq!(
            analysis_matchup(&state, &signed_in(SubscriptionTier::Elite, &[]), &req).unwrap(),
            "Arsenal vs Brighton"
        );

        // A purchased gold pick keeps its analysis whatever the edge.
        let gold = AnalysisRequest {
            pick_id: Some("gold-1".into()),
            matchup: None,
        };
        assert!(analysis_matchup(&state, &signed_in(SubscriptionTier::Pro, &["gold-1"]), &gold).is_ok());
    }

    #[tokio::test]
    async fn refund_endpoint() {
        let Json(resp) = post_insurance_refund(Json(RefundRequest {
            bet_amount: Decimal::new(4000, 2),
            outcome: "lost".into(),
            is_gold: true,
        }))
        .await
        .unwrap();
        assert_eq!(resp.refund, Some(Decimal::new(1500, 2)));

        assert!(post_insurance_refund(Json(RefundRequest {
            bet_amount: Decimal::new(10, 0),
            outcome: "pending".into(),
            is_gold: true,
        }))
        .await
        .is_err());
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let state = test_state();
        let Json(h) = get_health(State(state)).await;
        assert_eq!(h.status, "ok");
        assert_eq!(h.picks, 5);
        assert_eq!(h.viewer_tiers, TierCounts::default());
        assert!(!h.genai_configured);
    }

    #[test]
    fn picks_query_rejects_unknown_date() {
        let q = PicksQuery {
            date: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(q.to_filter().is_err());

        let q = PicksQuery {
            league: Some("All".into()),
            market: Some(" 1X2 ".into()),
            date: Some("today".into()),
        };
        let f = q.to_filter().unwrap();
        assert_eq!(f.league, None);
        assert_eq!(f.market.as_deref(), Some("1X2"));
        assert_eq!(f.date, DateFilter::Today);
    }
}
