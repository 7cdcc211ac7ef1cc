use crossterm::event::KeyCode;
use serde::Deserialize;

use statsedge::config::{AGGRESSIVE_KELLY_MULTIPLIER, DEFAULT_BANKROLL, DEFAULT_KELLY_MULTIPLIER};
use statsedge::odds::{StakeCalculator, StakeRecommendation};

/// Bankroll step for `+` / `-`.
pub const BANKROLL_STEP: f64 = 100.0;
/// Multiplier step for `]` / `[`.
pub const MULTIPLIER_STEP: f64 = 0.05;
pub const MAX_MULTIPLIER: f64 = 2.0;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes; unknown fields ignored)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PickRow {
    pub id: String,
    pub index: usize,
    pub league_name: String,
    pub match_label: String,
    pub selection: String,
    pub odds: f64,
    pub edge_percentage: f64,
    pub model_probability: f64,
    pub confidence: String,
    pub access: String,
    pub elite_locked: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedResponse {
    pub viewer_tier: Option<String>,
    pub picks: Vec<PickRow>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthResponse {
    pub status: Option<String>,
    pub realtime_connected: Option<bool>,
    pub rejected_rows: Option<u64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Refresh,
    Redraw,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    /// Row of `feed.picks` under the cursor.
    pub selected: Option<usize>,
    pub feed: FeedResponse,
    pub health: HealthResponse,
    pub calc: StakeCalculator,
    pub base_url: String,
    pub access_token: Option<String>,
}

impl AppState {
    pub fn new(base_url: String, access_token: Option<String>) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            selected: None,
            feed: FeedResponse::default(),
            health: HealthResponse::default(),
            calc: StakeCalculator::new(DEFAULT_BANKROLL, DEFAULT_KELLY_MULTIPLIER),
            base_url,
            access_token,
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> KeyAction {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return KeyAction::Quit,
            KeyCode::Char('r') | KeyCode::Char('R') => return KeyAction::Refresh,
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_bankroll(1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.adjust_bankroll(-1),
            KeyCode::Char(']') => self.adjust_multiplier(1),
            KeyCode::Char('[') => self.adjust_multiplier(-1),
            _ => {}
        }
        KeyAction::Redraw
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(last) = self.feed.picks.len().checked_sub(1) else {
            self.selected = None;
            return;
        };
        let next = match self.selected {
            None => 0,
            Some(i) => i.saturating_add_signed(delta).min(last),
        };
        self.selected = Some(next);
    }

    /// Keep the cursor on a real row after the feed changes size.
    fn clamp_selection(&mut self) {
        let len = self.feed.picks.len();
        self.selected = match self.selected {
            _ if len == 0 => None,
            None => Some(0),
            Some(i) => Some(i.min(len - 1)),
        };
    }

    pub fn adjust_bankroll(&mut self, steps: i32) {
        self.calc.bankroll = (self.calc.bankroll + steps as f64 * BANKROLL_STEP).max(0.0);
    }

    pub fn adjust_multiplier(&mut self, steps: i32) {
        let k = self.calc.kelly_multiplier + steps as f64 * MULTIPLIER_STEP;
        // Snap to the step grid so repeated presses don't accumulate float noise.
        let k = (k / MULTIPLIER_STEP).round() * MULTIPLIER_STEP;
        self.calc.kelly_multiplier = k.clamp(0.0, MAX_MULTIPLIER);
    }

    pub fn is_aggressive(&self) -> bool {
        self.calc.kelly_multiplier > AGGRESSIVE_KELLY_MULTIPLIER
    }

    /// Stake for the selected row, computed locally with the shared odds math.
    pub fn recommendation(&self) -> Option<(&PickRow, StakeRecommendation)> {
        let pick = self.feed.picks.get(self.selected?)?;
        let rec = self.calc.recommend(pick.model_probability, pick.odds).ok()?;
        Some((pick, rec))
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let picks_url = format!("{}/picks", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let mut picks_req = client.get(&picks_url);
        if let Some(token) = &self.access_token {
            picks_req = picks_req.bearer_auth(token);
        }

        let (picks_res, health_res) =
            tokio::join!(picks_req.send(), client.get(&health_url).send());

        let resp = match picks_res {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        if !resp.status().is_success() {
            self.status = ConnectionStatus::Error(format!("/picks: HTTP {}", resp.status()));
            return;
        }

        match resp.json::<FeedResponse>().await {
            Ok(feed) => {
                self.feed = feed;
                self.clamp_selection();
                self.status = ConnectionStatus::Connected;
                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_money(v: f64) -> String {
    format!("${v:.2}")
}

pub fn format_pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

pub fn format_edge(edge_percentage: f64) -> String {
    format!("{edge_percentage:+.1}%")
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> PickRow {
        PickRow {
            id: id.to_string(),
            index: 0,
            league_name: "Premier League".into(),
            match_label: "Arsenal vs Brighton".into(),
            selection: "Arsenal".into(),
            odds: 1.85,
            edge_percentage: 7.3,
            model_probability: 0.58,
            confidence: "MEDIUM".into(),
            access: "unlocked".into(),
            elite_locked: false,
        }
    }

    #[test]
    fn dials_clamp() {
        let mut app = AppState::new("http://localhost:8000".into(), None);
        app.adjust_bankroll(-100);
        assert_eq!(app.calc.bankroll, 0.0);

        for _ in 0..100 {
            app.adjust_multiplier(1);
        }
        assert_eq!(app.calc.kelly_multiplier, MAX_MULTIPLIER);
        assert!(app.is_aggressive());

        for _ in 0..100 {
            app.adjust_multiplier(-1);
        }
        assert_eq!(app.calc.kelly_multiplier, 0.0);
    }

    #[test]
    fn recommendation_for_selected_row() {
        let mut app = AppState::new("http://localhost:8000".into(), None);
        app.feed.picks = vec![row("p1")];
        assert!(app.recommendation().is_none());

        app.selected = Some(0);
        let (pick, rec) = app.recommendation().unwrap();
        assert_eq!(pick.id, "p1");
        assert!((rec.recommended_stake - 107.352_94).abs() < 1e-3);

        app.selected = Some(1);
        assert!(app.recommendation().is_none());
    }

    #[test]
    fn keys_move_cursor_and_dials() {
        let mut app = AppState::new("http://localhost:8000".into(), None);
        assert_eq!(app.handle_key(KeyCode::Char('j')), KeyAction::Redraw);
        assert_eq!(app.selected, None);

        app.feed.picks = vec![row("p1"), row("p2")];
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected, Some(0));
        app.handle_key(KeyCode::Char('j'));
        app.handle_key(KeyCode::Char('j'));
        assert_eq!(app.selected, Some(1));
        app.handle_key(KeyCode::Char('k'));
        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected, Some(0));

        app.handle_key(KeyCode::Char('+'));
        assert_eq!(app.calc.bankroll, DEFAULT_BANKROLL + BANKROLL_STEP);
        app.handle_key(KeyCode::Char(']'));
        assert!((app.calc.kelly_multiplier - 0.30).abs() < 1e-9);

        assert_eq!(app.handle_key(KeyCode::Char('r')), KeyAction::Refresh);
        assert_eq!(app.handle_key(KeyCode::Esc), KeyAction::Quit);
    }

    #[test]
    fn selection_follows_a_shrinking_feed() {
        let mut app = AppState::new("http://localhost:8000".into(), None);
        app.feed.picks = vec![row("p1"), row("p2"), row("p3")];
        app.selected = Some(2);

        app.feed.picks.truncate(1);
        app.clamp_selection();
        assert_eq!(app.selected, Some(0));

        app.feed.picks.clear();
        app.clamp_selection();
        assert_eq!(app.selected, None);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_money(107.352_94), "$107.35");
        assert_eq!(format_pct(0.5406), "54.1%");
        assert_eq!(format_edge(7.3), "+7.3%");
        assert_eq!(format_edge(-2.0), "-2.0%");
        assert_eq!(truncate("Arsenal vs Brighton", 8), "Arsenal…");
    }

    #[test]
    fn feed_json_with_extra_fields_parses() {
        let body = serde_json::json!({
            "viewer_tier": "free",
            "free_teaser_count": 2,
            "total": 1,
            "facets": {"leagues": [], "markets": []},
            "picks": [{
                "id": "p1", "index": 0, "league_name": "L", "match_label": "A vs B",
                "home": "A", "away": "B", "market_type": "1X2", "selection": "A",
                "odds": 2.0, "edge_percentage": 4.0, "implied_probability": 0.5,
                "model_probability": 0.52, "confidence": "LOW", "badge": "standard",
                "event_date": null, "is_gold": false, "access": "payment_required",
                "elite_locked": false, "analysis": null
            }]
        });
        let feed: FeedResponse = serde_json::from_value(body).unwrap();
        assert_eq!(feed.picks[0].access, "payment_required");
    }
}
