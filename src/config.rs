use rust_decimal::Decimal;

use crate::error::{AppError, Result};

pub const GENAI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GENAI_MODEL: &str = "gemini-1.5-pro-latest";

/// Row store tables.
pub const PICKS_TABLE: &str = "daily_picks";
pub const PROFILES_TABLE: &str = "profiles";

/// Feed positions shown unlocked to any authenticated viewer.
pub const FREE_TEASER_COUNT: usize = 2;

/// How often the pick store re-reads the row store (seconds).
pub const PICK_REFRESH_INTERVAL_SECS: u64 = 120;

/// Realtime heartbeat interval (seconds). The server drops sockets silent for ~60s.
pub const REALTIME_HEARTBEAT_SECS: u64 = 25;

/// Reconnect backoff values in milliseconds.
pub const RECONNECT_BACKOFF_MS: &[u64] = &[250, 500, 1_000, 2_000, 5_000];

/// Channel capacity for entitlement events.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Risk calculator defaults.
pub const DEFAULT_BANKROLL: f64 = 5_000.0;
pub const DEFAULT_KELLY_MULTIPLIER: f64 = 0.25;

/// Multipliers above this are reported as aggressive.
pub const AGGRESSIVE_KELLY_MULTIPLIER: f64 = 1.0;

/// Credit cap refunded on a lost gold pick.
pub const GOLD_INSURANCE_CAP: Decimal = Decimal::from_parts(1500, 0, 0, false, 2);

/// Generic text shown when an analysis narrative is empty.
pub const ANALYSIS_PLACEHOLDER: &str = "Analysis unavailable for this pick.";

/// Edge percentage thresholds. These were duplicated across screens with different
/// values for what looks like the same concept; they are kept distinct on purpose
/// until product decides which one is canonical.
pub mod edge_thresholds {
    /// Edge above which a pick belongs to the elite tier.
    pub const ELITE: f64 = 10.0;
    /// Confidence tiers.
    pub const HIGH_CONFIDENCE: f64 = 8.0;
    pub const MEDIUM_CONFIDENCE: f64 = 4.0;
    /// Card badges.
    pub const GOLD_BADGE: f64 = 11.0;
    pub const HIGH_BADGE: f64 = 9.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    /// BaaS project URL (BAAS_URL), e.g. https://xyz.supabase.co
    pub baas_url: String,
    /// Public key sent as `apikey` on every request (BAAS_ANON_KEY)
    pub baas_anon_key: String,
    /// Privileged key for profile reads and realtime (BAAS_SERVICE_KEY, optional)
    pub baas_service_key: Option<String>,
    /// Generative-text API key (GENAI_API_KEY). Without it the demo reply is served.
    pub genai_api_key: Option<String>,
    pub genai_api_url: String,
    pub genai_model: String,
    pub log_level: String,
    pub api_port: u16,
    pub pick_refresh_secs: u64,
    pub free_teaser_count: usize,
    pub realtime_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let baas_url = std::env::var("BAAS_URL")
            .map_err(|_| AppError::Config("BAAS_URL must be set".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let baas_anon_key = std::env::var("BAAS_ANON_KEY")
            .map_err(|_| AppError::Config("BAAS_ANON_KEY must be set".to_string()))?;

        Ok(Self {
            baas_url,
            baas_anon_key,
            baas_service_key: non_empty_var("BAAS_SERVICE_KEY"),
            genai_api_key: non_empty_var("GENAI_API_KEY"),
            genai_api_url: std::env::var("GENAI_API_URL")
                .unwrap_or_else(|_| GENAI_API_URL.to_string()),
            genai_model: std::env::var("GENAI_MODEL").unwrap_or_else(|_| GENAI_MODEL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            pick_refresh_secs: std::env::var("PICK_REFRESH_SECS")
                .unwrap_or_else(|_| PICK_REFRESH_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(PICK_REFRESH_INTERVAL_SECS)
                .max(5),
            free_teaser_count: std::env::var("FREE_TEASER_COUNT")
                .unwrap_or_else(|_| FREE_TEASER_COUNT.to_string())
                .parse::<usize>()
                .unwrap_or(FREE_TEASER_COUNT),
            realtime_enabled: std::env::var("REALTIME_ENABLED")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(true),
        })
    }

    /// Key used for server-side reads: the service key when configured, else the anon key.
    pub fn server_key(&self) -> &str {
        self.baas_service_key
            .as_deref()
            .unwrap_or(&self.baas_anon_key)
    }

    /// Realtime websocket endpoint derived from the project URL.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.baas_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.baas_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.baas_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.server_key()
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.contains("YOUR_"))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        baas_url: "https://project.example.co".to_string(),
        baas_anon_key: "anon".to_string(),
        baas_service_key: None,
        genai_api_key: None,
        genai_api_url: GENAI_API_URL.to_string(),
        genai_model: GENAI_MODEL.to_string(),
        log_level: "info".to_string(),
        api_port: 8000,
        pick_refresh_secs: PICK_REFRESH_INTERVAL_SECS,
        free_teaser_count: FREE_TEASER_COUNT,
        realtime_enabled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_switches_scheme() {
        let cfg = test_config();
        assert_eq!(
            cfg.realtime_url(),
            "wss://project.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn server_key_prefers_service_key() {
        let mut cfg = test_config();
        assert_eq!(cfg.server_key(), "anon");
        cfg.baas_service_key = Some("service".to_string());
        assert_eq!(cfg.server_key(), "service");
    }

    #[test]
    fn insurance_cap_is_fifteen() {
        assert_eq!(GOLD_INSURANCE_CAP.to_string(), "15.00");
    }
}
