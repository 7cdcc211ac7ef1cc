use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::picks::parse_analysis;
use crate::types::Analysis;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Where an analysis came from. Demo replies are labelled so clients can show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Model,
    Demo,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepAnalysis {
    pub matchup: String,
    pub source: AnalysisSource,
    pub analysis: Analysis,
}

/// On-demand match write-ups from a hosted generative model.
#[derive(Clone)]
pub struct GenAiClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl GenAiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.genai_api_url.trim_end_matches('/').to_string(),
            model: cfg.genai_model.clone(),
            api_key: cfg.genai_api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Structured analysis for `matchup`. Falls back to the demo reply without a key or
    /// when the model call fails; never errors.
    pub async fn deep_analysis(&self, matchup: &str) -> DeepAnalysis {
        let Some(key) = self.api_key.as_deref() else {
            return demo_analysis(matchup);
        };

        match self.generate(key, &analysis_prompt(matchup)).await {
            Ok(text) => {
                info!(matchup, model = %self.model, chars = text.len(), "Deep analysis generated");
                DeepAnalysis {
                    matchup: matchup.to_string(),
                    source: AnalysisSource::Model,
                    analysis: parse_analysis(&text),
                }
            }
            Err(e) => {
                warn!(matchup, "Deep analysis failed, serving demo reply: {e}");
                demo_analysis(matchup)
            }
        }
    }

    /// The key travels in a header and transport errors drop their URL, so neither
    /// reaches the logs.
    async fn generate(&self, key: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::RowStore(format!("generative API: HTTP {status}")));
        }
        let reply: Value = resp.json().await.map_err(reqwest::Error::without_url)?;
        reply_text(&reply)
            .ok_or_else(|| AppError::RowStore("generative API: reply had no text part".into()))
    }
}

fn analysis_prompt(matchup: &str) -> String {
    format!(
        "Analyze the match {matchup} as a quantitative betting expert.\n\
         \n\
         Reply strictly as JSON with this structure:\n\
         {{\n\
           \"market\": \"Value analysis: compare the bookmaker price with the estimated true probability.\",\n\
           \"factors\": \"Tactical context: 2-3 key factors (injuries, xG, weather) as bullet points.\",\n\
           \"verdict\": \"Market conclusion: why the price is wrong and the final selection.\"\n\
         }}\n\
         \n\
         Be brief and direct, and use professional terminology (xG, CLV, sharp money)."
    )
}

/// `candidates[0].content.parts[*].text`, concatenated.
fn reply_text(reply: &Value) -> Option<String> {
    let parts = reply
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

pub fn demo_analysis(matchup: &str) -> DeepAnalysis {
    let reply = serde_json::json!({
        "market": "The 1.85 price (54% implied) is off. The model puts the win at 62%, a positive edge of 8%.",
        "factors": "- Key absence: the visitors are without their first-choice centre back.\n- xG trend: the home side creates 2.1 xG per match against 0.8 for the visitors.",
        "verdict": "The market overrates the visitors on reputation. The value is on the home side at -0.5 AH."
    })
    .to_string();
    DeepAnalysis {
        matchup: matchup.to_string(),
        source: AnalysisSource::Demo,
        analysis: parse_analysis(&reply),
    }
}
