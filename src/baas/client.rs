use std::collections::HashSet;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, PICKS_TABLE, PROFILES_TABLE};
use crate::error::{AppError, Result};
use crate::types::{Entitlement, SubscriptionTier};

/// REST access to the hosted row store (PostgREST) and its auth service.
#[derive(Clone)]
pub struct BaasClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    server_key: String,
}

impl BaasClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.baas_url.clone(),
            anon_key: cfg.baas_anon_key.clone(),
            server_key: cfg.server_key().to_string(),
        })
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.base_url)
    }

    fn headers(&self, api_key: &str, bearer: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|_| AppError::Config("API key is not a valid header value".into()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|_| AppError::Validation("bearer token is not a valid header value".into()))?,
        );
        Ok(headers)
    }

    async fn get_rows(&self, table: &str, query: &str) -> Result<Vec<Value>> {
        let url = self.rest_url(table, query);
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(&self.anon_key, &self.server_key)?)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::RowStore(format!("{table}: HTTP {status}: {body}")));
        }

        let body: Value = resp.json().await?;
        match body {
            Value::Array(rows) => {
                debug!(table, rows = rows.len(), "row store read");
                Ok(rows)
            }
            _ => Err(AppError::RowStore(format!(
                "{table}: response was not an array"
            ))),
        }
    }

    /// Non-gold picks, highest edge first.
    pub async fn fetch_feed_rows(&self) -> Result<Vec<Value>> {
        self.get_rows(
            PICKS_TABLE,
            "select=*&is_gold=eq.false&order=edge_percentage.desc",
        )
        .await
    }

    pub async fn fetch_gold_rows(&self) -> Result<Vec<Value>> {
        self.get_rows(PICKS_TABLE, "select=*&is_gold=eq.true&order=created_at.desc")
            .await
    }

    /// Profile row for one user. `None` when the user has no profile yet.
    pub async fn fetch_profile(&self, user_id: &str) -> Result<Option<Entitlement>> {
        let query = format!("select=*&user_id=eq.{}&limit=1", encode_filter_value(user_id));
        let rows = self.get_rows(PROFILES_TABLE, &query).await?;
        Ok(rows.first().and_then(entitlement_from_row))
    }

    /// Resolve a viewer's access token to a user id. Invalid or expired tokens map to
    /// `Unauthenticated`.
    pub async fn resolve_user(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(&self.anon_key, access_token)?)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(AppError::RowStore(format!("auth: HTTP {status}")));
        }

        let body: Value = resp.json().await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(AppError::Unauthenticated)
    }
}

/// PostgREST filter values go in the query string; keep them to a safe alphabet.
fn encode_filter_value(v: &str) -> String {
    v.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// Profile row → entitlement. Rows without a user id are ignored.
///
/// `purchased_picks` arrives as a JSON array from REST, but realtime payloads for
/// array columns can carry the Postgres text form (`{a,b}`).
pub fn entitlement_from_row(row: &Value) -> Option<Entitlement> {
    let user_id = ["user_id", "id"].iter().find_map(|k| match row.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })?;

    let tier = row
        .get("subscription_status")
        .and_then(|v| v.as_str())
        .map(SubscriptionTier::parse)
        .unwrap_or(SubscriptionTier::Free);

    let purchased_pick_ids: HashSet<String> = match row.get("purchased_picks") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .map(|id| id.trim().trim_matches('"').to_string())
            .filter(|id| !id.is_empty())
            .collect(),
        _ => HashSet::new(),
    };

    Some(Entitlement {
        user_id,
        tier,
        purchased_pick_ids,
    })
}
