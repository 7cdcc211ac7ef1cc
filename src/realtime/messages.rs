//! Phoenix channel frames used by the row store's realtime service.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::baas::entitlement_from_row;
use crate::config::PROFILES_TABLE;
use crate::types::{EntitlementEvent, SubscriptionTier};

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn profiles_topic() -> String {
    format!("realtime:public:{PROFILES_TABLE}")
}

/// Join the profiles topic with a postgres_changes subscription for every event type.
pub fn build_join_msg(msg_ref: u64) -> String {
    serde_json::json!({
        "topic": profiles_topic(),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": PROFILES_TABLE }
                ]
            }
        },
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

pub fn build_heartbeat_msg(msg_ref: u64) -> String {
    serde_json::json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    topic: Option<String>,
    event: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, PartialEq)]
pub enum ParsedFrame {
    /// Entitlement changes carried by one postgres_changes frame.
    Changes(Vec<EntitlementEvent>),
    /// Reply to a join (or heartbeat). `ok` is false when the server refused it.
    Reply { topic: String, ok: bool, detail: String },
    /// Server closed or errored the channel; rejoin required.
    ChannelClosed { topic: String, reason: String },
    Ignored,
}

/// Parse one text frame. Unknown or malformed frames are `Ignored`.
pub fn parse_frame(text: &str) -> ParsedFrame {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            let n = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
            if n <= 5 || n % 100 == 0 {
                let preview: String = text.chars().take(120).collect();
                warn!("[REALTIME] frame parse failure #{n}: {e} | {preview}");
            }
            return ParsedFrame::Ignored;
        }
    };

    let topic = raw.topic.unwrap_or_default();
    match raw.event.as_deref() {
        Some("postgres_changes") => ParsedFrame::Changes(parse_change(&raw.payload)),
        Some("phx_reply") => {
            let ok = raw.payload.get("status").and_then(|s| s.as_str()) == Some("ok");
            let detail = raw
                .payload
                .get("response")
                .map(|r| r.to_string())
                .unwrap_or_default();
            ParsedFrame::Reply { topic, ok, detail }
        }
        Some("phx_close") | Some("phx_error") => ParsedFrame::ChannelClosed {
            topic,
            reason: raw.payload.to_string(),
        },
        _ => ParsedFrame::Ignored,
    }
}

/// `payload.data = {type, record, old_record, table, ...}`.
fn parse_change(payload: &Value) -> Vec<EntitlementEvent> {
    let Some(data) = payload.get("data") else {
        return Vec::new();
    };
    let table = data.get("table").and_then(|t| t.as_str()).unwrap_or(PROFILES_TABLE);
    if table != PROFILES_TABLE {
        return Vec::new();
    }

    let kind = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let record = data.get("record").unwrap_or(&Value::Null);
    let old_record = data.get("old_record").unwrap_or(&Value::Null);

    match kind {
        "INSERT" => entitlement_from_row(record)
            .map(EntitlementEvent::Snapshot)
            .into_iter()
            .collect(),
        "UPDATE" => {
            let Some(new) = entitlement_from_row(record) else {
                return Vec::new();
            };
            let mut events = Vec::with_capacity(2);
            // Old image only carries the tier when the table replicates full rows.
            // A visible drop is an explicit transition, not a stale read.
            let old_tier = old_record
                .get("subscription_status")
                .and_then(|v| v.as_str())
                .map(SubscriptionTier::parse);
            if old_tier.is_some_and(|old| old > new.tier) {
                events.push(EntitlementEvent::Downgrade {
                    user_id: new.user_id.clone(),
                    tier: new.tier,
                });
            }
            events.push(EntitlementEvent::Snapshot(new));
            events
        }
        "DELETE" => ["user_id", "id"]
            .iter()
            .find_map(|k| old_record.get(*k).and_then(|v| v.as_str()))
            .map(|user_id| EntitlementEvent::Revoke {
                user_id: user_id.to_string(),
            })
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}
