//! Row store record → `Pick`.
//!
//! `ai_analysis` shows up as plain prose, as a JSON string wrapping prose, as a JSON
//! object (`analysis_text` / `key_stats` / `key_insights` / `verdict`, or the generator's
//! `market` / `factors` / `verdict`), and occasionally as a half-escaped
//! `{"analysis_text": "...` envelope that no longer parses. Text shape problems are
//! absorbed; numbers that cannot be read reject the whole record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::PickError;
use crate::odds::{edge_percent, model_probability_from_edge};
use crate::types::{Analysis, Pick, StructuredAnalysis};

/// Fragments of the corrupted envelope. Removed repeatedly until none remain.
const ENVELOPE_SENTINELS: &[&str] = &[r#"{"analysis_text": ""#, r#"{"analysis_text":""#, r#""}"#];

const MODEL_PROBABILITY_KEYS: &[&str] = &["model_probability", "model_prob", "p_model"];

#[derive(Debug, Default)]
pub struct NormalizeStats {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Sample of (record id, reason) for rejected records.
    pub rejection_samples: Vec<(String, String)>,
}

/// Normalize a batch, dropping (and counting) records with unreadable numbers.
pub fn normalize_rows(rows: &[Value]) -> (Vec<Pick>, NormalizeStats) {
    let mut stats = NormalizeStats {
        total: rows.len(),
        ..Default::default()
    };
    let mut picks = Vec::with_capacity(rows.len());

    for row in rows {
        match normalize(row) {
            Ok(pick) => picks.push(pick),
            Err(e) => {
                stats.rejected += 1;
                if stats.rejection_samples.len() < 10 {
                    let id = row_id(row).unwrap_or_else(|| "?".to_string());
                    stats.rejection_samples.push((id, e.to_string()));
                }
            }
        }
    }

    stats.accepted = picks.len();
    (picks, stats)
}

/// Build a validated `Pick` from one loosely-typed row.
pub fn normalize(row: &Value) -> Result<Pick, PickError> {
    let id = row_id(row).ok_or_else(|| PickError::malformed("?", "id", "missing"))?;

    let odds = match row.get("odds") {
        None | Some(Value::Null) => return Err(PickError::malformed(&id, "odds", "missing")),
        Some(v) => parse_float(v)
            .ok_or_else(|| PickError::malformed(&id, "odds", format!("not numeric: {v}")))?,
    };
    if odds <= 1.0 {
        return Err(PickError::malformed(
            &id,
            "odds",
            format!("must be > 1.0, got {odds}"),
        ));
    }

    let stored_probability = stored_model_probability(row, &id)?;

    let edge_percentage = match row.get("edge_percentage") {
        None | Some(Value::Null) => match stored_probability {
            Some(p) => edge_percent(p, odds)
                .map_err(|e| PickError::malformed(&id, "edge_percentage", e.to_string()))?,
            None => return Err(PickError::malformed(&id, "edge_percentage", "missing")),
        },
        Some(v) => parse_float(v).ok_or_else(|| {
            PickError::malformed(&id, "edge_percentage", format!("not numeric: {v}"))
        })?,
    };

    let model_probability = match stored_probability {
        Some(p) => p,
        None => model_probability_from_edge(edge_percentage, odds).map_err(|e| {
            PickError::malformed(
                &id,
                "edge_percentage",
                format!("inconsistent with odds {odds}: {e}"),
            )
        })?,
    };

    let market_type = text_field(row, &["market_type", "market"]);
    let selection = {
        let s = text_field(row, &["selection"]);
        if s.is_empty() {
            market_type.clone()
        } else {
            s
        }
    };

    Ok(Pick {
        league_name: text_field(row, &["league_name", "league"]),
        match_label: text_field(row, &["match", "match_label"]),
        market_type,
        selection,
        odds,
        edge_percentage,
        model_probability,
        analysis: parse_analysis_value(row.get("ai_analysis")),
        event_date: row
            .get("event_date")
            .and_then(|v| v.as_str())
            .and_then(parse_event_date),
        is_gold: row.get("is_gold").map(parse_bool).unwrap_or(false),
        created_at: row
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp),
        id,
    })
}

/// Encode a pick back into the row store's shape. `normalize(&to_record(p)) == Ok(p)`.
pub fn to_record(pick: &Pick) -> Value {
    serde_json::json!({
        "id": pick.id,
        "league_name": pick.league_name,
        "match": pick.match_label,
        "market_type": pick.market_type,
        "selection": pick.selection,
        "odds": pick.odds,
        "edge_percentage": pick.edge_percentage,
        "model_probability": pick.model_probability,
        "ai_analysis": encode_analysis(&pick.analysis),
        "event_date": pick.event_date.map(|d| d.format("%Y-%m-%d").to_string()),
        "is_gold": pick.is_gold,
        "created_at": pick.created_at.map(|t| t.to_rfc3339()),
    })
}

// ---------------------------------------------------------------------------
// Analysis text
// ---------------------------------------------------------------------------

/// Parse an analysis field that may be absent, a string, or an already-decoded object.
pub fn parse_analysis_value(v: Option<&Value>) -> Analysis {
    match v {
        None | Some(Value::Null) => Analysis::plain(""),
        Some(Value::String(s)) => parse_analysis(s),
        Some(Value::Object(map)) => analysis_from_object(map),
        Some(other) => Analysis::plain(other.to_string()),
    }
}

/// Parse analysis text into its tagged form. Never fails.
///
/// Also used for freshly generated text so cached and generated analyses look alike.
/// Nested JSON strings are unwrapped and stripped envelopes re-parsed until the text
/// stops changing, so any plain result parses back to itself.
pub fn parse_analysis(raw: &str) -> Analysis {
    let mut current = raw.to_string();

    // Every `continue` strictly shortens `current`.
    loop {
        let trimmed = current.trim();

        if trimmed.starts_with('{') {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => return analysis_from_object(&map),
                Ok(other) => return Analysis::plain(other.to_string()),
                Err(_) => {
                    let stripped = strip_envelope(trimmed);
                    if stripped == trimmed {
                        return Analysis::plain(stripped);
                    }
                    current = stripped;
                    continue;
                }
            }
        }

        if trimmed.starts_with('"') {
            if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(trimmed) {
                current = inner;
                continue;
            }
        }

        return Analysis::plain(current);
    }
}

fn analysis_from_object(map: &Map<String, Value>) -> Analysis {
    let analysis_text = map.get("analysis_text").and_then(value_text);
    let verdict = map.get("verdict").and_then(value_text);
    let market = map.get("market").and_then(value_text);
    let factors = map.get("factors").and_then(value_text);

    let key_stats: BTreeMap<String, String> = map
        .get("key_stats")
        .and_then(|v| v.as_object())
        .map(|stats| {
            stats
                .iter()
                .filter_map(|(k, v)| value_text(v).map(|t| (k.clone(), t)))
                .collect()
        })
        .unwrap_or_default();

    let key_insights: Vec<String> = map
        .get("key_insights")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(value_text).collect())
        .unwrap_or_default();

    let nothing_recognized = analysis_text.is_none()
        && verdict.is_none()
        && market.is_none()
        && factors.is_none()
        && key_stats.is_empty()
        && key_insights.is_empty();
    if nothing_recognized {
        return Analysis::plain(Value::Object(map.clone()).to_string());
    }

    let has_analysis_text = analysis_text.is_some();
    let narrative = match analysis_text {
        Some(text) => text,
        None => [&market, &factors, &verdict]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    Analysis::Structured(StructuredAnalysis {
        narrative,
        has_analysis_text,
        key_stats,
        key_insights,
        verdict,
        market,
        factors,
    })
}

fn encode_analysis(analysis: &Analysis) -> Value {
    match analysis {
        Analysis::PlainText { text } => Value::String(text.clone()),
        Analysis::Structured(s) => {
            let mut map = Map::new();
            if s.has_analysis_text {
                map.insert("analysis_text".into(), Value::String(s.narrative.clone()));
            }
            for (key, field) in [("verdict", &s.verdict), ("market", &s.market), ("factors", &s.factors)] {
                if let Some(text) = field {
                    map.insert(key.into(), Value::String(text.clone()));
                }
            }
            if !s.key_stats.is_empty() {
                let stats: Map<String, Value> = s
                    .key_stats
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                map.insert("key_stats".into(), Value::Object(stats));
            }
            if !s.key_insights.is_empty() {
                map.insert(
                    "key_insights".into(),
                    Value::Array(s.key_insights.iter().cloned().map(Value::String).collect()),
                );
            }
            Value::String(Value::Object(map).to_string())
        }
    }
}

/// Remove the known corrupted-envelope fragments and unescape literal `\n`.
pub fn strip_envelope(text: &str) -> String {
    let mut out = text.to_string();
    loop {
        let before = out.len();
        for sentinel in ENVELOPE_SENTINELS {
            out = out.replace(sentinel, "");
        }
        if out.len() == before {
            break;
        }
    }
    out.replace("\\n", "\n").trim().to_string()
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(row: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| match row.get(*k)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn stored_model_probability(row: &Value, id: &str) -> Result<Option<f64>, PickError> {
    let Some(raw) = MODEL_PROBABILITY_KEYS
        .iter()
        .find_map(|k| row.get(*k).filter(|v| !v.is_null()))
    else {
        return Ok(None);
    };

    let p = parse_float(raw).ok_or_else(|| {
        PickError::malformed(id, "model_probability", format!("not numeric: {raw}"))
    })?;
    // Some rows store a percentage (56.2) rather than a probability (0.562).
    let p = if p > 1.0 && p <= 100.0 { p / 100.0 } else { p };
    if !(0.0..=1.0).contains(&p) {
        return Err(PickError::malformed(
            id,
            "model_probability",
            format!("out of range: {p}"),
        ));
    }
    Ok(Some(p))
}

/// `parseFloat`-style coercion: JSON numbers as-is, strings by their longest numeric
/// prefix. Non-finite results count as non-numeric.
pub fn parse_float(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_float_prefix(s)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut end = 0;

    if end < len && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }

    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if end < len && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut j = frac_start;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        mantissa_digits += j - frac_start;
        end = j;
    }

    if mantissa_digits == 0 {
        return None;
    }

    if end < len && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    s[..end].parse::<f64>().ok()
}

fn parse_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "1" | "yes"),
        _ => false,
    }
}

/// Calendar date from `YYYY-MM-DD` or any timestamp starting with one.
pub fn parse_event_date(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // Postgres text output uses a space separator and may drop the offset minutes.
    let t_sep = s.replacen(' ', "T", 1);
    if let Ok(t) = DateTime::parse_from_rfc3339(&t_sep) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(&t_sep, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&t_sep, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(ai_analysis: Value) -> Value {
        json!({
            "id": "pick-1",
            "league_name": "Premier League",
            "match": "Arsenal vs Brighton",
            "market_type": "1X2",
            "selection": "Arsenal",
            "odds": 1.85,
            "edge_percentage": 7.3,
            "ai_analysis": ai_analysis,
            "event_date": "2026-10-19",
            "is_gold": false,
        })
    }

    #[test]
    fn structured_analysis_text_and_insights() {
        let encoded = json!({"analysis_text": "X", "key_insights": ["a", "b"]}).to_string();
        let pick = normalize(&row(Value::String(encoded))).unwrap();

        assert_eq!(pick.analysis.narrative(), "X");
        assert_eq!(pick.analysis.key_insights(), ["a".to_string(), "b".to_string()]);
        assert!(pick.analysis.key_stats().unwrap().is_empty());
    }

    #[test]
    fn plain_prose_is_verbatim() {
        let pick = normalize(&row(json!("plain prose, no braces"))).unwrap();
        assert_eq!(
            pick.analysis,
            Analysis::plain("plain prose, no braces")
        );
        assert!(pick.analysis.key_insights().is_empty());
    }

    #[test]
    fn json_string_wrapping_prose_is_decoded() {
        let pick = normalize(&row(json!("\"Home side undervalued\""))).unwrap();
        assert_eq!(pick.analysis, Analysis::plain("Home side undervalued"));
    }

    #[test]
    fn corrupted_envelope_is_stripped() {
        // Valid envelope plus a stray trailing character, so it no longer parses.
        let raw = "{\"analysis_text\": \"Great bet\\nhere\"}x";
        assert!(serde_json::from_str::<Value>(raw).is_err());

        let analysis = parse_analysis(raw);
        let text = analysis.narrative();
        assert!(!text.contains(r#"{"analysis_text": ""#), "text={text:?}");
        assert!(!text.contains(r#""}"#), "text={text:?}");
        assert!(text.starts_with("Great bet\nhere"), "text={text:?}");
    }

    #[test]
    fn envelope_around_json_parses_the_inner_object() {
        let analysis = parse_analysis(r#"{"analysis_text": "{"market": 1}"}"#);
        match analysis {
            Analysis::Structured(s) => assert_eq!(s.market.as_deref(), Some("1")),
            other => panic!("expected structured, got {other:?}"),
        }
    }

    #[test]
    fn deeply_wrapped_prose_is_fully_decoded() {
        let mut raw = Value::String("prose".into());
        for _ in 0..6 {
            raw = Value::String(raw.to_string());
        }
        let pick = normalize(&row(raw)).unwrap();
        assert_eq!(pick.analysis, Analysis::plain("prose"));
    }

    #[test]
    fn stripping_does_not_reassemble_sentinels() {
        let text = strip_envelope("{oops a\"\"}}");
        assert!(!text.contains(r#""}"#), "text={text:?}");
    }

    #[test]
    fn generator_shape_is_structured() {
        let raw = json!({
            "market": "Price is off.",
            "factors": "- Missing centre back",
            "verdict": "Back the home side."
        })
        .to_string();
        let analysis = parse_analysis(&raw);

        assert_eq!(analysis.verdict(), Some("Back the home side."));
        assert_eq!(
            analysis.narrative(),
            "Price is off.\n\n- Missing centre back\n\nBack the home side."
        );
    }

    #[test]
    fn unrecognized_object_is_stringified() {
        let analysis = parse_analysis(r#"{"match_time": "20:00"}"#);
        assert_eq!(analysis, Analysis::plain(r#"{"match_time":"20:00"}"#));
    }

    #[test]
    fn key_stats_values_are_stringified() {
        let raw = json!({
            "analysis_text": "Goals expected",
            "key_stats": {"Home xG": 2.1, "Weather": "Good", "Skip": null}
        })
        .to_string();
        let analysis = parse_analysis(&raw);
        let stats = analysis.key_stats().unwrap();
        assert_eq!(stats.get("Home xG").map(String::as_str), Some("2.1"));
        assert_eq!(stats.get("Weather").map(String::as_str), Some("Good"));
        assert!(!stats.contains_key("Skip"));
    }

    #[test]
    fn object_valued_analysis_column_is_accepted() {
        let pick = normalize(&row(json!({"analysis_text": "From jsonb"}))).unwrap();
        assert_eq!(pick.analysis.narrative(), "From jsonb");
    }

    #[test]
    fn missing_analysis_is_empty_plain_text() {
        let mut r = row(Value::Null);
        r.as_object_mut().unwrap().remove("ai_analysis");
        let pick = normalize(&r).unwrap();
        assert_eq!(pick.analysis, Analysis::plain(""));
        assert_eq!(pick.analysis.display_text(), crate::config::ANALYSIS_PLACEHOLDER);
    }

    #[test]
    fn numeric_text_is_coerced() {
        let mut r = row(json!("ok"));
        r["odds"] = json!(" 2.10");
        r["edge_percentage"] = json!("8.6%");
        let pick = normalize(&r).unwrap();
        assert!((pick.odds - 2.10).abs() < 1e-12);
        assert!((pick.edge_percentage - 8.6).abs() < 1e-12);
    }

    #[test]
    fn non_numeric_odds_are_rejected() {
        let mut r = row(json!("ok"));
        r["odds"] = json!("evens");
        let err = normalize(&r).unwrap_err();
        assert!(matches!(err, PickError::Malformed { field: "odds", .. }));
    }

    #[test]
    fn odds_at_or_below_one_are_rejected() {
        for odds in [json!(1.0), json!(0), json!("0.95")] {
            let mut r = row(json!("ok"));
            r["odds"] = odds;
            assert!(normalize(&r).is_err());
        }
    }

    #[test]
    fn non_numeric_edge_is_rejected_not_zeroed() {
        let mut r = row(json!("ok"));
        r["edge_percentage"] = json!("n/a");
        let err = normalize(&r).unwrap_err();
        assert!(matches!(
            err,
            PickError::Malformed { field: "edge_percentage", .. }
        ));
    }

    #[test]
    fn model_probability_prefers_stored_value() {
        let mut r = row(json!("ok"));
        r["model_prob"] = json!(56.2);
        let pick = normalize(&r).unwrap();
        assert!((pick.model_probability - 0.562).abs() < 1e-12);
        // Stored edge kept as-is.
        assert!((pick.edge_percentage - 7.3).abs() < 1e-12);
    }

    #[test]
    fn model_probability_derived_from_edge() {
        let pick = normalize(&row(json!("ok"))).unwrap();
        assert!((pick.model_probability - 0.58).abs() < 1e-9);
    }

    #[test]
    fn edge_derived_when_only_probability_stored() {
        let mut r = row(json!("ok"));
        r.as_object_mut().unwrap().remove("edge_percentage");
        r["p_model"] = json!(0.58);
        let pick = normalize(&r).unwrap();
        assert!((pick.edge_percentage - 7.3).abs() < 1e-9);
    }

    #[test]
    fn impossible_edge_is_rejected() {
        let mut r = row(json!("ok"));
        r["edge_percentage"] = json!(250.0);
        assert!(normalize(&r).is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut deep_string = Value::String("prose".into());
        for _ in 0..6 {
            deep_string = Value::String(deep_string.to_string());
        }

        let shapes = vec![
            json!("plain prose, no braces"),
            json!("  leading space kept"),
            json!("\"wrapped prose\""),
            Value::String(json!({"analysis_text": "X", "key_insights": ["a", "b"]}).to_string()),
            Value::String(
                json!({"analysis_text": "", "key_stats": {"Form": "WWDLW"}, "verdict": "Back it"})
                    .to_string(),
            ),
            Value::String(json!({"market": "m", "factors": "f", "verdict": "v"}).to_string()),
            Value::String(json!({"key_insights": ["only insights"]}).to_string()),
            Value::String(json!({"match_time": "20:00", "n": 1.5}).to_string()),
            json!("{\"analysis_text\": \"Great bet\\nhere\"}x"),
            json!({"analysis_text": "jsonb column"}),
            json!(r#"{"analysis_text": "{"market": 1}"}"#),
            json!(r#"{"analysis_text": "\"quoted\" after the envelope"}"#),
            json!(deep_string),
            Value::Null,
        ];

        for shape in shapes {
            let mut r = row(shape.clone());
            r["created_at"] = json!("2026-10-18 09:30:00.123+00");
            let once = normalize(&r).unwrap();
            let twice = normalize(&to_record(&once)).unwrap();
            assert_eq!(once, twice, "shape={shape}");
        }
    }

    #[test]
    fn batch_counts_rejections() {
        let mut bad = row(json!("ok"));
        bad["id"] = json!("bad-1");
        bad["odds"] = json!(null);
        let rows = vec![row(json!("ok")), bad, json!({"odds": 2.0})];

        let (picks, stats) = normalize_rows(&rows);
        assert_eq!(picks.len(), 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.rejection_samples[0].0, "bad-1");
    }

    #[test]
    fn parse_float_follows_prefix_rules() {
        assert_eq!(parse_float(&json!("1.85abc")), Some(1.85));
        assert_eq!(parse_float(&json!(".5")), Some(0.5));
        assert_eq!(parse_float(&json!("-3e2x")), Some(-300.0));
        assert_eq!(parse_float(&json!("2e")), Some(2.0));
        assert_eq!(parse_float(&json!("abc")), None);
        assert_eq!(parse_float(&json!("")), None);
        assert_eq!(parse_float(&json!(true)), None);
        assert_eq!(parse_float(&json!("1e999")), None);
    }

    #[test]
    fn dates_and_flags_are_lenient() {
        assert_eq!(
            parse_event_date("2026-10-19T20:00:00Z"),
            NaiveDate::from_ymd_opt(2026, 10, 19)
        );
        assert_eq!(parse_event_date("tomorrow"), None);

        let mut r = row(json!("ok"));
        r["is_gold"] = json!("true");
        r["created_at"] = json!("2026-10-18T09:30:00Z");
        let pick = normalize(&r).unwrap();
        assert!(pick.is_gold);
        assert!(pick.created_at.is_some());
    }
}
