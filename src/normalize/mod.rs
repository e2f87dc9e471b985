//! # Normalizer
//! Maps each source's response shape into [`NormalizedTileData`].
//!
//! Never fails: malformed or partial upstream JSON degrades to defaults
//! (numbers → 0, lists → empty, sentiment → placeholder), and every result
//! carries at least one metric. No clocks or randomness are consulted, so
//! the same input always yields the same output.

pub mod breakdown;
pub(crate) mod shapes;
mod sources;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use crate::query::QueryContext;
use crate::tile::{Citation, NormalizedTileData, TileItem, TileKind};

/// Normalize a raw response for the given tile type.
pub fn normalize(tile_type: &str, raw: &Value) -> NormalizedTileData {
    let kind = TileKind::parse(tile_type);
    let mut data = match kind {
        TileKind::PmfScore => sources::pmf(raw),
        TileKind::Reddit => sources::reddit(raw),
        TileKind::YouTube => sources::youtube(raw),
        TileKind::News => sources::news(raw),
        TileKind::WebSearch => sources::web_search(raw),
        TileKind::Sentiment => sources::unified_sentiment(raw),
        TileKind::Other(_) => sources::generic(raw),
    };
    data.updated_at = read_updated_at(raw);
    data.ensure_metrics()
}

/// Normalize and attach the originating query as `filters`.
pub fn normalize_for(ctx: &QueryContext, raw: &Value) -> NormalizedTileData {
    normalize(&ctx.tile_type, raw).with_filters(ctx)
}

// ------------------------------------------------------------
// Fallback chain + lenient scalars
// ------------------------------------------------------------

/// Find the layer that actually holds the payload.
/// Order: `data.summary` → `data` → `summary` → top level; the first object
/// containing any of `keys` wins, otherwise the top level is used.
pub(crate) fn locate<'a>(raw: &'a Value, keys: &[&str]) -> &'a Value {
    let candidates = [
        raw.get("data").and_then(|d| d.get("summary")),
        raw.get("data"),
        raw.get("summary"),
        Some(raw),
    ];
    for c in candidates.into_iter().flatten() {
        if let Some(obj) = c.as_object() {
            if keys.iter().any(|k| obj.contains_key(*k)) {
                return c;
            }
        }
    }
    raw
}

/// Numbers arrive as numbers, numeric strings ("1,204", "75%"), or not at all.
pub(crate) fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '%' | '_'))
                .collect();
            cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
        }
        _ => None,
    }
}

/// Upstream timestamps: unix seconds/millis, RFC 3339, GDELT compact, or plain dates.
pub(crate) fn parse_published(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            let t = n.as_f64()?;
            let secs = if t > 1e12 { t / 1000.0 } else { t };
            Utc.timestamp_opt(secs as i64, 0).single()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt))
        }
        _ => None,
    }
}

fn read_updated_at(raw: &Value) -> DateTime<Utc> {
    shapes::parse::<shapes::Stamp>(raw)
        .at()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Build citations from url-bearing items, first occurrence per url.
pub(crate) fn citations_from_items(items: &[TileItem], fallback_source: &str) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for it in items {
        let Some(url) = it.url.as_ref() else { continue };
        if out.iter().any(|c| &c.url == url) {
            continue;
        }
        out.push(Citation {
            source: it
                .source
                .clone()
                .unwrap_or_else(|| fallback_source.to_string()),
            url: url.clone(),
            title: it.title.clone(),
        });
    }
    out
}

/// Decode entities, strip tags, collapse whitespace, cap length.
pub fn clean_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = re_tags.replace_all(&decoded, "");
    let mut out = re_ws.replace_all(&stripped, " ").trim().to_string();

    const MAX_CHARS: usize = 400;
    if out.chars().count() > MAX_CHARS {
        out = out.chars().take(MAX_CHARS - 3).collect::<String>();
        out.push_str("...");
    }
    out
}

/// Whole numbers print without a fractional part.
pub(crate) fn fmt_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{:.1}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locate_follows_fallback_chain() {
        let nested = json!({"data": {"summary": {"score": 10}}});
        assert_eq!(locate(&nested, &["score"])["score"], 10);
        let data = json!({"data": {"score": 20}});
        assert_eq!(locate(&data, &["score"])["score"], 20);
        let flat = json!({"score": 30});
        assert_eq!(locate(&flat, &["score"])["score"], 30);
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(as_number(&json!("1,204")), Some(1204.0));
        assert_eq!(as_number(&json!("75%")), Some(75.0));
        assert_eq!(as_number(&json!(null)), None);
        assert_eq!(as_number(&json!("n/a")), None);
    }

    #[test]
    fn clean_text_strips_markup() {
        assert_eq!(clean_text("  <b>Hello</b>&nbsp;&amp;\n world "), "Hello & world");
    }

    #[test]
    fn published_formats() {
        let a = parse_published(&json!("20240102T030405Z")).unwrap();
        let b = parse_published(&json!("2024-01-02T03:04:05Z")).unwrap();
        assert_eq!(a, b);
        let c = parse_published(&json!(1_704_164_645_000u64)).unwrap();
        assert_eq!(c, b);
        assert!(parse_published(&json!("2 days ago")).is_none());
    }

    #[test]
    fn updated_at_comes_from_payload_or_epoch() {
        let d = normalize("news", &json!({"updatedAt": "2024-05-01T00:00:00Z"}));
        assert_eq!(d.updated_at.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        let d = normalize("news", &json!({}));
        assert_eq!(d.updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }
}
