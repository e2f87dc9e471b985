// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /tiles/fetch     (MISS → HIT via `X-Tile-Cache`)
// - POST /tiles/refresh   (always MISS, new data)
// - POST /tiles/analyze   (`X-AI-Used`)
// - 400 for bad queries, 502 when every source fails
// - app() boot from a config file in demo mode

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use serial_test::serial;
use tower::ServiceExt as _; // for `oneshot`

use idea_pulse::cache::MemoryCache;
use idea_pulse::fetchers::fixed::FixedReply;
use idea_pulse::fetchers::FixedFetcher;
use idea_pulse::retry::RetryPolicy;
use idea_pulse::source::SourceName;
use idea_pulse::synth::MockSynthesizer;
use idea_pulse::{create_router, AppState, TilePipeline};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn router_with(fetcher: Arc<FixedFetcher>) -> Router {
    let pipeline = TilePipeline::new(fetcher, Arc::new(MemoryCache::default()))
        .with_retry(RetryPolicy::default().with_base_delay(Duration::from_millis(1)).with_max_retries(1))
        .with_synthesizer(Arc::new(MockSynthesizer::new(["Niche B2B buyers look reachable"])));
    create_router(AppState::new(pipeline))
}

async fn post(app: &Router, uri: &str, body: Value, user: Option<&str>) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(u) = user {
        req = req.header("X-User-Id", u);
    }
    let req = req
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("request build");
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

fn header<'a>(h: &'a HeaderMap, name: &str) -> &'a str {
    h.get(name)
        .unwrap_or_else(|| panic!("{name} header must be present"))
        .to_str()
        .expect("ascii header")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = router_with(Arc::new(FixedFetcher::new()));
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "OK");
}

#[tokio::test]
async fn fetch_is_miss_then_hit() {
    let app = router_with(Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 75}))));
    let body = json!({"ideaText": "AI-powered personal assistant", "tileType": "pmf_score"});

    let (status, h, json) = post(&app, "/tiles/fetch", body.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&h, "X-Tile-Cache"), "MISS");
    assert_eq!(json["metrics"][0]["name"], "PMF Score");
    assert_eq!(json["metrics"][0]["value"], "75%");
    assert_eq!(json["metrics"][0]["explanation"], "Strong PMF");
    assert_eq!(json["sentiment"], json!({"positive": 85, "neutral": 10, "negative": 5}));
    assert_eq!(json["filters"]["ideaText"], "AI-powered personal assistant");
    assert!(json.get("error").is_none());

    let (_, h, _) = post(&app, "/tiles/fetch", body, None).await;
    assert_eq!(header(&h, "X-Tile-Cache"), "HIT");
}

#[tokio::test]
async fn refresh_is_always_a_miss_with_new_data() {
    let fetcher = Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 20})));
    let app = router_with(fetcher.clone());
    let body = json!({"ideaText": "idea", "tileType": "pmf_score", "industry": "fintech"});

    post(&app, "/tiles/fetch", body.clone(), Some("u1")).await;
    fetcher.set(SourceName::Llm, FixedReply::Data(json!({"score": 50})));

    let (status, h, json) = post(&app, "/tiles/refresh", body.clone(), Some("u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&h, "X-Tile-Cache"), "MISS");
    assert_eq!(json["metrics"][0]["explanation"], "Moderate PMF");

    let (_, h, json) = post(&app, "/tiles/fetch", body, Some("u1")).await;
    assert_eq!(header(&h, "X-Tile-Cache"), "HIT");
    assert_eq!(json["metrics"][0]["value"], "50%");
}

#[tokio::test]
async fn analyze_reports_ai_usage() {
    let app = router_with(Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 60}))));
    let body = json!({"ideaText": "idea", "tileType": "pmf_score"});
    let (status, h, json) = post(&app, "/tiles/analyze", body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&h, "X-AI-Used"), "1");
    assert_eq!(header(&h, "X-Tile-Cache"), "MISS");
    let insights = json["insights"].as_array().unwrap();
    assert!(insights.iter().any(|i| i == "Niche B2B buyers look reachable"));
}

#[tokio::test]
async fn blank_idea_is_400() {
    let fetcher = Arc::new(FixedFetcher::new());
    let app = router_with(fetcher.clone());
    let (status, _, json) = post(&app, "/tiles/fetch", json!({"ideaText": "  ", "tileType": "news"}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "configuration");
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let app = router_with(Arc::new(FixedFetcher::new()));
    let (status, _, json) = post(&app, "/tiles/fetch", json!({"tileType": "news"}), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "configuration");
}

#[tokio::test]
async fn total_failure_is_502_and_retryable() {
    let app = router_with(Arc::new(FixedFetcher::new().failing(SourceName::News, "upstream 500")));
    let (status, h, json) = post(&app, "/tiles/fetch", json!({"ideaText": "idea", "tileType": "news"}), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "total_fetch_failure");
    assert_eq!(json["retryable"], true);
    assert!(h.get("X-Tile-Cache").is_none());
}

#[tokio::test]
async fn recency_sort_puts_newest_first() {
    let app = router_with(Arc::new(FixedFetcher::new().with(
        SourceName::News,
        json!({"articles": [
            {"title": "old", "url": "https://n.example.com/1", "publishedAt": "2023-01-01T00:00:00Z"},
            {"title": "undated", "url": "https://n.example.com/2"},
            {"title": "new", "url": "https://n.example.com/3", "publishedAt": "2024-06-01T00:00:00Z"}
        ]}),
    )));
    let (_, _, json) = post(
        &app,
        "/tiles/fetch",
        json!({"ideaText": "idea", "tileType": "news", "sort": "recency"}),
        None,
    )
    .await;
    let titles: Vec<&str> = json["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["new", "old", "undated"]);
}

#[tokio::test]
#[serial]
async fn app_boots_from_config_in_demo_mode() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("app.toml");
    std::fs::write(
        &cfg_path,
        format!(
            "[cache]\nstore_dir = \"{}\"\n[fetchers]\nmode = \"demo\"\n[metrics]\nenabled = false\n[ai]\nconfig_path = \"{}\"\n",
            dir.path().join("tiles").display(),
            dir.path().join("missing-ai.json").display()
        ),
    )
    .unwrap();
    std::env::set_var("IDEA_PULSE_CONFIG_PATH", &cfg_path);

    let app = idea_pulse::app().await.expect("app() should build Router in tests");
    let (status, h, json) = post(
        &app,
        "/tiles/fetch",
        json!({"ideaText": "Dog walking app", "tileType": "reddit"}),
        Some("demo-user"),
    )
    .await;
    std::env::remove_var("IDEA_PULSE_CONFIG_PATH");

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&h, "X-Tile-Cache"), "MISS");
    assert!(!json["items"].as_array().unwrap().is_empty());
}
