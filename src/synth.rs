//! LLM synthesis: turns already-fetched tile data into a few extra insight
//! lines for the `analyze` action.
//!
//! Providers never fail loudly. `None` means "no AI output", and the tile is
//! served without it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::query::QueryContext;
use crate::tile::NormalizedTileData;

/// Trait object used by the pipeline and tests.
pub trait Synthesizer: Send + Sync {
    /// Zero or more sanitized insight lines (each <=160 ASCII chars).
    fn synthesize<'a>(
        &'a self,
        ctx: &'a QueryContext,
        data: &'a NormalizedTileData,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>>;
    /// Provider name for diagnostics/headers.
    fn provider_name(&self) -> &'static str;
}

pub type DynSynthesizer = Arc<dyn Synthesizer>;

pub const ENV_AI_MODE: &str = "IDEA_PULSE_AI_MODE";

/// Factory: build a synthesizer according to config and environment.
///
/// * `IDEA_PULSE_AI_MODE=mock` → deterministic mock.
/// * disabled config or missing key → disabled.
/// * otherwise OpenAI, wrapped with the daily limit.
pub fn build_synthesizer(config: &AiConfig) -> DynSynthesizer {
    if std::env::var(ENV_AI_MODE).map(|v| v == "mock").unwrap_or(false) {
        return Arc::new(MockSynthesizer::new(["Demand signal looks consistent across sources (mock)"]));
    }
    if !config.enabled {
        return Arc::new(DisabledSynthesizer);
    }
    match config.provider.as_str() {
        "openai" if !config.api_key.trim().is_empty() => {
            match OpenAiSynthesizer::new(config.api_key.clone(), config.model.as_deref(), config.max_insights) {
                Ok(p) => Arc::new(DailyLimited::new(p, config.daily_limit)),
                Err(e) => {
                    tracing::warn!(error = %e, "openai client init failed, synthesis disabled");
                    Arc::new(DisabledSynthesizer)
                }
            }
        }
        other => {
            tracing::warn!(provider = other, "AI provider unavailable, synthesis disabled");
            Arc::new(DisabledSynthesizer)
        }
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// OpenAI Chat Completions.
pub struct OpenAiSynthesizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_insights: usize,
}

impl OpenAiSynthesizer {
    /// `model_override`: defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>, max_insights: usize) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("idea-pulse/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
            max_insights: max_insights.max(1),
        })
    }
}

impl Synthesizer for OpenAiSynthesizer {
    fn synthesize<'a>(
        &'a self,
        ctx: &'a QueryContext,
        data: &'a NormalizedTileData,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = "You are a startup market analyst. Given market signal for an idea, return up to 3 short, concrete insights, one per line, <=160 ASCII chars each, no numbering, no emojis.";
            let prompt = build_prompt(ctx, data);
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg { role: "system", content: sys },
                    Msg { role: "user", content: &prompt },
                ],
                temperature: 0.3,
                max_tokens: 220,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .ok()?;
            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), "openai synthesis rejected");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body.choices.first().map(|c| c.message.content.as_str())?;
            let lines = split_insights(content, self.max_insights);
            (!lines.is_empty()).then_some(lines)
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledSynthesizer;

impl Synthesizer for DisabledSynthesizer {
    fn synthesize<'a>(
        &'a self,
        _ctx: &'a QueryContext,
        _data: &'a NormalizedTileData,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed lines for tests/local runs.
#[derive(Clone)]
pub struct MockSynthesizer {
    pub fixed: Vec<String>,
}

impl MockSynthesizer {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fixed: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize<'a>(
        &'a self,
        _ctx: &'a QueryContext,
        _data: &'a NormalizedTileData,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        let out: Vec<String> = self
            .fixed
            .iter()
            .map(|s| sanitize_insight(s))
            .filter(|s| !s.is_empty())
            .collect();
        Box::pin(async move { (!out.is_empty()).then_some(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Daily limit wrapper
// ------------------------------------------------------------

/// Caps real provider calls per UTC day. Calls that return nothing are not counted.
pub struct DailyLimited<S: Synthesizer> {
    inner: S,
    max: u32,
    counter: Mutex<(NaiveDate, u32)>,
}

impl<S: Synthesizer> DailyLimited<S> {
    pub fn new(inner: S, max: u32) -> Self {
        Self {
            inner,
            max,
            counter: Mutex::new((Utc::now().date_naive(), 0)),
        }
    }

    /// Takes one call from today's budget, if any is left.
    fn reserve(&self) -> bool {
        let Ok(mut g) = self.counter.lock() else {
            return false;
        };
        let today = Utc::now().date_naive();
        if g.0 != today {
            *g = (today, 0);
        }
        if g.1 >= self.max {
            return false;
        }
        g.1 += 1;
        true
    }

    fn refund(&self) {
        if let Ok(mut g) = self.counter.lock() {
            g.1 = g.1.saturating_sub(1);
        }
    }

    async fn synthesize_impl(&self, ctx: &QueryContext, data: &NormalizedTileData) -> Option<Vec<String>> {
        if !self.reserve() {
            tracing::info!(provider = self.inner.provider_name(), "daily AI limit reached");
            return None;
        }
        let out = self.inner.synthesize(ctx, data).await;
        if out.is_none() {
            self.refund();
        }
        out
    }
}

impl<S: Synthesizer> Synthesizer for DailyLimited<S> {
    fn synthesize<'a>(
        &'a self,
        ctx: &'a QueryContext,
        data: &'a NormalizedTileData,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<String>>> + Send + 'a>> {
        Box::pin(self.synthesize_impl(ctx, data))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

// ------------------------------------------------------------
// Prompt + sanitization
// ------------------------------------------------------------

fn build_prompt(ctx: &QueryContext, data: &NormalizedTileData) -> String {
    let mut p = format!("Idea: {}\nTile: {}\n", ctx.idea_text.trim(), ctx.tile_type);
    if let Some(i) = &ctx.industry {
        p.push_str(&format!("Industry: {i}\n"));
    }
    if let Some(g) = &ctx.geography {
        p.push_str(&format!("Geography: {g}\n"));
    }
    for m in &data.metrics {
        p.push_str(&format!("Metric {}: {}\n", m.name, m.value));
    }
    if let Some(s) = data.sentiment {
        p.push_str(&format!(
            "Sentiment: {}% positive, {}% neutral, {}% negative\n",
            s.positive, s.neutral, s.negative
        ));
    }
    for it in data.items.iter().take(8) {
        p.push_str(&format!("- {}\n", it.title));
    }
    for ins in data.insights.iter().take(5) {
        p.push_str(&format!("Known: {ins}\n"));
    }
    p
}

fn split_insights(content: &str, max: usize) -> Vec<String> {
    content
        .lines()
        .map(|l| l.trim_start_matches(|c: char| c == '-' || c == '*' || c.is_ascii_digit() || c == '.' || c == ' '))
        .map(sanitize_insight)
        .filter(|l| !l.is_empty())
        .take(max)
        .collect()
}

/// Ensure ASCII-only, single line, and <=160 chars. Collapses whitespace.
pub fn sanitize_insight(input: &str) -> String {
    let mut out = String::with_capacity(160);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= 160 {
            break;
        }
    }
    out.trim().to_string()
}
