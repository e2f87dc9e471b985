//! Typed, tolerant views of upstream payloads.
//!
//! Every field goes through a lenient deserializer: wrong types, nulls and
//! unparsable strings fall back to the field default instead of failing the
//! whole document, and list elements that do not parse are skipped. Aliases
//! only cover spelling variants of one field (`publishedAt` / `published_at`);
//! distinct upstream keys that can appear side by side get their own field and
//! are resolved in order by the accessors.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::breakdown::{self, Polarity};
use super::{as_number, clean_text, locate, parse_published};
use crate::tile::{Citation, Sentiment};

/// A payload shape together with the keys that identify its layer in the
/// `data.summary` → `data` → `summary` → top-level chain.
pub(crate) trait Payload: DeserializeOwned + Default {
    const KEYS: &'static [&'static str];
}

/// Parse an object layer; anything unreadable yields the default shape.
pub(crate) fn parse<T: DeserializeOwned + Default>(v: &Value) -> T {
    if !v.is_object() {
        return T::default();
    }
    T::deserialize(v).unwrap_or_default()
}

/// Locate the payload layer and parse it. The layer is returned too so that
/// shared fields ([`Common`]) can be read from the same place.
pub(crate) fn read<T: Payload>(raw: &Value) -> (T, &Value) {
    let v = locate(raw, T::KEYS);
    (parse(v), v)
}

fn first_non_empty<T, const N: usize>(lists: [Vec<T>; N]) -> Vec<T> {
    lists.into_iter().find(|l| !l.is_empty()).unwrap_or_default()
}

mod de {
    use super::*;

    pub fn num<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(as_number(&Value::deserialize(d)?))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(text_of(&Value::deserialize(d)?))
    }

    pub fn time<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(parse_published(&Value::deserialize(d)?))
    }

    /// Array of objects; other elements and non-arrays are dropped.
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|x| serde_json::from_value(x).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Array of strings or objects.
    pub fn mixed_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter(|x| x.is_object() || x.is_string())
                .filter_map(|x| serde_json::from_value(x).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Nested object, or `None`.
    pub fn object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let v = Value::deserialize(d)?;
        if !v.is_object() {
            return Ok(None);
        }
        Ok(serde_json::from_value(v).ok())
    }

    pub fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).unwrap_or_default())
    }
}

/// Strings, numbers, or `{"name": ..}` / `{"title": ..}` objects, cleaned.
fn text_of(v: &Value) -> Option<String> {
    let raw = match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        // e.g. {"source": {"name": "Reuters"}}
        Value::Object(o) => o
            .get("name")
            .or_else(|| o.get("title"))
            .and_then(Value::as_str)?
            .to_string(),
        _ => return None,
    };
    Some(clean_text(&raw)).filter(|s| !s.is_empty())
}

// ------------------------------------------------------------
// Sentiment fields
// ------------------------------------------------------------

/// A number that may arrive as a numeric string ("1,204", "75%").
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Num(pub f64);

impl<'de> Deserialize<'de> for Num {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        as_number(&v).map(Num).ok_or_else(|| D::Error::custom("expected a number"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Breakdown {
    #[serde(alias = "pos", deserialize_with = "de::num")]
    positive: Option<f64>,
    #[serde(alias = "neu", deserialize_with = "de::num")]
    neutral: Option<f64>,
    #[serde(alias = "neg", deserialize_with = "de::num")]
    negative: Option<f64>,
}

impl Breakdown {
    pub fn percentages(&self) -> Option<Sentiment> {
        breakdown::percentages(
            self.positive.unwrap_or(0.0),
            self.neutral.unwrap_or(0.0),
            self.negative.unwrap_or(0.0),
        )
    }
}

/// `sentiment` arrives as a breakdown object, a scalar score, or a label.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum SentimentField {
    Breakdown(Breakdown),
    Score(Num),
    Label(String),
}

impl SentimentField {
    fn polarity(&self) -> Option<Polarity> {
        match self {
            SentimentField::Label(l) => Polarity::from_label(l),
            SentimentField::Score(Num(x)) => Some(Polarity::from_score(*x)),
            SentimentField::Breakdown(_) => None,
        }
    }
}

/// Per-mention polarity fields, flattened into each mention shape.
/// Flattened structs match on exact names only, hence no aliases here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Tone {
    #[serde(deserialize_with = "de::lenient")]
    sentiment: Option<SentimentField>,
    #[serde(deserialize_with = "de::lenient")]
    sentiment_label: Option<SentimentField>,
    #[serde(deserialize_with = "de::lenient")]
    label: Option<SentimentField>,
    #[serde(deserialize_with = "de::lenient")]
    sentiment_score: Option<SentimentField>,
    #[serde(rename = "sentimentScore", deserialize_with = "de::lenient")]
    sentiment_score_camel: Option<SentimentField>,
    #[serde(deserialize_with = "de::lenient")]
    tone: Option<SentimentField>,
    #[serde(deserialize_with = "de::lenient")]
    polarity: Option<SentimentField>,
}

impl Tone {
    /// First field that reads as a polarity, in priority order.
    pub fn polarity(&self) -> Option<Polarity> {
        [
            &self.sentiment,
            &self.sentiment_label,
            &self.label,
            &self.sentiment_score,
            &self.sentiment_score_camel,
            &self.tone,
            &self.polarity,
        ]
        .into_iter()
        .flatten()
        .find_map(SentimentField::polarity)
    }
}

// ------------------------------------------------------------
// Shared layer fields
// ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Insight {
    Line(String),
    Note(InsightNote),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InsightNote {
    #[serde(deserialize_with = "de::text")]
    text: Option<String>,
    #[serde(deserialize_with = "de::text")]
    insight: Option<String>,
    #[serde(deserialize_with = "de::text")]
    title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    summary: Option<String>,
}

impl Insight {
    fn into_text(self) -> Option<String> {
        let text = match self {
            Insight::Line(s) => Some(clean_text(&s)),
            Insight::Note(n) => n.text.or(n.insight).or(n.title).or(n.summary),
        };
        text.filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CitationShape {
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(deserialize_with = "de::text")]
    title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    source: Option<String>,
    #[serde(deserialize_with = "de::text")]
    name: Option<String>,
}

/// Fields any source layer may carry next to its list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Common {
    #[serde(deserialize_with = "de::mixed_list")]
    insights: Vec<Insight>,
    #[serde(alias = "keyInsights", deserialize_with = "de::mixed_list")]
    key_insights: Vec<Insight>,
    #[serde(deserialize_with = "de::mixed_list")]
    takeaways: Vec<Insight>,
    #[serde(deserialize_with = "de::mixed_list")]
    recommendations: Vec<Insight>,

    #[serde(deserialize_with = "de::lenient")]
    sentiment: Option<SentimentField>,
    #[serde(alias = "sentimentBreakdown", deserialize_with = "de::object")]
    sentiment_breakdown: Option<Breakdown>,
    #[serde(alias = "sentimentScore", deserialize_with = "de::num")]
    sentiment_score: Option<f64>,
    #[serde(alias = "overallSentiment", deserialize_with = "de::num")]
    overall_sentiment: Option<f64>,

    #[serde(deserialize_with = "de::list")]
    citations: Vec<CitationShape>,
    #[serde(deserialize_with = "de::list")]
    sources: Vec<CitationShape>,
}

impl Common {
    pub fn insights(&self) -> Vec<String> {
        first_non_empty([
            self.insights.clone(),
            self.key_insights.clone(),
            self.takeaways.clone(),
            self.recommendations.clone(),
        ])
        .into_iter()
        .filter_map(Insight::into_text)
        .collect()
    }

    /// Explicit breakdown object, if one with any mass is present.
    pub fn breakdown(&self) -> Option<Sentiment> {
        let from_field = match &self.sentiment {
            Some(SentimentField::Breakdown(b)) => b.percentages(),
            _ => None,
        };
        from_field.or_else(|| self.sentiment_breakdown.as_ref()?.percentages())
    }

    /// Explicit breakdown → scalar placeholder → default placeholder.
    pub fn sentiment(&self) -> Sentiment {
        if let Some(s) = self.breakdown() {
            return s;
        }
        let field_score = match &self.sentiment {
            Some(SentimentField::Score(Num(x))) => Some(*x),
            _ => None,
        };
        let scalar = self
            .sentiment_score
            .or(self.overall_sentiment)
            .or(field_score);
        breakdown::placeholder(scalar)
    }

    /// Citations the payload lists itself; entries without a url are dropped.
    pub fn citations(&self, fallback_source: &str) -> Vec<Citation> {
        first_non_empty([self.citations.clone(), self.sources.clone()])
            .into_iter()
            .filter_map(|c| {
                Some(Citation {
                    url: c.url.or(c.link)?,
                    title: c.title.unwrap_or_default(),
                    source: c
                        .source
                        .or(c.name)
                        .unwrap_or_else(|| fallback_source.to_string()),
                })
            })
            .collect()
    }
}

/// Declared mention volume next to a source list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Volume {
    #[serde(alias = "totalMentions", deserialize_with = "de::num")]
    total_mentions: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    mentions: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    total: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    count: Option<f64>,
}

impl Volume {
    pub fn declared(&self) -> u64 {
        self.total_mentions
            .or(self.mentions)
            .or(self.total)
            .or(self.count)
            .unwrap_or(0.0)
            .max(0.0) as u64
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Stamp {
    #[serde(alias = "updatedAt", deserialize_with = "de::time")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    timestamp: Option<DateTime<Utc>>,
}

impl Stamp {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.timestamp)
    }
}

// ------------------------------------------------------------
// Mentions, as the aggregator sees them
// ------------------------------------------------------------

/// One discussion item reduced to what the aggregator needs.
pub(crate) trait AsMention {
    fn body(&self) -> Option<String>;
    fn heading(&self) -> Option<String>;
    fn link(&self) -> Option<String>;
    fn tone(&self) -> &Tone;
}

// ------------------------------------------------------------
// PMF
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PmfPayload {
    #[serde(deserialize_with = "de::num")]
    score: Option<f64>,
    #[serde(alias = "pmfScore", deserialize_with = "de::num")]
    pmf_score: Option<f64>,
}

impl Payload for PmfPayload {
    const KEYS: &'static [&'static str] = &["score", "pmf_score", "pmfScore"];
}

impl PmfPayload {
    pub fn score(&self) -> f64 {
        self.score.or(self.pmf_score).unwrap_or(0.0)
    }
}

// ------------------------------------------------------------
// Reddit
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RedditPayload {
    #[serde(deserialize_with = "de::list")]
    posts: Vec<RedditPost>,
    #[serde(deserialize_with = "de::list")]
    comments: Vec<RedditPost>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<RedditPost>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<RedditPost>,
}

impl Payload for RedditPayload {
    const KEYS: &'static [&'static str] = &["posts", "comments", "results", "items"];
}

impl RedditPayload {
    pub fn entries(self) -> Vec<RedditPost> {
        first_non_empty([self.posts, self.comments, self.results, self.items])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RedditPost {
    #[serde(deserialize_with = "de::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    selftext: Option<String>,
    #[serde(deserialize_with = "de::text")]
    body: Option<String>,
    #[serde(deserialize_with = "de::text")]
    text: Option<String>,
    #[serde(deserialize_with = "de::text")]
    snippet: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    permalink: Option<String>,
    #[serde(deserialize_with = "de::text")]
    subreddit: Option<String>,
    #[serde(deserialize_with = "de::num")]
    score: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    ups: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    upvotes: Option<f64>,
    #[serde(alias = "numComments", deserialize_with = "de::num")]
    num_comments: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    comments: Option<f64>,
    #[serde(deserialize_with = "de::time")]
    created_utc: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    created: Option<DateTime<Utc>>,
    #[serde(alias = "createdAt", deserialize_with = "de::time")]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    tone: Tone,
}

impl RedditPost {
    pub fn snippet(&self) -> Option<String> {
        self.selftext
            .clone()
            .or_else(|| self.body.clone())
            .or_else(|| self.text.clone())
            .or_else(|| self.snippet.clone())
    }

    /// Absolute url; bare permalinks are rooted at reddit.com.
    pub fn url(&self) -> Option<String> {
        let u = self.url.clone().or_else(|| self.permalink.clone())?;
        Some(if u.starts_with('/') {
            format!("https://www.reddit.com{u}")
        } else {
            u
        })
    }

    pub fn community(&self) -> Option<String> {
        self.subreddit.as_ref().map(|s| {
            if s.starts_with("r/") {
                s.clone()
            } else {
                format!("r/{s}")
            }
        })
    }

    pub fn upvotes(&self) -> f64 {
        self.score.or(self.ups).or(self.upvotes).unwrap_or(0.0)
    }

    pub fn comment_count(&self) -> f64 {
        self.num_comments.or(self.comments).unwrap_or(0.0)
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.created_utc.or(self.created).or(self.created_at)
    }
}

impl AsMention for RedditPost {
    fn body(&self) -> Option<String> {
        self.snippet().or_else(|| self.title.clone())
    }
    fn heading(&self) -> Option<String> {
        self.title.clone()
    }
    fn link(&self) -> Option<String> {
        self.url()
    }
    fn tone(&self) -> &Tone {
        &self.tone
    }
}

// ------------------------------------------------------------
// Twitter
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TwitterPayload {
    #[serde(deserialize_with = "de::list")]
    tweets: Vec<Tweet>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<Tweet>,
    #[serde(deserialize_with = "de::list")]
    data: Vec<Tweet>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<Tweet>,
}

impl Payload for TwitterPayload {
    const KEYS: &'static [&'static str] = &["tweets", "results", "data", "items"];
}

impl TwitterPayload {
    pub fn entries(self) -> Vec<Tweet> {
        first_non_empty([self.tweets, self.results, self.data, self.items])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Tweet {
    #[serde(deserialize_with = "de::text")]
    text: Option<String>,
    #[serde(deserialize_with = "de::text")]
    full_text: Option<String>,
    #[serde(deserialize_with = "de::text")]
    content: Option<String>,
    #[serde(deserialize_with = "de::text")]
    author: Option<String>,
    #[serde(deserialize_with = "de::text")]
    username: Option<String>,
    #[serde(deserialize_with = "de::text")]
    user: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(flatten)]
    tone: Tone,
}

impl AsMention for Tweet {
    fn body(&self) -> Option<String> {
        self.full_text
            .clone()
            .or_else(|| self.text.clone())
            .or_else(|| self.content.clone())
    }
    fn heading(&self) -> Option<String> {
        self.author
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.user.clone())
    }
    fn link(&self) -> Option<String> {
        self.url.clone().or_else(|| self.link.clone())
    }
    fn tone(&self) -> &Tone {
        &self.tone
    }
}

// ------------------------------------------------------------
// YouTube
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct YouTubePayload {
    #[serde(deserialize_with = "de::list")]
    videos: Vec<Video>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<Video>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<Video>,
    #[serde(deserialize_with = "de::list")]
    comments: Vec<Video>,
}

impl Payload for YouTubePayload {
    const KEYS: &'static [&'static str] = &["videos", "items", "results", "comments"];
}

impl YouTubePayload {
    pub fn entries(self) -> Vec<Video> {
        first_non_empty([self.videos, self.items, self.results, self.comments])
    }
}

/// Text fields; the Data API nests these under `snippet`, flattened
/// responses carry them at the top of the video. Exact names only, since
/// this is also flattened into [`Video`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VideoSnippet {
    #[serde(deserialize_with = "de::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    pub description: Option<String>,
    #[serde(rename = "channelTitle", deserialize_with = "de::text")]
    channel_title: Option<String>,
    #[serde(rename = "channel_title", deserialize_with = "de::text")]
    channel_title_snake: Option<String>,
    #[serde(deserialize_with = "de::text")]
    channel: Option<String>,
    #[serde(rename = "publishedAt", deserialize_with = "de::time")]
    published_at: Option<DateTime<Utc>>,
    #[serde(rename = "published_at", deserialize_with = "de::time")]
    published_at_snake: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    published: Option<DateTime<Utc>>,
}

impl VideoSnippet {
    pub fn channel(&self) -> Option<String> {
        self.channel_title
            .clone()
            .or_else(|| self.channel.clone())
            .or_else(|| self.channel_title_snake.clone())
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .or(self.published_at_snake)
            .or(self.published)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VideoStats {
    #[serde(rename = "viewCount", deserialize_with = "de::num")]
    view_count: Option<f64>,
    #[serde(rename = "view_count", deserialize_with = "de::num")]
    view_count_snake: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    views: Option<f64>,
    #[serde(rename = "likeCount", deserialize_with = "de::num")]
    like_count: Option<f64>,
    #[serde(rename = "like_count", deserialize_with = "de::num")]
    like_count_snake: Option<f64>,
    #[serde(deserialize_with = "de::num")]
    likes: Option<f64>,
}

impl VideoStats {
    pub fn views(&self) -> f64 {
        self.view_count
            .or(self.views)
            .or(self.view_count_snake)
            .unwrap_or(0.0)
    }

    pub fn likes(&self) -> f64 {
        self.like_count
            .or(self.likes)
            .or(self.like_count_snake)
            .unwrap_or(0.0)
    }
}

/// `"id": "abc"` or `"id": {"videoId": "abc"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum VideoId {
    Plain(String),
    Nested {
        #[serde(rename = "videoId", alias = "video_id")]
        video_id: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Video {
    #[serde(deserialize_with = "de::object")]
    snippet: Option<VideoSnippet>,
    #[serde(deserialize_with = "de::object")]
    statistics: Option<VideoStats>,
    #[serde(deserialize_with = "de::lenient")]
    id: Option<VideoId>,
    #[serde(alias = "videoId", deserialize_with = "de::text")]
    video_id: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(alias = "textDisplay", deserialize_with = "de::text")]
    text: Option<String>,
    #[serde(alias = "authorDisplayName", deserialize_with = "de::text")]
    author: Option<String>,
    #[serde(flatten)]
    top: VideoSnippet,
    #[serde(flatten)]
    top_stats: VideoStats,
    #[serde(flatten)]
    tone: Tone,
}

impl Video {
    pub fn meta(&self) -> &VideoSnippet {
        self.snippet.as_ref().unwrap_or(&self.top)
    }

    pub fn stats(&self) -> &VideoStats {
        self.statistics.as_ref().unwrap_or(&self.top_stats)
    }

    pub fn url(&self) -> Option<String> {
        if let Some(u) = self.url.clone().or_else(|| self.link.clone()) {
            return Some(u);
        }
        let id = self.video_id.clone().or_else(|| match &self.id {
            Some(VideoId::Plain(s)) => Some(s.clone()),
            Some(VideoId::Nested { video_id }) => Some(video_id.clone()),
            None => None,
        })?;
        Some(format!("https://www.youtube.com/watch?v={id}"))
    }
}

impl AsMention for Video {
    fn body(&self) -> Option<String> {
        self.text
            .clone()
            .or_else(|| self.meta().description.clone())
            .or_else(|| self.meta().title.clone())
    }
    fn heading(&self) -> Option<String> {
        self.meta().title.clone().or_else(|| self.author.clone())
    }
    fn link(&self) -> Option<String> {
        self.url()
    }
    fn tone(&self) -> &Tone {
        &self.tone
    }
}

// ------------------------------------------------------------
// News
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NewsPayload {
    #[serde(deserialize_with = "de::list")]
    articles: Vec<Article>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<Article>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<Article>,
}

impl Payload for NewsPayload {
    const KEYS: &'static [&'static str] = &["articles", "results", "items"];
}

impl NewsPayload {
    pub fn entries(self) -> Vec<Article> {
        first_non_empty([self.articles, self.results, self.items])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Article {
    #[serde(deserialize_with = "de::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    description: Option<String>,
    #[serde(deserialize_with = "de::text")]
    snippet: Option<String>,
    #[serde(deserialize_with = "de::text")]
    summary: Option<String>,
    #[serde(deserialize_with = "de::text")]
    content: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(deserialize_with = "de::text")]
    source: Option<String>,
    #[serde(deserialize_with = "de::text")]
    domain: Option<String>,
    #[serde(deserialize_with = "de::text")]
    sourcecountry: Option<String>,
    #[serde(alias = "publishedAt", deserialize_with = "de::time")]
    published_at: Option<DateTime<Utc>>,
    /// GDELT's compact `20240101T120000Z`.
    #[serde(deserialize_with = "de::time")]
    seendate: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    published: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    tone: Tone,
}

impl Article {
    pub fn snippet(&self) -> Option<String> {
        self.description
            .clone()
            .or_else(|| self.snippet.clone())
            .or_else(|| self.summary.clone())
            .or_else(|| self.content.clone())
    }

    pub fn url(&self) -> Option<String> {
        self.url.clone().or_else(|| self.link.clone())
    }

    pub fn outlet(&self) -> Option<String> {
        self.source
            .clone()
            .or_else(|| self.domain.clone())
            .or_else(|| self.sourcecountry.clone())
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .or(self.seendate)
            .or(self.published)
            .or(self.date)
    }
}

impl AsMention for Article {
    fn body(&self) -> Option<String> {
        self.description
            .clone()
            .or_else(|| self.snippet.clone())
            .or_else(|| self.title.clone())
    }
    fn heading(&self) -> Option<String> {
        self.title.clone()
    }
    fn link(&self) -> Option<String> {
        self.url()
    }
    fn tone(&self) -> &Tone {
        &self.tone
    }
}

// ------------------------------------------------------------
// Web search (SERP)
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SearchInformation {
    #[serde(alias = "totalResults", deserialize_with = "de::num")]
    total_results: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SerpPayload {
    #[serde(deserialize_with = "de::list")]
    organic_results: Vec<SerpResult>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<SerpResult>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<SerpResult>,
    #[serde(deserialize_with = "de::object")]
    search_information: Option<SearchInformation>,
    #[serde(alias = "totalResults", deserialize_with = "de::num")]
    total_results: Option<f64>,
}

impl Payload for SerpPayload {
    const KEYS: &'static [&'static str] = &["organic_results", "results", "items"];
}

impl SerpPayload {
    pub fn indexed(&self) -> f64 {
        self.search_information
            .as_ref()
            .and_then(|s| s.total_results)
            .or(self.total_results)
            .unwrap_or(0.0)
    }

    pub fn entries(self) -> Vec<SerpResult> {
        first_non_empty([self.organic_results, self.results, self.items])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SerpResult {
    #[serde(deserialize_with = "de::text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    snippet: Option<String>,
    #[serde(deserialize_with = "de::text")]
    description: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    source: Option<String>,
    #[serde(deserialize_with = "de::text")]
    displayed_link: Option<String>,
    #[serde(deserialize_with = "de::text")]
    domain: Option<String>,
    #[serde(deserialize_with = "de::time")]
    date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    published: Option<DateTime<Utc>>,
    #[serde(flatten)]
    tone: Tone,
}

impl SerpResult {
    pub fn snippet(&self) -> Option<String> {
        self.snippet.clone().or_else(|| self.description.clone())
    }

    pub fn url(&self) -> Option<String> {
        self.link.clone().or_else(|| self.url.clone())
    }

    pub fn site(&self) -> Option<String> {
        self.source
            .clone()
            .or_else(|| self.displayed_link.clone())
            .or_else(|| self.domain.clone())
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.date.or(self.published)
    }
}

impl AsMention for SerpResult {
    fn body(&self) -> Option<String> {
        self.snippet().or_else(|| self.title.clone())
    }
    fn heading(&self) -> Option<String> {
        self.title.clone()
    }
    fn link(&self) -> Option<String> {
        self.url()
    }
    fn tone(&self) -> &Tone {
        &self.tone
    }
}

// ------------------------------------------------------------
// Generic tiles (already roughly in the common shape)
// ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum MetricValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MetricShape {
    #[serde(deserialize_with = "de::text")]
    name: Option<String>,
    #[serde(deserialize_with = "de::text")]
    label: Option<String>,
    #[serde(deserialize_with = "de::text")]
    title: Option<String>,
    #[serde(deserialize_with = "de::lenient")]
    pub value: Option<MetricValue>,
    #[serde(deserialize_with = "de::text")]
    pub unit: Option<String>,
    #[serde(deserialize_with = "de::text")]
    explanation: Option<String>,
    #[serde(deserialize_with = "de::text")]
    description: Option<String>,
    #[serde(deserialize_with = "de::num")]
    pub confidence: Option<f64>,
}

impl MetricShape {
    pub fn name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.label.clone())
            .or_else(|| self.title.clone())
    }

    pub fn explanation(&self) -> Option<String> {
        self.explanation.clone().or_else(|| self.description.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GenericItem {
    #[serde(deserialize_with = "de::text")]
    title: Option<String>,
    #[serde(deserialize_with = "de::text")]
    name: Option<String>,
    #[serde(deserialize_with = "de::text")]
    snippet: Option<String>,
    #[serde(deserialize_with = "de::text")]
    description: Option<String>,
    #[serde(deserialize_with = "de::text")]
    text: Option<String>,
    #[serde(deserialize_with = "de::text")]
    url: Option<String>,
    #[serde(deserialize_with = "de::text")]
    link: Option<String>,
    #[serde(deserialize_with = "de::text")]
    pub source: Option<String>,
    #[serde(deserialize_with = "de::time")]
    published: Option<DateTime<Utc>>,
    #[serde(alias = "publishedAt", deserialize_with = "de::time")]
    published_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de::time")]
    date: Option<DateTime<Utc>>,
}

impl GenericItem {
    pub fn title(&self) -> Option<String> {
        self.title.clone().or_else(|| self.name.clone())
    }

    pub fn snippet(&self) -> Option<String> {
        self.snippet
            .clone()
            .or_else(|| self.description.clone())
            .or_else(|| self.text.clone())
    }

    pub fn url(&self) -> Option<String> {
        self.url.clone().or_else(|| self.link.clone())
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.published_at).or(self.date)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GenericPayload {
    #[serde(deserialize_with = "de::list")]
    pub metrics: Vec<MetricShape>,
    #[serde(deserialize_with = "de::list")]
    items: Vec<GenericItem>,
    #[serde(deserialize_with = "de::list")]
    results: Vec<GenericItem>,
}

impl Payload for GenericPayload {
    const KEYS: &'static [&'static str] = &["metrics", "items", "insights"];
}

impl GenericPayload {
    pub fn entries(&self) -> Vec<GenericItem> {
        first_non_empty([self.items.clone(), self.results.clone()])
    }
}
