// src/gateway/mod.rs
//! Upstream gateway: one place that knows how to talk to search, weather and
//! secondary event sources. Callers get raw JSON back; shaping happens in `normalize`.

pub mod http;

use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::UpstreamError;

pub use http::{HttpGateway, UpstreamKeys};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    GoogleNews,
    GoogleEvents,
    Google,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::GoogleNews => "google_news",
            SearchEngine::GoogleEvents => "google_events",
            SearchEngine::Google => "google",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub engine: SearchEngine,
    pub query: String,
    pub num: Option<u32>,
    /// Geographic hint, e.g. the city name.
    pub location: Option<String>,
}

impl SearchRequest {
    pub fn new(engine: SearchEngine, query: impl Into<String>) -> Self {
        Self {
            engine,
            query: query.into(),
            num: None,
            location: None,
        }
    }

    pub fn num(mut self, n: u32) -> Self {
        self.num = Some(n);
        self
    }

    pub fn location(mut self, loc: impl Into<String>) -> Self {
        self.location = Some(loc.into());
        self
    }
}

/// Current conditions plus the multi-slice forecast, as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWeather {
    pub current: Value,
    pub forecast: Value,
}

#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn search(&self, req: &SearchRequest) -> Result<Value, UpstreamError>;
    async fn weather(&self, city: &str) -> Result<RawWeather, UpstreamError>;
    /// Fallback event listings from a second provider.
    async fn secondary_events(&self, city: &str) -> Result<Value, UpstreamError>;
    fn name(&self) -> &'static str;
}

/// Keeps consecutive calls at least `spacing` apart, across tasks.
pub struct Throttle {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        if self.spacing.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.spacing;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_calls() {
        let t = Throttle::new(Duration::from_millis(1500));
        let start = Instant::now();
        t.wait().await;
        t.wait().await;
        t.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_spacing_never_sleeps() {
        let t = Throttle::new(Duration::ZERO);
        let start = Instant::now();
        t.wait().await;
        t.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn search_request_builder() {
        let r = SearchRequest::new(SearchEngine::GoogleNews, "Austin")
            .num(30)
            .location("Austin");
        assert_eq!(r.engine.as_str(), "google_news");
        assert_eq!(r.num, Some(30));
        assert_eq!(r.location.as_deref(), Some("Austin"));
    }
}
