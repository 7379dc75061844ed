// tests/common/mod.rs
//
// Shared fixtures for integration tests: a scripted upstream, a recording
// mailer and a fully wired service graph over the in-memory store.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use city_digest::config::AppConfig;
use city_digest::dispatch::{MailSender, OutgoingMail};
use city_digest::error::{DeliveryError, UpstreamError};
use city_digest::gateway::{RawWeather, SearchEngine, SearchRequest, Upstream};
use city_digest::notify::NotifierMux;
use city_digest::store::{MemoryStore, Stores};
use city_digest::{DataType, Parts, Services};

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// UTC unix seconds for a wall-clock UTC time.
pub fn ts(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .unwrap()
        .and_utc()
        .timestamp()
}

pub fn news_payload() -> Value {
    json!({ "news_results": [
        { "title": "Riverside park reopens with new trails", "link": "https://news.example.com/park",
          "snippet": "Families return to the renovated park.", "source": { "name": "Gazette" }, "date": "2 hours ago" },
        { "title": "Library launches free coding classes", "link": "https://news.example.com/library",
          "snippet": "Sign-ups open Monday." },
        { "title": "Suspect arrested after downtown robbery", "link": "https://news.example.com/robbery",
          "snippet": "Police said the investigation continues." },
        { "title": "Story without a link", "snippet": "Dropped before classification." }
    ]})
}

pub fn events_payload() -> Value {
    json!({ "events_results": [
        { "title": "Jazz on the Green", "date": { "when": "Tue, Oct 20, 7 PM" },
          "venue": { "name": "Zilker Park" }, "link": "https://events.example.com/jazz",
          "description": "Live music under the stars." },
        { "title": "Downtown Farmers Market", "date": { "when": "Sat, Oct 24, 9 AM" },
          "address": ["Republic Square", "Austin, TX"], "link": "https://events.example.com/market" }
    ]})
}

pub fn sports_payload() -> Value {
    json!({ "organic_results": [
        { "title": "NBA: Spurs vs Lakers tonight", "link": "https://sports.example.com/nba",
          "snippet": "Tip-off at 7." },
        { "title": "Longhorns football prepares for rivalry week", "link": "https://sports.example.com/ut",
          "snippet": "Practice notes from the coach." }
    ]})
}

/// Central time (UTC-5): the local 19th runs from 05:00Z on the 19th to 05:00Z on the 20th.
pub fn weather_payload() -> RawWeather {
    let slice = |at: &str, min: f64, max: f64, desc: &str| {
        json!({
            "dt": ts(at),
            "main": { "temp": (min + max) / 2.0, "temp_min": min, "temp_max": max },
            "weather": [{ "main": "Clouds", "description": desc }],
            "wind": { "speed": 8.4, "deg": 180 }
        })
    };
    RawWeather {
        current: json!({
            "weather": [{ "main": "Clear", "description": "clear sky" }],
            "main": { "temp": 70.0, "temp_min": 66.0, "temp_max": 74.0 },
            "wind": { "speed": 5.0, "deg": 90 },
            "timezone": -18000
        }),
        forecast: json!({
            "city": { "timezone": -18000 },
            "list": [
                slice("2026-10-19 03:00", 40.0, 41.0, "late night chill"),
                slice("2026-10-19 12:00", 61.0, 64.0, "few clouds"),
                slice("2026-10-19 18:00", 70.0, 79.0, "scattered clouds"),
                slice("2026-10-20 03:00", 63.0, 66.0, "broken clouds"),
                slice("2026-10-20 09:00", 95.0, 99.0, "next day heat")
            ]
        }),
    }
}

fn unavailable(upstream: &'static str) -> UpstreamError {
    UpstreamError::Transient {
        upstream,
        attempts: 3,
        message: "scripted outage".into(),
    }
}

/// Scripted upstream with call counters, per-type outages and an optional gate
/// that holds every call until permits are added.
#[derive(Default)]
pub struct FakeUpstream {
    pub weather_calls: AtomicUsize,
    pub news_calls: AtomicUsize,
    pub events_calls: AtomicUsize,
    pub sports_calls: AtomicUsize,
    pub secondary_calls: AtomicUsize,
    failing: Mutex<HashSet<DataType>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls block until `gate` has permits.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail(&self, kind: DataType) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn fail_all(&self) {
        for k in DataType::FETCHED {
            self.fail(k);
        }
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self, kind: DataType) -> usize {
        let c = match kind {
            DataType::Weather => &self.weather_calls,
            DataType::News => &self.news_calls,
            DataType::Events => &self.events_calls,
            DataType::Sports => &self.sports_calls,
            DataType::Brief => return 0,
        };
        c.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        DataType::FETCHED.iter().map(|k| self.calls(*k)).sum::<usize>()
            + self.secondary_calls.load(Ordering::SeqCst)
    }

    fn is_failing(&self, kind: DataType) -> bool {
        self.failing.lock().unwrap().contains(&kind)
    }

    async fn pass_gate(&self) {
        if let Some(g) = &self.gate {
            let _permit = g.acquire().await.unwrap();
        }
    }

    async fn answer(&self, kind: DataType, payload: Value) -> Result<Value, UpstreamError> {
        let counter = match kind {
            DataType::News => &self.news_calls,
            DataType::Events => &self.events_calls,
            _ => &self.sports_calls,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if self.is_failing(kind) {
            return Err(unavailable("search"));
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl Upstream for FakeUpstream {
    async fn search(&self, req: &SearchRequest) -> Result<Value, UpstreamError> {
        match req.engine {
            SearchEngine::GoogleNews => self.answer(DataType::News, news_payload()).await,
            SearchEngine::GoogleEvents => self.answer(DataType::Events, events_payload()).await,
            SearchEngine::Google if req.query.contains("sports") => {
                self.answer(DataType::Sports, sports_payload()).await
            }
            SearchEngine::Google => self.answer(DataType::Events, events_payload()).await,
        }
    }

    async fn weather(&self, _city: &str) -> Result<RawWeather, UpstreamError> {
        self.weather_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if self.is_failing(DataType::Weather) {
            return Err(unavailable("weather"));
        }
        Ok(weather_payload())
    }

    async fn secondary_events(&self, _city: &str) -> Result<Value, UpstreamError> {
        self.secondary_calls.fetch_add(1, Ordering::SeqCst);
        Err(UpstreamError::Configuration("eventbrite"))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Records every recipient; addresses in `reject` fail.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
    reject: HashSet<String>,
}

impl FakeMailer {
    pub fn rejecting(addrs: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: addrs.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
    }
}

#[async_trait::async_trait]
impl MailSender for FakeMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        if self.reject.contains(&mail.to) {
            return Err(DeliveryError::Rejected(550));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Rules classifier, no pacing, no schedules.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.classifier.enabled = false;
    cfg.dispatch.batch_delay_ms = 0;
    cfg.dispatch.broadcast_delay_ms = 0;
    cfg.schedule.enabled = false;
    cfg
}

pub struct Harness {
    pub services: Services,
    pub upstream: Arc<FakeUpstream>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<FakeMailer>,
}

pub fn harness_with(config: AppConfig, upstream: FakeUpstream, mailer: FakeMailer) -> Harness {
    let upstream = Arc::new(upstream);
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(mailer);
    let services = Services::assemble(
        config,
        Parts {
            stores: Stores::from_one(store.clone()),
            upstream: upstream.clone(),
            notifier: NotifierMux::new(),
            mailer: Some(mailer.clone()),
            broadcaster: None,
        },
    )
    .expect("assemble services");
    Harness {
        services,
        upstream,
        store,
        mailer,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), FakeUpstream::new(), FakeMailer::default())
}
