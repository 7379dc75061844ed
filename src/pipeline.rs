// src/pipeline.rs
//! Aggregation pipeline: read-through cache for one city and one day.
//!
//! The four fetched types run concurrently and independently. A hit is reused
//! untouched; a miss goes upstream, through the normalizer, and is written back
//! with a replacing put. The brief is derived from news (cached or fresh), never
//! fetched. Only a run where all four fetched types fail is an error.
//!
//! [`Aggregator::refresh`] is the same run with chosen keys treated as misses,
//! so cached-but-empty sections can be fetched again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::Serialize;

use crate::error::{CollectError, PipelineError, StoreError, TypeFailure, UpstreamError};
use crate::gateway::{SearchEngine, SearchRequest, Upstream};
use crate::normalize::events::{merge_events, needs_secondary};
use crate::normalize::raw::{decode_events, decode_secondary_events};
use crate::normalize::{summarize_weather, Normalizer};
use crate::store::CacheStore;
use crate::types::{normalize_city_name, CacheEntry, DataType, NewsItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeOutcome {
    /// Served from cache, no upstream call.
    Reused,
    /// Fetched, normalized and written.
    Fetched,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub city: String,
    pub date: NaiveDate,
    pub outcomes: BTreeMap<DataType, TypeOutcome>,
    pub failures: Vec<TypeFailure>,
}

impl CollectReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn fetched(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| **o == TypeOutcome::Fetched)
            .count()
    }
}

pub struct Aggregator {
    upstream: Arc<dyn Upstream>,
    normalizer: Arc<Normalizer>,
    cache: Arc<dyn CacheStore>,
    max_age: Option<Duration>,
    units: String,
}

impl Aggregator {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        normalizer: Arc<Normalizer>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            upstream,
            normalizer,
            cache,
            max_age: Some(Duration::hours(600)),
            units: "imperial".to_string(),
        }
    }

    /// Entries older than `hours` count as misses; `0` disables the check.
    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age = (hours > 0).then(|| Duration::hours(hours));
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Idempotent: a second call for the same (city, date) makes no upstream calls.
    pub async fn collect_and_cache(
        &self,
        city: &str,
        date: NaiveDate,
    ) -> Result<CollectReport, PipelineError> {
        self.run(city, date, &[]).await
    }

    /// Collect with `kinds` fetched even when cached; other types are reused as
    /// usual. The brief is derived from news, so refreshing it refetches news too.
    pub async fn refresh(
        &self,
        city: &str,
        date: NaiveDate,
        kinds: &[DataType],
    ) -> Result<CollectReport, PipelineError> {
        let mut force = kinds.to_vec();
        if force.contains(&DataType::Brief) && !force.contains(&DataType::News) {
            force.push(DataType::News);
        }
        self.run(city, date, &force).await
    }

    async fn run(
        &self,
        city: &str,
        date: NaiveDate,
        force: &[DataType],
    ) -> Result<CollectReport, PipelineError> {
        let city = normalize_city_name(city);
        if city.is_empty() {
            return Err(PipelineError::EmptyCity);
        }
        tracing::info!(target: "pipeline", city = %city, %date, forced = ?force, "collect start");
        let started = Instant::now();

        let (weather, news, events, sports) = tokio::join!(
            self.ensure_weather(&city, date, force),
            self.ensure_news(&city, date, force),
            self.ensure_events(&city, date, force),
            self.ensure_sports(&city, date, force),
        );

        let mut report = CollectReport {
            city: city.clone(),
            date,
            outcomes: BTreeMap::new(),
            failures: Vec::new(),
        };

        let news_items = match news {
            Ok((outcome, items)) => {
                report.outcomes.insert(DataType::News, outcome);
                Some(items)
            }
            Err(e) => {
                record_failure(&mut report, DataType::News, e);
                None
            }
        };
        for (kind, res) in [
            (DataType::Weather, weather),
            (DataType::Events, events),
            (DataType::Sports, sports),
        ] {
            match res {
                Ok(outcome) => {
                    report.outcomes.insert(kind, outcome);
                }
                Err(e) => record_failure(&mut report, kind, e),
            }
        }

        if report.failures.len() == DataType::FETCHED.len() {
            tracing::error!(target: "pipeline", city = %city, %date, "every data type failed");
            return Err(PipelineError::Total {
                city,
                failures: report.failures,
            });
        }

        match self.ensure_brief(&city, date, news_items.as_deref(), force).await {
            Ok(outcome) => {
                report.outcomes.insert(DataType::Brief, outcome);
            }
            Err(e) => record_failure(&mut report, DataType::Brief, e),
        }

        histogram!("pipeline_collect_ms").record(started.elapsed().as_millis() as f64);
        tracing::info!(
            target: "pipeline",
            city = %city,
            %date,
            fetched = report.fetched(),
            failed = report.failures.len(),
            "collect done"
        );
        Ok(report)
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match self.max_age {
            Some(max) => Utc::now().signed_duration_since(entry.created_at) <= max,
            None => true,
        }
    }

    /// Fresh cache entry for the key, if any. A failing read degrades to a miss,
    /// and a forced kind is always a miss.
    async fn cached(
        &self,
        city: &str,
        date: NaiveDate,
        kind: DataType,
        force: &[DataType],
    ) -> Option<CacheEntry> {
        if force.contains(&kind) {
            counter!("cache_misses_total", "type" => kind.as_str()).increment(1);
            return None;
        }
        let hit = match self.cache.get(city, date, kind).await {
            Ok(Some(e)) if self.is_fresh(&e) => Some(e),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(target: "pipeline", city, kind = %kind, error = %e, "cache read failed, treating as miss");
                None
            }
        };
        if hit.is_some() {
            counter!("cache_hits_total", "type" => kind.as_str()).increment(1);
        } else {
            counter!("cache_misses_total", "type" => kind.as_str()).increment(1);
        }
        hit
    }

    async fn store<T: Serialize>(
        &self,
        city: &str,
        date: NaiveDate,
        kind: DataType,
        value: &T,
    ) -> Result<(), CollectError> {
        let payload = serde_json::to_value(value).map_err(StoreError::from)?;
        self.cache
            .put(CacheEntry::new(city, date, kind, payload))
            .await?;
        tracing::debug!(target: "pipeline", city, kind = %kind, "cache written");
        Ok(())
    }

    async fn ensure_weather(
        &self,
        city: &str,
        date: NaiveDate,
        force: &[DataType],
    ) -> Result<TypeOutcome, CollectError> {
        if self.cached(city, date, DataType::Weather, force).await.is_some() {
            return Ok(TypeOutcome::Reused);
        }
        let raw = self.upstream.weather(city).await?;
        let snapshot = summarize_weather(&raw, date, &self.units)?;
        self.store(city, date, DataType::Weather, &snapshot).await?;
        Ok(TypeOutcome::Fetched)
    }

    async fn ensure_news(
        &self,
        city: &str,
        date: NaiveDate,
        force: &[DataType],
    ) -> Result<(TypeOutcome, Vec<NewsItem>), CollectError> {
        if let Some(entry) = self.cached(city, date, DataType::News, force).await {
            match entry.decode::<Vec<NewsItem>>() {
                Ok(items) => return Ok((TypeOutcome::Reused, items)),
                Err(e) => {
                    tracing::warn!(target: "pipeline", city, error = %e, "cached news unreadable, refetching")
                }
            }
        }
        let cap = self.normalizer.config().news_input_cap as u32;
        let req = SearchRequest::new(SearchEngine::GoogleNews, city).num(cap);
        let payload = self.upstream.search(&req).await?;
        let items = self.normalizer.news(city, &payload).await?;
        self.store(city, date, DataType::News, &items).await?;
        Ok((TypeOutcome::Fetched, items))
    }

    async fn ensure_events(
        &self,
        city: &str,
        date: NaiveDate,
        force: &[DataType],
    ) -> Result<TypeOutcome, CollectError> {
        if self.cached(city, date, DataType::Events, force).await.is_some() {
            return Ok(TypeOutcome::Reused);
        }

        let primary = SearchRequest::new(SearchEngine::GoogleEvents, format!("{city} events concerts shows"))
            .location(city);
        let payload = match self.upstream.search(&primary).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "pipeline", city, error = %e, "events engine failed, trying web search");
                let fallback =
                    SearchRequest::new(SearchEngine::Google, format!("{city} upcoming events concerts shows"))
                        .location(city);
                self.upstream.search(&fallback).await?
            }
        };
        let mut raw = decode_events(&payload)?;

        if needs_secondary(&raw) {
            match self
                .upstream
                .secondary_events(city)
                .await
                .and_then(|v| decode_secondary_events(&v))
            {
                Ok(extra) => raw = merge_events(raw, extra),
                Err(UpstreamError::Configuration(_)) => {}
                Err(e) => {
                    tracing::warn!(target: "pipeline", city, error = %e, "secondary events unavailable")
                }
            }
        }

        let items = self.normalizer.events(raw, date).await;
        self.store(city, date, DataType::Events, &items).await?;
        Ok(TypeOutcome::Fetched)
    }

    async fn ensure_sports(
        &self,
        city: &str,
        date: NaiveDate,
        force: &[DataType],
    ) -> Result<TypeOutcome, CollectError> {
        if self.cached(city, date, DataType::Sports, force).await.is_some() {
            return Ok(TypeOutcome::Reused);
        }
        let req = SearchRequest::new(
            SearchEngine::Google,
            format!("{city} sports news events matches schedule"),
        )
        .num(25);
        let payload = self.upstream.search(&req).await?;
        let digest = self.normalizer.sports(city, &payload).await?;
        self.store(city, date, DataType::Sports, &digest).await?;
        Ok(TypeOutcome::Fetched)
    }

    async fn ensure_brief(
        &self,
        city: &str,
        date: NaiveDate,
        news: Option<&[NewsItem]>,
        force: &[DataType],
    ) -> Result<TypeOutcome, CollectError> {
        if self.cached(city, date, DataType::Brief, force).await.is_some() {
            return Ok(TypeOutcome::Reused);
        }
        let news = news.ok_or(CollectError::NoSource)?;
        let brief = self.normalizer.brief(news);
        self.store(city, date, DataType::Brief, &brief).await?;
        Ok(TypeOutcome::Fetched)
    }
}

fn record_failure(report: &mut CollectReport, kind: DataType, err: CollectError) {
    tracing::warn!(target: "pipeline", city = %report.city, kind = %kind, error = %err, "data type failed");
    report.failures.push(TypeFailure {
        kind,
        message: err.to_string(),
    });
}
