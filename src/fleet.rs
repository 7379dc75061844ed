// src/fleet.rs
//! Fleet collector: one guarded daily run over every target city.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::PipelineError;
use crate::notify::{AdminEvent, JobKind, NotifierMux};
use crate::pipeline::{Aggregator, CollectReport};
use crate::scheduler::{JobOutcome, SingleFlight};
use crate::store::{CityRegistry, SubscriberRegistry};
use crate::types::normalize_city_name;

#[derive(Debug, Clone, Serialize)]
pub struct CityResult {
    pub city: String,
    pub ok: bool,
    /// Types that failed while the city as a whole succeeded.
    pub partial: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSummary {
    pub date: Option<NaiveDate>,
    pub cities: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub results: Vec<CityResult>,
    pub duration_ms: u64,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct FleetCollector {
    aggregator: Arc<Aggregator>,
    cities: Arc<dyn CityRegistry>,
    subscribers: Arc<dyn SubscriberRegistry>,
    notifier: Arc<NotifierMux>,
    flight: SingleFlight,
    last: Mutex<Option<FleetSummary>>,
}

impl FleetCollector {
    pub fn new(
        aggregator: Arc<Aggregator>,
        cities: Arc<dyn CityRegistry>,
        subscribers: Arc<dyn SubscriberRegistry>,
        notifier: Arc<NotifierMux>,
    ) -> Self {
        Self {
            aggregator,
            cities,
            subscribers,
            notifier,
            flight: SingleFlight::new(),
            last: Mutex::new(None),
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn last_summary(&self) -> Option<FleetSummary> {
        self.last.lock().ok().and_then(|g| g.clone())
    }

    /// Active registry cities plus every city somebody subscribed to, deduplicated.
    /// A failing source is logged and contributes nothing.
    pub async fn target_cities(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            let n = normalize_city_name(name);
            if !n.is_empty() && !out.contains(&n) {
                out.push(n);
            }
        };
        match self.cities.list_active().await {
            Ok(cities) => cities.iter().for_each(|c| push(&c.display_name)),
            Err(e) => tracing::warn!(target: "fleet", error = %e, "city registry unavailable"),
        }
        match self.subscribers.cities().await {
            Ok(cities) => cities.iter().for_each(|c| push(c.as_str())),
            Err(e) => tracing::warn!(target: "fleet", error = %e, "subscriber registry unavailable"),
        }
        out
    }

    /// Collect every target city for `date`. A second call while a run is in
    /// flight returns `AlreadyRunning` and does nothing else.
    pub async fn run_daily_collection(&self, date: NaiveDate) -> JobOutcome<FleetSummary> {
        let Some(_guard) = self.flight.try_start() else {
            tracing::warn!(target: "fleet", %date, "collection already running, ignoring trigger");
            return JobOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        let cities = self.target_cities().await;
        tracing::info!(target: "fleet", %date, cities = cities.len(), "fleet collection start");
        self.notifier
            .notify(
                &AdminEvent::started(JobKind::DataCollection)
                    .detail("Date", date)
                    .detail("Cities", cities.len()),
            )
            .await;

        let mut set = JoinSet::new();
        for city in cities.iter().cloned() {
            let agg = self.aggregator.clone();
            set.spawn(async move {
                let res = agg.collect_and_cache(&city, date).await;
                (city, res)
            });
        }

        let mut summary = FleetSummary {
            date: Some(date),
            cities: cities.len(),
            ..FleetSummary::default()
        };
        while let Some(joined) = set.join_next().await {
            let result = match joined {
                Ok((city, res)) => city_result(city, res),
                Err(e) => CityResult {
                    city: "unknown".into(),
                    ok: false,
                    partial: Vec::new(),
                    error: Some(format!("collection task aborted: {e}")),
                },
            };
            if result.ok {
                summary.successful += 1;
            } else {
                summary.failed += 1;
                counter!("fleet_cities_failed_total").increment(1);
                summary.errors.push(format!(
                    "{}: {}",
                    result.city,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            summary.results.push(result);
        }
        summary.results.sort_by(|a, b| a.city.cmp(&b.city));
        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary.finished_at = Some(Utc::now());
        gauge!("fleet_last_run_ts").set(Utc::now().timestamp() as f64);

        tracing::info!(
            target: "fleet",
            %date,
            successful = summary.successful,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "fleet collection done"
        );
        self.notifier
            .notify(
                &AdminEvent::completed(JobKind::DataCollection)
                    .detail("Date", date)
                    .detail("Successful", summary.successful)
                    .detail("Failed", summary.failed)
                    .detail("Duration", format!("{:.1}s", summary.duration_ms as f64 / 1000.0))
                    .errors(&summary.errors),
            )
            .await;

        if let Ok(mut last) = self.last.lock() {
            *last = Some(summary.clone());
        }
        JobOutcome::Completed(summary)
    }
}

fn city_result(city: String, res: Result<CollectReport, PipelineError>) -> CityResult {
    match res {
        Ok(report) => CityResult {
            city: report.city.clone(),
            ok: true,
            partial: report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.kind, f.message))
                .collect(),
            error: None,
        },
        Err(e) => {
            tracing::error!(target: "fleet", city = %city, error = %e, "city collection failed");
            CityResult {
                city,
                ok: false,
                partial: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
