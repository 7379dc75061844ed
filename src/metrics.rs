use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time registration so every series shows up on /metrics with help text.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "Cache lookups served from the store, by type.");
        describe_counter!("cache_misses_total", "Cache lookups that went upstream, by type.");
        describe_counter!("upstream_requests_total", "Upstream HTTP attempts, by upstream.");
        describe_counter!(
            "upstream_retries_total",
            "Upstream retries after a timeout or connection failure."
        );
        describe_counter!(
            "classifier_fallbacks_total",
            "Classifier calls answered by the fallback, by operation."
        );
        describe_counter!("fleet_cities_failed_total", "Cities whose collection failed entirely.");
        describe_counter!("dispatch_emails_sent_total", "Newsletter emails delivered.");
        describe_counter!(
            "dispatch_emails_failed_total",
            "Newsletter emails not delivered, including skipped cities."
        );
        describe_counter!("dispatch_repairs_total", "On-demand collections triggered by dispatch.");
        describe_counter!("scheduler_ticks_total", "Scheduled job firings, by job.");
        describe_histogram!("pipeline_collect_ms", "Per-city collection time in milliseconds.");
        describe_gauge!("fleet_last_run_ts", "Unix ts when the fleet collection last finished.");
        describe_gauge!("cache_max_age_hours", "Configured cache entry max age.");
    });
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if one is already installed.
    pub fn init(cache_max_age_hours: i64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("cache_max_age_hours").set(cache_max_age_hours as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
