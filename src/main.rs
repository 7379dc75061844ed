//! City digest service: binary entrypoint.
//! Boots the Axum HTTP server, wires the stores, pipeline and jobs, and starts
//! the daily schedules.

use city_digest::config::AppConfig;
use city_digest::metrics::Metrics;
use city_digest::{api, Services};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    city_digest::init_tracing();

    // Unreadable config is fatal; missing API keys are not.
    let config = AppConfig::load_default()?;
    let services = Services::from_env(config)?;

    let mut router = api::router(services.api_state());
    match Metrics::init(services.config.pipeline.cache_max_age_hours) {
        Ok(metrics) => router = router.merge(metrics.router()),
        Err(e) => tracing::warn!(error = %e, "metrics endpoint disabled"),
    }

    let jobs = services.spawn_schedules()?;
    tracing::info!(jobs = jobs.len(), "city digest service ready");

    Ok(router.into())
}
