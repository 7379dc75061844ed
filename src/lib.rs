// src/lib.rs
// Public library surface for the server, the operator CLI and integration tests.

pub mod api;
pub mod app;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod gateway;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::app::{Parts, Services};
pub use crate::pipeline::{Aggregator, CollectReport};
pub use crate::types::{CacheEntry, DataType};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("city_digest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
