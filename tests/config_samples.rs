// tests/config_samples.rs
//
// The shipped config and city seed parse and agree with the built-in defaults.

use std::path::PathBuf;

use city_digest::config::{AppConfig, DispatchMode, StoreBackend};
use city_digest::store::seed::load_cities_from;

fn repo_file(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
fn shipped_config_matches_defaults() {
    let cfg = AppConfig::load_from(&repo_file("config/city_digest.toml")).expect("config parses");
    let def = AppConfig::default();

    assert_eq!(cfg.dispatch.mode, DispatchMode::Mail);
    assert_eq!(cfg.dispatch.max_missing_categories, def.dispatch.max_missing_categories);
    assert_eq!(cfg.dispatch.broadcast_lead_minutes, def.dispatch.broadcast_lead_minutes);
    assert_eq!(cfg.pipeline.cache_max_age_hours, def.pipeline.cache_max_age_hours);
    assert_eq!(cfg.normalizer.news_limit, def.normalizer.news_limit);
    assert_eq!(cfg.normalizer.events_input_cap, def.normalizer.events_input_cap);
    assert_eq!(cfg.store.backend, StoreBackend::Memory);
    assert_eq!(cfg.schedule.collection_day_offset, 1);
    assert_eq!(cfg.classifier.provider, "openai");
}

#[test]
fn shipped_city_seed_loads() {
    let cities = load_cities_from(&repo_file("config/cities.toml")).expect("seed parses");
    assert_eq!(cities.len(), 4);
    assert_eq!(cities[0].slug, "austin");
    assert_eq!(cities[0].publication_id.as_deref(), Some("austin"));
    assert!(cities.iter().any(|c| c.display_name == "Portland" && !c.is_active));
}
