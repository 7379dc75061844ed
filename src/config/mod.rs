// src/config/mod.rs
//! Runtime configuration. One TOML (or JSON) file, every key optional.
//! Secrets never live here; they come from the environment (see `.env`).

pub mod ai;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use ai::ClassifierConfig;

pub const ENV_CONFIG_PATH: &str = "CITY_DIGEST_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub classifier: ClassifierConfig,
    pub normalizer: NormalizerConfig,
    pub pipeline: PipelineConfig,
    pub dispatch: DispatchConfig,
    pub schedule: ScheduleConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause before every search call (upstream rate limit).
    pub search_delay_ms: u64,
    pub search_base_url: String,
    pub weather_base_url: String,
    pub events_base_url: String,
    /// "imperial" | "metric"
    pub units: String,
    pub language: String,
    pub country: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 4,
            max_retries: 2,
            retry_delay_ms: 1000,
            search_delay_ms: 1500,
            search_base_url: "https://serpapi.com/search".into(),
            weather_base_url: "https://api.openweathermap.org/data/2.5".into(),
            events_base_url: "https://www.eventbriteapi.com/v3".into(),
            units: "imperial".into(),
            language: "en".into(),
            country: "us".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub news_input_cap: usize,
    pub news_limit: usize,
    pub events_input_cap: usize,
    pub events_limit: usize,
    pub sports_news_limit: usize,
    pub matches_input_cap: usize,
    pub brief_size: usize,
    pub digest_match_limit: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            news_input_cap: 30,
            news_limit: 20,
            events_input_cap: 30,
            events_limit: 20,
            sports_news_limit: 10,
            matches_input_cap: 15,
            brief_size: 5,
            digest_match_limit: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Entries older than this count as misses. `0` disables the age check.
    pub cache_max_age_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_max_age_hours: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Mail,
    Broadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    /// Missing categories tolerated before a city is skipped.
    pub max_missing_categories: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// Broadcast is scheduled this far ahead of dispatch time.
    pub broadcast_lead_minutes: i64,
    pub broadcast_delay_ms: u64,
    pub subject_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Mail,
            max_missing_categories: 1,
            batch_size: 10,
            batch_delay_ms: 500,
            broadcast_lead_minutes: 38 * 60 + 50,
            broadcast_delay_ms: 2000,
            subject_prefix: "Your daily digest".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// "HH:MM", UTC.
    pub collection_at: String,
    pub dispatch_at: String,
    /// Collection prepares content for today + offset days.
    pub collection_day_offset: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_at: "16:00".into(),
            dispatch_at: "05:00".into(),
            collection_day_offset: 1,
        }
    }
}

impl ScheduleConfig {
    pub fn collection_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.collection_at)
    }

    pub fn dispatch_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.dispatch_at)
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("invalid schedule time '{s}', expected HH:MM"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Seed file for the in-memory city registry.
    pub cities_path: String,
    /// Replace cache rows with a single upsert instead of delete-then-insert.
    pub upsert: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            cities_path: "config/cities.toml".into(),
            upsert: false,
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg: AppConfig = if ext == "json" {
            serde_json::from_str(&content).context("parsing JSON config")?
        } else {
            toml::from_str(&content).context("parsing TOML config")?
        };
        cfg.finish()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $CITY_DIGEST_CONFIG
    /// 2) config/city_digest.toml
    /// 3) config/city_digest.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/city_digest.toml", "config/city_digest.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        let mut cfg = AppConfig::default();
        cfg.finish()?;
        Ok(cfg)
    }

    fn finish(&mut self) -> Result<()> {
        self.classifier.resolve();
        if self.dispatch.batch_size == 0 {
            self.dispatch.batch_size = 1;
        }
        // Fail early on unusable schedule strings.
        self.schedule.collection_time()?;
        self.schedule.dispatch_time()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
            [dispatch]
            max_missing_categories = 2

            [schedule]
            collection_at = "17:30"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.dispatch.max_missing_categories, 2);
        assert_eq!(cfg.dispatch.batch_size, 10);
        assert_eq!(cfg.gateway.max_retries, 2);
        assert_eq!(
            cfg.schedule.collection_time().unwrap(),
            NaiveTime::from_hms_opt(17, 30, 0).unwrap()
        );
    }

    #[test]
    fn bad_schedule_time_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.schedule.dispatch_at = "25:99".into();
        assert!(cfg.finish().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        // Nothing on disk: defaults.
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.normalizer.news_limit, 20);

        // Env wins.
        let p = tmp.path().join("custom.json");
        fs::write(&p, r#"{ "normalizer": { "news_limit": 7 } }"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.normalizer.news_limit, 7);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(AppConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
