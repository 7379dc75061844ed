// src/store/seed.rs
//! City registry seed for the in-memory backend. TOML or JSON.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{normalize_city_name, City};

const ENV_PATH: &str = "CITY_DIGEST_CITIES";

#[derive(serde::Deserialize)]
struct SeedCity {
    #[serde(default)]
    slug: Option<String>,
    #[serde(alias = "name")]
    display_name: String,
    #[serde(default = "yes")]
    is_active: bool,
    #[serde(default)]
    publication_id: Option<String>,
    #[serde(default)]
    state_name: Option<String>,
}

fn yes() -> bool {
    true
}

/// Load cities from an explicit path.
pub fn load_cities_from(path: &Path) -> Result<Vec<City>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading cities from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_cities(&content, ext.as_str())
}

/// Load cities using env var + fallbacks:
/// 1) $CITY_DIGEST_CITIES
/// 2) `configured` (from `[store].cities_path`)
/// 3) empty registry
pub fn load_cities_default(configured: &str) -> Result<Vec<City>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_cities_from(&pb);
        }
        return Err(anyhow!("{ENV_PATH} points to non-existent path"));
    }
    let pb = PathBuf::from(configured);
    if pb.exists() {
        return load_cities_from(&pb);
    }
    tracing::warn!(path = configured, "no city seed file; registry starts empty");
    Ok(Vec::new())
}

fn parse_cities(s: &str, hint_ext: &str) -> Result<Vec<City>> {
    #[derive(serde::Deserialize)]
    struct Doc {
        cities: Vec<SeedCity>,
    }
    let parsed: Vec<SeedCity> = if hint_ext == "json" {
        // Bare array or `{ "cities": [...] }`.
        serde_json::from_str::<Vec<SeedCity>>(s)
            .or_else(|_| serde_json::from_str::<Doc>(s).map(|d| d.cities))
            .context("parsing JSON cities")?
    } else {
        toml::from_str::<Doc>(s).context("parsing TOML cities")?.cities
    };
    Ok(clean_cities(parsed))
}

/// URL-safe slug: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn clean_cities(items: Vec<SeedCity>) -> Vec<City> {
    let mut out: Vec<City> = Vec::new();
    for it in items {
        let display_name = normalize_city_name(&it.display_name);
        if display_name.is_empty() {
            continue;
        }
        let slug = it
            .slug
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&display_name));
        if out.iter().any(|c| c.slug == slug) {
            continue;
        }
        out.push(City {
            slug,
            display_name,
            is_active: it.is_active,
            publication_id: it.publication_id.filter(|p| !p.trim().is_empty()),
            state_name: it.state_name,
        });
    }
    out
}
