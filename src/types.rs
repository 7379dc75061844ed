// src/types.rs
//! Canonical shapes for everything that goes into (and comes out of) the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content cached per (city, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Weather,
    News,
    Events,
    Sports,
    Brief,
}

impl DataType {
    /// The four types fetched from upstream. `Brief` is derived from `News`.
    pub const FETCHED: [DataType; 4] = [
        DataType::Weather,
        DataType::News,
        DataType::Events,
        DataType::Sports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Weather => "weather",
            DataType::News => "news",
            DataType::Events => "events",
            DataType::Sports => "sports",
            DataType::Brief => "brief",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weather" => Ok(DataType::Weather),
            "news" => Ok(DataType::News),
            "events" => Ok(DataType::Events),
            "sports" => Ok(DataType::Sports),
            "brief" | "todaysbrief" => Ok(DataType::Brief),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

/// One data type's content for one city on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub city: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: DataType,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(city: &str, date: NaiveDate, kind: DataType, payload: serde_json::Value) -> Self {
        Self {
            city: city.to_string(),
            date,
            kind,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Decode the payload into its typed shape.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub link: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub is_relevant: bool,
    pub is_appropriate: bool,
    pub is_positive: bool,
}

/// Closed category set assigned to events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventCategory {
    Music,
    Art,
    Theatre,
    Sports,
    Festivals,
    Markets,
    Food,
    #[default]
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 8] = [
        EventCategory::Music,
        EventCategory::Art,
        EventCategory::Theatre,
        EventCategory::Sports,
        EventCategory::Festivals,
        EventCategory::Markets,
        EventCategory::Food,
        EventCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Music => "Music",
            EventCategory::Art => "Art",
            EventCategory::Theatre => "Theatre",
            EventCategory::Sports => "Sports",
            EventCategory::Festivals => "Festivals",
            EventCategory::Markets => "Markets",
            EventCategory::Food => "Food",
            EventCategory::Other => "Other",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = ();

    /// Accepts exactly one category name, ignoring case and a trailing period.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().trim_end_matches('.').trim();
        EventCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(t))
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub title: String,
    /// Upstream free text; not guaranteed parseable.
    pub date: String,
    pub venue: String,
    pub link: String,
    pub snippet: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub category: EventCategory,
    /// Parsed start, when `date` could be understood.
    #[serde(default)]
    pub starts_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SportsItemKind {
    #[default]
    News,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportsNewsItem {
    pub original_title: String,
    pub ai_title: String,
    pub ai_summary: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: SportsItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchItem {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub teams: String,
    #[serde(default)]
    pub venue: String,
    /// Free text as reported; bucketed into a [`SportCategory`].
    pub sport: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Fixed sport buckets. Declaration order is the matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SportCategory {
    Basketball,
    Football,
    Soccer,
    Tennis,
    Baseball,
    Hockey,
    Volleyball,
    Golf,
    Rugby,
    Boxing,
    Mma,
    Racing,
    Other,
}

impl SportCategory {
    pub const ALL: [SportCategory; 13] = [
        SportCategory::Basketball,
        SportCategory::Football,
        SportCategory::Soccer,
        SportCategory::Tennis,
        SportCategory::Baseball,
        SportCategory::Hockey,
        SportCategory::Volleyball,
        SportCategory::Golf,
        SportCategory::Rugby,
        SportCategory::Boxing,
        SportCategory::Mma,
        SportCategory::Racing,
        SportCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SportCategory::Basketball => "basketball",
            SportCategory::Football => "football",
            SportCategory::Soccer => "soccer",
            SportCategory::Tennis => "tennis",
            SportCategory::Baseball => "baseball",
            SportCategory::Hockey => "hockey",
            SportCategory::Volleyball => "volleyball",
            SportCategory::Golf => "golf",
            SportCategory::Rugby => "rugby",
            SportCategory::Boxing => "boxing",
            SportCategory::Mma => "mma",
            SportCategory::Racing => "racing",
            SportCategory::Other => "other",
        }
    }

    /// Capitalised label for rendering ("Basketball", "Mma" -> "MMA").
    pub fn label(&self) -> String {
        match self {
            SportCategory::Mma => "MMA".to_string(),
            other => {
                let s = other.as_str();
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        }
    }
}

/// Matches grouped by bucket. Every bucket is present, possibly empty.
pub type CategorizedMatches = BTreeMap<SportCategory, Vec<MatchItem>>;

/// Cached `sports` payload: two independent views over one upstream batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportsDigest {
    pub sports: Vec<SportsNewsItem>,
    pub upcoming_matches: CategorizedMatches,
    pub summary: String,
    /// Flattened matches across buckets, capped for rendering.
    pub matches: Vec<MatchItem>,
    pub read_more_link: String,
}

impl SportsDigest {
    pub fn has_content(&self) -> bool {
        !self.sports.is_empty() || self.upcoming_matches.values().any(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub date: NaiveDate,
    pub condition: String,
    pub high: i32,
    pub low: i32,
    pub wind_direction: String,
    pub wind_min: i32,
    pub wind_max: i32,
    /// "F" or "C".
    pub unit: String,
}

impl WeatherSnapshot {
    /// e.g. "NNE 9-14 mph"
    pub fn wind_label(&self) -> String {
        format!("{} {}-{} mph", self.wind_direction, self.wind_min, self.wind_max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefItem {
    pub title: String,
}

/// Cached `brief` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Brief {
    pub brief: Vec<BriefItem>,
}

/// Reference entity owned by the city registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub slug: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub publication_id: Option<String>,
    #[serde(default)]
    pub state_name: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    pub city: String,
    pub created_at: DateTime<Utc>,
}

/// Trim, collapse inner whitespace and Title Case a city name. Cache keys use this form.
pub fn normalize_city_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_names_are_title_cased() {
        assert_eq!(normalize_city_name("  new   YORK "), "New York");
        assert_eq!(normalize_city_name("istanbul"), "Istanbul");
        assert_eq!(normalize_city_name(""), "");
    }

    #[test]
    fn event_category_parses_loosely() {
        assert_eq!("music".parse(), Ok(EventCategory::Music));
        assert_eq!(" Theatre. ".parse(), Ok(EventCategory::Theatre));
        assert!("Concerts".parse::<EventCategory>().is_err());
    }

    #[test]
    fn data_type_round_trips_through_str() {
        for t in DataType::FETCHED {
            assert_eq!(t.as_str().parse::<DataType>(), Ok(t));
        }
        assert_eq!("todaysBrief".parse::<DataType>(), Ok(DataType::Brief));
    }

    #[test]
    fn categorized_matches_serialize_with_lowercase_keys() {
        let mut m = CategorizedMatches::new();
        m.insert(SportCategory::Mma, vec![]);
        let v = serde_json::to_value(&m).unwrap();
        assert!(v.get("mma").is_some());
        assert_eq!(SportCategory::Mma.label(), "MMA");
        assert_eq!(SportCategory::Basketball.label(), "Basketball");
    }
}
