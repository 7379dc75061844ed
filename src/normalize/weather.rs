// src/normalize/weather.rs
//! Current + 3-hour forecast -> one day's snapshot.
//!
//! Forecast slices are bucketed by the city's *local* calendar day (provider
//! reports the UTC offset in seconds), not by their UTC day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::UpstreamError;
use crate::gateway::RawWeather;
use crate::types::WeatherSnapshot;

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Slices used when none fall on the target day (24h of 3-hour slices).
const FALLBACK_SLICES: usize = 8;

#[derive(Debug, Default, Deserialize)]
struct Main {
    temp: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Condition {
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Current {
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    main: Main,
    #[serde(default)]
    wind: Wind,
    #[serde(default)]
    timezone: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Slice {
    dt: i64,
    #[serde(default)]
    main: Main,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    wind: Wind,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastCity {
    timezone: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(default)]
    list: Vec<Slice>,
    #[serde(default)]
    city: ForecastCity,
}

fn decode<T: serde::de::DeserializeOwned>(v: &serde_json::Value) -> Result<T, UpstreamError> {
    serde_json::from_value(v.clone()).map_err(|e| UpstreamError::Decode {
        upstream: "weather",
        message: e.to_string(),
    })
}

/// Local calendar day of a UTC unix timestamp at `offset_secs`.
pub fn local_day(dt: i64, offset_secs: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(dt + offset_secs, 0).map(|d| d.date_naive())
}

pub fn compass_point(deg: f64) -> &'static str {
    let idx = (deg.rem_euclid(360.0) / 22.5).round() as usize % 16;
    COMPASS[idx]
}

fn describe(conds: &[Condition]) -> Option<String> {
    let c = conds.first()?;
    let text = if c.description.trim().is_empty() {
        c.main.trim()
    } else {
        c.description.trim()
    };
    let mut chars = text.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().collect::<String>() + chars.as_str())
}

/// Build the snapshot for `date`. `units` is the provider unit system the data was
/// requested in ("imperial" | "metric" | "standard").
pub fn summarize_weather(
    raw: &RawWeather,
    date: NaiveDate,
    units: &str,
) -> Result<WeatherSnapshot, UpstreamError> {
    let current: Current = decode(&raw.current)?;
    let forecast: Forecast = if raw.forecast.is_null() {
        Forecast {
            list: Vec::new(),
            city: ForecastCity::default(),
        }
    } else {
        decode(&raw.forecast)?
    };
    let offset = forecast.city.timezone.or(current.timezone).unwrap_or(0);

    let on_day: Vec<&Slice> = forecast
        .list
        .iter()
        .filter(|s| local_day(s.dt, offset) == Some(date))
        .collect();
    let slices: Vec<&Slice> = if on_day.is_empty() {
        forecast.list.iter().take(FALLBACK_SLICES).collect()
    } else {
        on_day
    };

    let highs = slices.iter().filter_map(|s| s.main.temp_max.or(s.main.temp));
    let lows = slices.iter().filter_map(|s| s.main.temp_min.or(s.main.temp));
    let high = highs
        .reduce(f64::max)
        .or(current.main.temp_max)
        .or(current.main.temp);
    let low = lows
        .reduce(f64::min)
        .or(current.main.temp_min)
        .or(current.main.temp);
    let (Some(high), Some(low)) = (high, low) else {
        return Err(UpstreamError::Decode {
            upstream: "weather",
            message: "no temperatures in current or forecast".into(),
        });
    };

    let rep = slices.get(slices.len() / 2);
    let condition = rep
        .and_then(|s| describe(&s.weather))
        .or_else(|| describe(&current.weather))
        .unwrap_or_else(|| "Unknown".to_string());
    let wind = rep.map(|s| &s.wind).unwrap_or(&current.wind);

    let speed = wind.speed.unwrap_or(0.0);
    let mph = if units.eq_ignore_ascii_case("imperial") {
        speed
    } else {
        speed * 2.237
    };
    let mph = mph.round().max(0.0) as i32;

    Ok(WeatherSnapshot {
        date,
        condition,
        high: high.round() as i32,
        low: low.round() as i32,
        wind_direction: compass_point(wind.deg.unwrap_or(0.0)).to_string(),
        wind_min: mph,
        wind_max: mph + 5,
        unit: match units.to_ascii_lowercase().as_str() {
            "imperial" => "F",
            "metric" => "C",
            _ => "K",
        }
        .to_string(),
    })
}
