// src/normalize/raw.rs
//! Decode step: provider JSON -> typed intermediates. Field fallbacks live here so
//! the normalizers work on a guaranteed shape.

use serde_json::Value;

use crate::error::UpstreamError;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawNews {
    pub title: String,
    pub link: Option<String>,
    pub snippet: String,
    pub date: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEvent {
    pub title: String,
    pub date: String,
    pub venue: Option<String>,
    pub link: Option<String>,
    pub snippet: String,
    pub thumbnail: Option<String>,
}

/// Flatten a JSON value to display text: strings as-is, objects via
/// `name`/`text`/`when`, arrays joined with ", ".
fn text_of(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => ["name", "text", "when", "start_date"]
            .iter()
            .find_map(|k| map.get(*k).and_then(text_of))?,
        Value::Array(items) => items
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// First non-empty text among `keys`.
fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| item.get(*k).and_then(text_of))
}

/// Event dates come as a string, or an object with `when` / `start_date`.
fn event_date(item: &Value) -> Option<String> {
    match item.get("date") {
        Some(Value::Object(d)) => ["when", "start_date"]
            .iter()
            .find_map(|k| d.get(*k).and_then(text_of)),
        Some(other) => text_of(other),
        None => first_text(item, &["date_when", "start_date"]),
    }
}

/// Locate the results array. A payload-level `error` string is a provider failure;
/// an absent array means "no results".
fn results<'a>(upstream: &'static str, v: &'a Value, keys: &[&str]) -> Result<&'a [Value], UpstreamError> {
    if !v.is_object() {
        return Err(UpstreamError::Decode {
            upstream,
            message: "payload is not a JSON object".into(),
        });
    }
    if let Some(err) = v.get("error").and_then(Value::as_str) {
        // Provider signals "no results" this way too.
        if err.to_ascii_lowercase().contains("hasn't returned any results") {
            return Ok(&[]);
        }
        return Err(UpstreamError::Decode {
            upstream,
            message: err.chars().take(160).collect(),
        });
    }
    Ok(keys
        .iter()
        .find_map(|k| v.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[]))
}

pub fn decode_news(v: &Value) -> Result<Vec<RawNews>, UpstreamError> {
    let items = results("search", v, &["news_results", "organic_results"])?;
    Ok(items
        .iter()
        .filter_map(|it| {
            Some(RawNews {
                title: first_text(it, &["title"])?,
                link: first_text(it, &["link", "url"]),
                snippet: first_text(it, &["snippet", "description"]).unwrap_or_default(),
                date: first_text(it, &["date"]),
                source: first_text(it, &["source"]),
            })
        })
        .collect())
}

/// Sports reuse the news shape; either engine's result list is accepted.
pub fn decode_sports(v: &Value) -> Result<Vec<RawNews>, UpstreamError> {
    decode_news(v)
}

/// Primary events: `events_results` (events engine) or `organic_results` (web fallback).
pub fn decode_events(v: &Value) -> Result<Vec<RawEvent>, UpstreamError> {
    let items = results("search", v, &["events_results", "organic_results"])?;
    Ok(items.iter().filter_map(raw_event).collect())
}

fn raw_event(it: &Value) -> Option<RawEvent> {
    Some(RawEvent {
        title: first_text(it, &["title"])?,
        date: event_date(it).unwrap_or_default(),
        venue: first_text(it, &["venue", "location", "address", "place", "venue_name"]),
        link: first_text(it, &["link", "event_link"]),
        snippet: first_text(it, &["description", "snippet"]).unwrap_or_default(),
        thumbnail: first_text(it, &["thumbnail", "image"]),
    })
}

/// Secondary events (Eventbrite `events[]`).
pub fn decode_secondary_events(v: &Value) -> Result<Vec<RawEvent>, UpstreamError> {
    let items = results("eventbrite", v, &["events"])?;
    Ok(items
        .iter()
        .filter_map(|it| {
            let snippet: String = it
                .get("description")
                .and_then(text_of)
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            Some(RawEvent {
                title: it.get("name").and_then(text_of)?,
                date: it
                    .get("start")
                    .and_then(|s| s.get("local"))
                    .and_then(text_of)
                    .unwrap_or_default(),
                venue: it.get("venue").and_then(text_of),
                link: first_text(it, &["url"]),
                snippet,
                thumbnail: it
                    .get("logo")
                    .and_then(|l| l.get("url"))
                    .and_then(text_of),
            })
        })
        .collect())
}
