// src/normalize/events.rs
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;

use super::event_date::{parse_event_date, sort_by_start};
use super::raw::RawEvent;
use super::{normalize_text, usable_link, Normalizer};
use crate::classify::category_or_fallback;
use crate::types::EventItem;

/// True when the primary source gave no venue for any item, the cue to merge a
/// secondary source.
pub fn needs_secondary(primary: &[RawEvent]) -> bool {
    primary.iter().all(|e| e.venue.is_none())
}

/// Primary first, then secondary items whose title is not already present.
pub fn merge_events(primary: Vec<RawEvent>, secondary: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut seen: HashSet<String> = primary.iter().map(|e| e.title.to_lowercase()).collect();
    let mut out = primary;
    out.extend(
        secondary
            .into_iter()
            .filter(|e| seen.insert(e.title.to_lowercase())),
    );
    out
}

impl Normalizer {
    /// Input cap, structural filter, date parsing, ordering, category tagging,
    /// output cap.
    pub async fn events(&self, raw: Vec<RawEvent>, reference: NaiveDate) -> Vec<EventItem> {
        let mut items: Vec<EventItem> = raw
            .into_iter()
            .take(self.cfg.events_input_cap)
            .filter_map(|r| {
                let title = normalize_text(&r.title);
                let date = normalize_text(&r.date);
                if title.is_empty() || date.is_empty() {
                    return None;
                }
                Some(EventItem {
                    starts_at: parse_event_date(&date, reference),
                    title,
                    date,
                    venue: r.venue.map(|v| normalize_text(&v)).unwrap_or_default(),
                    link: usable_link(r.link.as_deref()).unwrap_or_default(),
                    snippet: normalize_text(&r.snippet),
                    thumbnail: r.thumbnail,
                    category: Default::default(),
                })
            })
            .collect();

        // Patterns first; the classifier only sees what they could not read.
        for item in &mut items {
            if item.starts_at.is_some() {
                continue;
            }
            match self.classifier.parse_event_date(&item.date, reference).await {
                Ok(parsed) => item.starts_at = parsed,
                Err(e) => tracing::debug!(target: "normalize", error = %e, date = %item.date, "event date left unparsed"),
            }
        }

        sort_by_start(&mut items);
        items.truncate(self.cfg.events_limit);

        let categories: Vec<_> = stream::iter(items.clone())
            .map(|e| {
                let classifier = self.classifier.clone();
                async move {
                    let res = classifier.categorize_event(&e.title, &e.snippet).await;
                    category_or_fallback(res, &e.title, &e.snippet)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        for (item, category) in items.iter_mut().zip(categories) {
            item.category = category;
        }
        items
    }
}
