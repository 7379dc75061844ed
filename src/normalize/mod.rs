// src/normalize/mod.rs
//! Content normalizer: raw upstream payloads -> canonical items.
//!
//! Three kinds of filtering happen here: structural (required fields present),
//! policy (classifier says appropriate and positive) and relevance (classifier
//! says the item is about the city). Classifier calls for a batch run through a
//! bounded window (`classifier.concurrency`, 1 = strictly sequential).

pub mod event_date;
pub mod events;
pub mod news;
pub mod raw;
pub mod sports;
pub mod weather;

use std::collections::HashSet;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::classify::DynClassifier;
use crate::config::NormalizerConfig;

pub use event_date::parse_event_date;
pub use sports::bucket_sport;
pub use weather::summarize_weather;

pub struct Normalizer {
    classifier: DynClassifier,
    cfg: NormalizerConfig,
    concurrency: usize,
}

impl Normalizer {
    pub fn new(classifier: DynClassifier, cfg: NormalizerConfig, concurrency: usize) -> Self {
        Self {
            classifier,
            cfg,
            concurrency: concurrency.max(1),
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.cfg
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }
}

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Duplicate key: the lowercase first six words of a title.
pub fn title_key(title: &str) -> String {
    title
        .split_whitespace()
        .take(6)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the first item for each title key.
pub fn dedup_by_title<T, F>(items: Vec<T>, title: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|it| seen.insert(title_key(title(it))))
        .collect()
}

/// Absolute http(s) URL with a host.
pub fn usable_link(link: Option<&str>) -> Option<String> {
    let raw = link?.trim();
    let parsed = url::Url::parse(raw).ok()?;
    let web = matches!(parsed.scheme(), "http" | "https");
    (web && parsed.host_str().is_some_and(|h| !h.is_empty())).then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_cleans_markup() {
        let s = "  <b>Park&nbsp;Opens</b>\n\n “Today”  ";
        assert_eq!(normalize_text(s), "Park Opens \"Today\"");
    }

    #[test]
    fn dedup_uses_first_six_words() {
        let items = vec![
            "City Council Approves New Park Plan For Downtown",
            "city council approves new park plan after long debate",
            "City Council Approves Budget",
        ];
        let out = dedup_by_title(items, |s| *s);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "City Council Approves New Park Plan For Downtown");
    }

    #[test]
    fn only_web_links_are_usable() {
        assert!(usable_link(Some("https://news.example.com/a")).is_some());
        assert!(usable_link(Some("http://x.org")).is_some());
        assert!(usable_link(Some("ftp://x.org/f")).is_none());
        assert!(usable_link(Some("/relative/path")).is_none());
        assert!(usable_link(Some("")).is_none());
        assert!(usable_link(None).is_none());
    }
}
