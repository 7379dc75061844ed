// src/normalize/sports.rs
//! One upstream batch, two independent views: summarized news and upcoming matches.

use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::raw::{decode_sports, RawNews};
use super::{normalize_text, usable_link, Normalizer};
use crate::classify::{match_or_fallback, rules, summary_or_fallback, MatchVerdict};
use crate::error::UpstreamError;
use crate::types::{
    CategorizedMatches, MatchItem, SportCategory, SportsDigest, SportsItemKind, SportsNewsItem,
};

/// Substring keywords per bucket, checked in `SportCategory::ALL` order.
const SPORT_KEYWORDS: &[(SportCategory, &[&str])] = &[
    (SportCategory::Basketball, &["basketball", "basketbol", "nba", "wnba", "ncaab"]),
    (SportCategory::Football, &["football", "futbol", "nfl", "ncaaf"]),
    (
        SportCategory::Soccer,
        &[
            "soccer", "mls", "süper lig", "super lig", "premier league", "la liga", "serie a",
            "bundesliga", "ligue 1", "eredivisie", "champions league", "uefa", "fifa",
        ],
    ),
    (SportCategory::Tennis, &["tennis", "tenis", "atp", "wta"]),
    (SportCategory::Baseball, &["baseball", "mlb"]),
    (SportCategory::Hockey, &["hockey", "hokey", "nhl"]),
    (SportCategory::Volleyball, &["volleyball", "voleybol"]),
    (SportCategory::Golf, &["golf", "pga"]),
    (SportCategory::Rugby, &["rugby"]),
    (SportCategory::Boxing, &["boxing", "boks"]),
    (SportCategory::Mma, &["mma", "ufc"]),
    (SportCategory::Racing, &["racing", "yarış", "f1", "formula 1", "nascar", "indycar"]),
];

/// Bucket a free-text sport label. Case-insensitive substring match, first bucket wins.
pub fn bucket_sport(sport: &str) -> SportCategory {
    let s = sport.to_lowercase();
    SPORT_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| s.contains(w)))
        .map(|(c, _)| *c)
        .unwrap_or(SportCategory::Other)
}

/// Group matches by bucket. Every bucket is present.
pub fn categorize_matches(matches: Vec<MatchItem>) -> CategorizedMatches {
    let mut out: CategorizedMatches = SportCategory::ALL.iter().map(|c| (*c, Vec::new())).collect();
    for m in matches {
        out.entry(bucket_sport(&m.sport)).or_default().push(m);
    }
    out
}

fn read_more_link(city: &str, news: &[SportsNewsItem]) -> String {
    news.iter()
        .find_map(|n| n.link.clone())
        .or_else(|| {
            url::Url::parse_with_params(
                "https://www.google.com/search",
                &[("q", format!("{city} sports"))],
            )
            .ok()
            .map(|u| u.to_string())
        })
        .unwrap_or_default()
}

impl Normalizer {
    pub async fn sports(&self, city: &str, payload: &Value) -> Result<SportsDigest, UpstreamError> {
        let raw = decode_sports(payload)?;
        Ok(self.build_sports(city, raw).await)
    }

    pub async fn build_sports(&self, city: &str, raw: Vec<RawNews>) -> SportsDigest {
        let raw: Vec<RawNews> = raw
            .into_iter()
            .filter_map(|mut r| {
                r.title = normalize_text(&r.title);
                r.snippet = normalize_text(&r.snippet);
                (!r.title.is_empty()).then_some(r)
            })
            .collect();

        let news_input: Vec<RawNews> = raw.iter().take(self.cfg.sports_news_limit).cloned().collect();
        let news: Vec<SportsNewsItem> = stream::iter(news_input)
            .map(|r| {
                let classifier = self.classifier.clone();
                let city = city.to_string();
                async move {
                    let res = classifier.summarize_sports(&city, &r.title, &r.snippet).await;
                    let s = summary_or_fallback(res, &r.title, &r.snippet);
                    SportsNewsItem {
                        link: usable_link(r.link.as_deref()),
                        original_title: r.title,
                        ai_title: s.title,
                        ai_summary: s.summary,
                        date: r.date,
                        source: r.source,
                        kind: SportsItemKind::News,
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let matches: Vec<MatchItem> = stream::iter(raw.into_iter().take(self.cfg.matches_input_cap))
            .map(|r| {
                let classifier = self.classifier.clone();
                let city = city.to_string();
                async move {
                    let res = classifier.extract_match(&city, &r.title, &r.snippet).await;
                    match match_or_fallback(res) {
                        MatchVerdict::NotAMatch => None,
                        MatchVerdict::Match(d) => Some(MatchItem {
                            title: d.title.unwrap_or_else(|| r.title.clone()),
                            date: r.date.clone().unwrap_or_default(),
                            time: d.time.unwrap_or_default(),
                            teams: d
                                .teams
                                .or_else(|| rules::teams_from_title(&r.title))
                                .unwrap_or_else(|| r.title.clone()),
                            venue: d.venue.unwrap_or_default(),
                            // Without a label the headline itself is bucketed.
                            sport: d.sport.unwrap_or_else(|| r.title.clone()),
                            link: usable_link(r.link.as_deref()),
                        }),
                    }
                }
            })
            .buffered(self.concurrency)
            .filter_map(|m| async move { m })
            .collect()
            .await;

        self.digest(city, news, matches)
    }

    fn digest(&self, city: &str, news: Vec<SportsNewsItem>, matches: Vec<MatchItem>) -> SportsDigest {
        let upcoming = categorize_matches(matches);

        let summary = {
            let parts: Vec<&str> = news
                .iter()
                .take(2)
                .map(|n| n.ai_summary.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                format!("Stay updated with the latest sports action in {city}.")
            } else {
                parts.join(" ")
            }
        };

        let flat: Vec<MatchItem> = upcoming
            .iter()
            .flat_map(|(cat, items)| {
                items.iter().map(move |m| MatchItem {
                    sport: cat.label(),
                    ..m.clone()
                })
            })
            .take(self.cfg.digest_match_limit)
            .collect();

        SportsDigest {
            read_more_link: read_more_link(city, &news),
            sports: news,
            upcoming_matches: upcoming,
            summary,
            matches: flat,
        }
    }
}
