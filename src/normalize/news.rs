// src/normalize/news.rs
use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::raw::{decode_news, RawNews};
use super::{dedup_by_title, normalize_text, usable_link, Normalizer};
use crate::classify::news_or_fallback;
use crate::error::UpstreamError;
use crate::types::{Brief, BriefItem, NewsItem};

impl Normalizer {
    /// Search payload -> classified news. Items without a usable link, and items the
    /// classifier flags as irrelevant, inappropriate or negative, never survive.
    pub async fn news(&self, city: &str, payload: &Value) -> Result<Vec<NewsItem>, UpstreamError> {
        let raw = decode_news(payload)?;
        Ok(self.classify_news(city, raw).await)
    }

    pub async fn classify_news(&self, city: &str, raw: Vec<RawNews>) -> Vec<NewsItem> {
        let candidates: Vec<(RawNews, String)> = raw
            .into_iter()
            .take(self.cfg.news_input_cap)
            .filter_map(|mut r| {
                let link = usable_link(r.link.as_deref())?;
                r.title = normalize_text(&r.title);
                r.snippet = normalize_text(&r.snippet);
                (!r.title.is_empty()).then_some((r, link))
            })
            .collect();
        let candidates = dedup_by_title(candidates, |(r, _)| r.title.as_str());

        let verdicts: Vec<_> = stream::iter(candidates.clone())
            .map(|(r, _)| {
                let classifier = self.classifier.clone();
                let city = city.to_string();
                async move {
                    let res = classifier.classify_news(&city, &r.title, &r.snippet).await;
                    news_or_fallback(res, &r.title, &r.snippet)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let total = candidates.len();
        let kept: Vec<NewsItem> = candidates
            .into_iter()
            .zip(verdicts)
            .filter(|(_, v)| v.keep())
            .map(|((r, link), v)| NewsItem {
                title: v.title.clone().unwrap_or_else(|| r.title.clone()),
                summary: v.summary.clone().unwrap_or_else(|| r.snippet.clone()),
                link,
                date: r.date,
                source: r.source,
                is_relevant: v.is_relevant,
                is_appropriate: v.is_appropriate,
                is_positive: v.is_positive,
            })
            .take(self.cfg.news_limit)
            .collect();

        tracing::debug!(target: "normalize", city, total, kept = kept.len(), "news classified");
        kept
    }

    /// Condensed digest of the first headlines.
    pub fn brief(&self, news: &[NewsItem]) -> Brief {
        Brief {
            brief: news
                .iter()
                .take(self.cfg.brief_size)
                .map(|n| BriefItem {
                    title: n.title.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RuleClassifier;
    use crate::config::NormalizerConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(RuleClassifier), NormalizerConfig::default(), 1)
    }

    #[tokio::test]
    async fn caps_and_brief() {
        let items: Vec<_> = (0..40)
            .map(|i| json!({ "title": format!("Story number {i} about parks"), "link": format!("https://n.x/{i}") }))
            .collect();
        let n = normalizer();
        let news = n.news("Austin", &json!({ "news_results": items })).await.unwrap();
        assert_eq!(news.len(), 20);
        assert_eq!(n.brief(&news).brief.len(), 5);
        assert_eq!(n.brief(&news).brief[0].title, "Story number 0 about parks");
    }

    #[tokio::test]
    async fn brief_of_empty_news_is_empty() {
        assert!(normalizer().brief(&[]).brief.is_empty());
    }
}
