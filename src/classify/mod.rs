// src/classify/mod.rs
//! Content classifier: a language-model seam with a deterministic rule fallback.
//!
//! Every call may fail. Callers never drop a batch because of one failed item;
//! they apply the per-item fallback helpers defined at the bottom of this module.

pub mod openai;
pub mod rules;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::types::EventCategory;

pub use openai::OpenAiClassifier;
pub use rules::RuleClassifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsVerdict {
    pub is_relevant: bool,
    pub is_appropriate: bool,
    pub is_positive: bool,
    /// Rewritten headline, when the classifier offers one.
    pub title: Option<String>,
    pub summary: Option<String>,
}

impl NewsVerdict {
    pub fn keep(&self) -> bool {
        self.is_relevant && self.is_appropriate && self.is_positive
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SportsSummary {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchDetails {
    pub title: Option<String>,
    pub teams: Option<String>,
    pub sport: Option<String>,
    pub venue: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchVerdict {
    NotAMatch,
    Match(MatchDetails),
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Relevance to `city` plus appropriateness and tone.
    async fn classify_news(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<NewsVerdict, ClassifyError>;

    async fn categorize_event(&self, title: &str, snippet: &str)
        -> Result<EventCategory, ClassifyError>;

    async fn summarize_sports(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<SportsSummary, ClassifyError>;

    async fn extract_match(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<MatchVerdict, ClassifyError>;

    /// Last-resort date understanding for free-text event dates.
    async fn parse_event_date(
        &self,
        _raw: &str,
        _reference: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, ClassifyError> {
        Ok(None)
    }

    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Factory.
///
/// * If `AI_TEST_MODE=mock`, or the classifier is disabled, or the provider is
///   "rules", returns the deterministic [`RuleClassifier`].
/// * "openai" builds the remote classifier. A missing key does not fail here;
///   each call reports `Disabled` and callers fall back.
pub fn build_classifier(cfg: &ClassifierConfig) -> anyhow::Result<DynClassifier> {
    let mock = std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false);
    if mock || !cfg.enabled {
        return Ok(Arc::new(RuleClassifier));
    }
    match cfg.provider.as_str() {
        "openai" => {
            if cfg.api_key.is_empty() {
                tracing::warn!("classifier enabled but OPENAI_API_KEY is empty; rule fallback will be used");
            }
            Ok(Arc::new(OpenAiClassifier::new(cfg)?))
        }
        "rules" => Ok(Arc::new(RuleClassifier)),
        other => anyhow::bail!("Unsupported classifier provider in config: {other}"),
    }
}

// ------------------------------------------------------------
// Per-item fallback policy
// ------------------------------------------------------------

fn note_fallback(op: &'static str, err: &ClassifyError) {
    counter!("classifier_fallbacks_total", "op" => op).increment(1);
    tracing::warn!(op, error = %err, "classifier call failed, using fallback");
}

/// News: a failed call is judged by the rule screen (relevant, and
/// appropriate/positive unless a negative keyword appears).
pub fn news_or_fallback(
    res: Result<NewsVerdict, ClassifyError>,
    title: &str,
    snippet: &str,
) -> NewsVerdict {
    res.unwrap_or_else(|e| {
        note_fallback("news", &e);
        rules::screen_news(title, snippet)
    })
}

/// Events: malformed output means `Other`; any other failure uses keyword categories.
pub fn category_or_fallback(
    res: Result<EventCategory, ClassifyError>,
    title: &str,
    snippet: &str,
) -> EventCategory {
    match res {
        Ok(c) => c,
        Err(e @ ClassifyError::Malformed(_)) => {
            note_fallback("event_category", &e);
            EventCategory::Other
        }
        Err(e) => {
            note_fallback("event_category", &e);
            rules::keyword_category(title, snippet)
        }
    }
}

/// Sports news: the raw title and snippet stand in for the summary.
pub fn summary_or_fallback(
    res: Result<SportsSummary, ClassifyError>,
    title: &str,
    snippet: &str,
) -> SportsSummary {
    res.unwrap_or_else(|e| {
        note_fallback("sports_summary", &e);
        SportsSummary {
            title: title.to_string(),
            summary: snippet.to_string(),
        }
    })
}

/// Matches: any failure keeps the item with empty details so raw fields fill
/// in. Only an explicit `NotAMatch` from the classifier drops it.
pub fn match_or_fallback(res: Result<MatchVerdict, ClassifyError>) -> MatchVerdict {
    res.unwrap_or_else(|e| {
        note_fallback("match", &e);
        MatchVerdict::Match(MatchDetails::default())
    })
}
