// src/classify/rules.rs
//! Deterministic keyword rules. Used when the model is disabled and as the
//! per-item fallback when a model call fails.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Classifier, MatchDetails, MatchVerdict, NewsVerdict, SportsSummary};
use crate::error::ClassifyError;
use crate::types::EventCategory;

const NEGATIVE_KEYWORDS: &[&str] = &[
    "death", "dead", "died", "killed", "murder", "homicide", "suicide", "accident", "crash",
    "fatal", "injury", "wounded", "shot", "stabbed", "disease", "outbreak", "epidemic",
    "pandemic", "virus", "infection", "crime", "robbery", "theft", "assault", "rape", "abuse",
    "violence", "terrorism", "bomb", "explosion", "fire", "disaster", "emergency", "crisis",
    "tragedy", "funeral", "obituary", "memorial", "victim", "suspect", "arrest", "jail",
    "prison", "conviction", "sentence", "protest", "riot", "demonstration", "conflict", "war",
    "battle", "casualty", "casualties", "missing", "disappeared", "kidnapped", "legionnaires",
    "legionella", "contamination", "poisoning",
];

fn word_alternation(words: &[&str]) -> Regex {
    let alt = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alt})\b")).unwrap()
}

static RE_NEGATIVE: Lazy<Regex> = Lazy::new(|| word_alternation(NEGATIVE_KEYWORDS));

static CATEGORY_RULES: Lazy<Vec<(EventCategory, Regex)>> = Lazy::new(|| {
    vec![
        (
            EventCategory::Music,
            word_alternation(&[
                "concert", "concerts", "music", "band", "jazz", "dj", "symphony", "orchestra",
                "tour", "live", "choir", "rock", "hip hop",
            ]),
        ),
        (
            EventCategory::Theatre,
            word_alternation(&[
                "theatre", "theater", "broadway", "play", "musical", "comedy", "stand-up",
                "ballet", "opera", "improv",
            ]),
        ),
        (
            EventCategory::Art,
            word_alternation(&["art", "arts", "gallery", "exhibit", "exhibition", "museum", "painting"]),
        ),
        (
            EventCategory::Sports,
            word_alternation(&[
                "game", "match", "vs", "marathon", "race", "tournament", "championship", "5k",
            ]),
        ),
        (
            EventCategory::Festivals,
            word_alternation(&["festival", "fest", "parade", "celebration", "carnival"]),
        ),
        (
            EventCategory::Markets,
            word_alternation(&["market", "markets", "fair", "bazaar", "flea", "craft show"]),
        ),
        (
            EventCategory::Food,
            word_alternation(&[
                "food", "wine", "beer", "tasting", "culinary", "dinner", "brunch", "chef",
            ]),
        ),
    ]
});

static RE_VERSUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s(?:vs\.?|v\.?|@)\s").unwrap());

pub fn has_negative_keyword(text: &str) -> bool {
    RE_NEGATIVE.is_match(text)
}

/// Rule verdict for one news item.
pub fn screen_news(title: &str, snippet: &str) -> NewsVerdict {
    let clean = !has_negative_keyword(title) && !has_negative_keyword(snippet);
    NewsVerdict {
        is_relevant: true,
        is_appropriate: clean,
        is_positive: clean,
        title: None,
        summary: None,
    }
}

/// First category whose keywords appear in title or snippet; `Other` otherwise.
pub fn keyword_category(title: &str, snippet: &str) -> EventCategory {
    let text = format!("{title} {snippet}");
    CATEGORY_RULES
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(c, _)| *c)
        .unwrap_or(EventCategory::Other)
}

/// Team names from a "A vs B" style headline.
pub fn teams_from_title(title: &str) -> Option<String> {
    let m = RE_VERSUS.find(title)?;
    let home = title[..m.start()].trim();
    let away = title[m.end()..]
        .split([':', '|', '-', ','])
        .next()
        .unwrap_or("")
        .trim();
    let home = home.rsplit([':', '|', '-', ',']).next().unwrap_or(home).trim();
    if home.is_empty() || away.is_empty() {
        return None;
    }
    Some(format!("{home} vs {away}"))
}

pub struct RuleClassifier;

#[async_trait::async_trait]
impl Classifier for RuleClassifier {
    async fn classify_news(
        &self,
        _city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<NewsVerdict, ClassifyError> {
        Ok(screen_news(title, snippet))
    }

    async fn categorize_event(
        &self,
        title: &str,
        snippet: &str,
    ) -> Result<EventCategory, ClassifyError> {
        Ok(keyword_category(title, snippet))
    }

    async fn summarize_sports(
        &self,
        _city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<SportsSummary, ClassifyError> {
        Ok(SportsSummary {
            title: title.to_string(),
            summary: snippet.to_string(),
        })
    }

    async fn extract_match(
        &self,
        _city: &str,
        title: &str,
        _snippet: &str,
    ) -> Result<MatchVerdict, ClassifyError> {
        Ok(match teams_from_title(title) {
            Some(teams) => MatchVerdict::Match(MatchDetails {
                teams: Some(teams),
                ..Default::default()
            }),
            None => MatchVerdict::NotAMatch,
        })
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_keywords_match_whole_words_only() {
        assert!(has_negative_keyword("Fire crews respond downtown"));
        assert!(has_negative_keyword("Police name SUSPECT"));
        // "fireworks" and "shotgun start" are not "fire" / "shot"
        assert!(!has_negative_keyword("Fireworks light up the river"));
        assert!(!has_negative_keyword("Golf classic tees off with shotgun start"));
    }

    #[test]
    fn keyword_categories() {
        assert_eq!(keyword_category("Farmers Market on Main", ""), EventCategory::Markets);
        assert_eq!(keyword_category("Hamilton", "Broadway musical"), EventCategory::Theatre);
        assert_eq!(keyword_category("Taco Festival", ""), EventCategory::Festivals);
        assert_eq!(keyword_category("Quiet evening", "no hints"), EventCategory::Other);
    }

    #[test]
    fn teams_are_extracted_from_versus_titles() {
        assert_eq!(
            teams_from_title("NBA: Lakers vs. Celtics - preview").as_deref(),
            Some("Lakers vs Celtics")
        );
        assert_eq!(teams_from_title("City council meets"), None);
    }

    #[tokio::test]
    async fn rule_classifier_is_infallible() {
        let c = RuleClassifier;
        let v = c.classify_news("Austin", "Library reopens", "").await.unwrap();
        assert!(v.keep());
        let m = c.extract_match("Austin", "Weekly recap", "").await.unwrap();
        assert_eq!(m, MatchVerdict::NotAMatch);
    }
}
