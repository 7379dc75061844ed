// src/classify/openai.rs
//! OpenAI-backed classifier (Chat Completions API). Requires `OPENAI_API_KEY`.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{Classifier, MatchDetails, MatchVerdict, NewsVerdict, SportsSummary};
use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::types::EventCategory;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClassifier {
    pub fn new(cfg: &ClassifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("city-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Point at a different completions endpoint (local proxy, test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::Disabled);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClassifyError::Transport(format!(
                "completions returned status {}",
                resp.status().as_u16()
            )));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

/// Parse the first `{...}` block in a model reply. Models like to wrap JSON in prose or fences.
pub fn parse_json_reply<T: DeserializeOwned>(content: &str) -> Result<T, ClassifyError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => return Err(ClassifyError::Malformed(truncate(content))),
    };
    serde_json::from_str(slice).map_err(|e| ClassifyError::Malformed(format!("{e}: {}", truncate(content))))
}

fn truncate(s: &str) -> String {
    s.chars().take(120).collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsReply {
    #[serde(default)]
    is_relevant: bool,
    #[serde(default)]
    is_appropriate: bool,
    #[serde(default)]
    is_positive: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct SummaryReply {
    title: String,
    summary: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchReply {
    #[serde(default)]
    is_match: Option<bool>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    teams: Option<String>,
    #[serde(default)]
    sport: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[async_trait::async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify_news(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<NewsVerdict, ClassifyError> {
        let system = "You screen local news for a friendly morning newsletter. \
            Reply with JSON only: {\"isRelevant\": bool, \"isAppropriate\": bool, \"isPositive\": bool, \
            \"title\": string, \"summary\": string}. isRelevant: the story is about the given city. \
            isAppropriate: no violence, crime, death, disease or disasters. isPositive: uplifting or neutral. \
            title: a short headline. summary: one or two sentences.";
        let user = format!("City: {city}\nTitle: {title}\nSnippet: {snippet}");
        let reply: NewsReply = parse_json_reply(&self.complete(system, &user, 220).await?)?;
        Ok(NewsVerdict {
            is_relevant: reply.is_relevant,
            is_appropriate: reply.is_appropriate,
            is_positive: reply.is_positive,
            title: non_blank(reply.title),
            summary: non_blank(reply.summary),
        })
    }

    async fn categorize_event(
        &self,
        title: &str,
        snippet: &str,
    ) -> Result<EventCategory, ClassifyError> {
        let system = "Categorize the event. Reply with exactly one word from: \
            Music, Art, Theatre, Sports, Festivals, Markets, Food, Other.";
        let user = format!("Event: {title}\nDescription: {snippet}");
        let reply = self.complete(system, &user, 5).await?;
        reply
            .parse::<EventCategory>()
            .map_err(|_| ClassifyError::Malformed(truncate(&reply)))
    }

    async fn summarize_sports(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<SportsSummary, ClassifyError> {
        let system = "Rewrite a local sports headline for a newsletter. \
            Reply with JSON only: {\"title\": string, \"summary\": string}. \
            Keep the title under 80 characters and the summary to one sentence.";
        let user = format!("City: {city}\nTitle: {title}\nSnippet: {snippet}");
        let reply: SummaryReply = parse_json_reply(&self.complete(system, &user, 160).await?)?;
        if reply.title.trim().is_empty() {
            return Err(ClassifyError::Malformed("empty title".into()));
        }
        Ok(SportsSummary {
            title: reply.title.trim().to_string(),
            summary: reply.summary.trim().to_string(),
        })
    }

    async fn extract_match(
        &self,
        city: &str,
        title: &str,
        snippet: &str,
    ) -> Result<MatchVerdict, ClassifyError> {
        let system = "Decide whether the item announces a specific upcoming game or match. \
            Reply with JSON only: {\"isMatch\": bool, \"title\": string, \"teams\": string, \
            \"sport\": string, \"venue\": string, \"time\": string}.";
        let user = format!("City: {city}\nTitle: {title}\nSnippet: {snippet}");
        let reply: MatchReply = parse_json_reply(&self.complete(system, &user, 160).await?)?;
        // Absent flag counts as a match; only an explicit false drops the item.
        if reply.is_match == Some(false) {
            return Ok(MatchVerdict::NotAMatch);
        }
        Ok(MatchVerdict::Match(MatchDetails {
            title: non_blank(reply.title),
            teams: non_blank(reply.teams),
            sport: non_blank(reply.sport),
            venue: non_blank(reply.venue),
            time: non_blank(reply.time),
        }))
    }

    async fn parse_event_date(
        &self,
        raw: &str,
        reference: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, ClassifyError> {
        let system = "Convert an event date description to ISO format YYYY-MM-DDTHH:MM. \
            Use the reference date to infer a missing year. Use 00:00 when no time is given. \
            Reply with the ISO value only, or null if it cannot be determined.";
        let user = format!("Reference date: {reference}\nEvent date: {raw}");
        let reply = self.complete(system, &user, 20).await?;
        let t = reply.trim().trim_matches('"');
        if t.eq_ignore_ascii_case("null") || t.is_empty() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M")
            .map(Some)
            .map_err(|_| ClassifyError::Malformed(truncate(&reply)))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
