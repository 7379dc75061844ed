// src/dispatch/broadcast.rs
//! Email-broadcast provider (Beehiiv): one scheduled post per city segment.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::DeliveryError;

const DEFAULT_BASE: &str = "https://api.beehiiv.com/v2";

#[derive(Debug, Clone)]
pub struct BroadcastPost {
    pub title: String,
    pub email_subject: String,
    pub html: String,
    /// Empty means every subscriber of the publication.
    pub segment_ids: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait BroadcastClient: Send + Sync {
    /// Returns the provider's post id.
    async fn create_post(&self, post: &BroadcastPost) -> Result<String, DeliveryError>;
}

pub struct BeehiivClient {
    http: Client,
    base: String,
    api_key: String,
    publication_id: String,
}

#[derive(Deserialize)]
struct CreatedPost {
    data: CreatedData,
}

#[derive(Deserialize)]
struct CreatedData {
    #[serde(default)]
    id: String,
}

/// Segment ids must carry the `seg_` prefix.
pub fn segment_id(id: &str) -> String {
    if id.starts_with("seg_") {
        id.to_string()
    } else {
        format!("seg_{id}")
    }
}

impl BeehiivClient {
    pub fn new(api_key: &str, publication_id: &str) -> Result<Self, DeliveryError> {
        if api_key.trim().is_empty() || publication_id.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "BEEHIIV_API_KEY and BEEHIIV_PUBLICATION_ID are required".into(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: DEFAULT_BASE.to_string(),
            api_key: api_key.to_string(),
            publication_id: publication_id.to_string(),
        })
    }

    /// `None` when either variable is unset.
    pub fn from_env() -> Option<Result<Self, DeliveryError>> {
        let key = std::env::var("BEEHIIV_API_KEY").ok()?;
        let publication = std::env::var("BEEHIIV_PUBLICATION_ID").ok()?;
        Some(Self::new(&key, &publication))
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn body(post: &BroadcastPost) -> serde_json::Value {
        let mut body = serde_json::json!({
            "title": post.title,
            "status": "confirmed",
            "body_content": post.html,
            "scheduled_at": post.scheduled_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "email_settings": { "email_subject_line": post.email_subject },
            "web_settings": { "hide_from_feed": true, "display_thumbnail_on_web": false },
        });
        if !post.segment_ids.is_empty() {
            let segs: Vec<String> = post.segment_ids.iter().map(|s| segment_id(s)).collect();
            body["recipients"] = serde_json::json!({
                "email": { "include_segment_ids": segs },
                "web": { "include_segment_ids": segs },
            });
        }
        body
    }
}

#[async_trait::async_trait]
impl BroadcastClient for BeehiivClient {
    async fn create_post(&self, post: &BroadcastPost) -> Result<String, DeliveryError> {
        let url = format!("{}/publications/{}/posts", self.base, self.publication_id);
        let rsp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(post))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        let created: CreatedPost = rsp
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(created.data.id)
    }
}
