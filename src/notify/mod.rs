// src/notify/mod.rs
//! Admin notifications for the scheduled jobs. Every channel is optional and a
//! failing channel never fails the job that triggered it.

pub mod discord;
pub mod email;
pub mod slack;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use slack::SlackNotifier;

/// Errors listed in a completion message.
pub const MAX_LISTED_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DataCollection,
    EmailSending,
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::DataCollection => "Data collection",
            JobKind::EmailSending => "Email sending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminEvent {
    pub job: JobKind,
    pub status: JobStatus,
    /// Free-form `key: value` lines.
    pub details: Vec<(String, String)>,
    pub errors: Vec<String>,
    pub ts: DateTime<Utc>,
}

impl AdminEvent {
    pub fn started(job: JobKind) -> Self {
        Self {
            job,
            status: JobStatus::Started,
            details: Vec::new(),
            errors: Vec::new(),
            ts: Utc::now(),
        }
    }

    pub fn completed(job: JobKind) -> Self {
        Self {
            status: JobStatus::Completed,
            ..Self::started(job)
        }
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.push((key.to_string(), value.to_string()));
        self
    }

    /// Keeps the first few errors and notes how many were dropped.
    pub fn errors(mut self, errors: &[String]) -> Self {
        self.errors = errors.iter().take(MAX_LISTED_ERRORS).cloned().collect();
        if errors.len() > MAX_LISTED_ERRORS {
            self.errors
                .push(format!("... and {} more", errors.len() - MAX_LISTED_ERRORS));
        }
        self
    }

    pub fn title(&self) -> String {
        let status = match self.status {
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
        };
        format!("{} {}", self.job.label(), status)
    }

    /// Plain-text body shared by every channel.
    pub fn body(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.details {
            out.push_str(&format!("{k}: {v}\n"));
        }
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for e in &self.errors {
                out.push_str(&format!("- {e}\n"));
            }
        }
        out.push_str(&format!("Time (UTC): {}", self.ts.to_rfc3339()));
        out
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AdminEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fans one event out to every configured channel.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, n: impl Notifier + 'static) -> Self {
        self.channels.push(Box::new(n));
        self
    }

    /// Channels whose env vars are present: SLACK_WEBHOOK_URL, DISCORD_WEBHOOK_URL,
    /// and the SMTP_* / NOTIFY_EMAIL_TO set.
    pub fn from_env() -> Self {
        let mut mux = Self::new();
        if let Some(s) = SlackNotifier::from_env() {
            mux = mux.with(s);
        }
        if let Some(d) = DiscordNotifier::from_env() {
            mux = mux.with(d);
        }
        match EmailSender::from_env() {
            Ok(Some(e)) => mux = mux.with(e),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "admin email disabled"),
        }
        tracing::info!(channels = mux.channels.len(), "admin notifier ready");
        mux
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Never fails; channel errors are logged.
    pub async fn notify(&self, ev: &AdminEvent) {
        for ch in &self.channels {
            if let Err(e) = ch.send(ev).await {
                tracing::warn!(channel = ch.name(), error = %e, "admin notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Failing;

    #[async_trait::async_trait]
    impl Notifier for Failing {
        async fn send(&self, _ev: &AdminEvent) -> Result<()> {
            anyhow::bail!("boom")
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Notifier for Counting {
        async fn send(&self, _ev: &AdminEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn error_list_is_capped() {
        let errs: Vec<String> = (0..8).map(|i| format!("city {i}")).collect();
        let ev = AdminEvent::completed(JobKind::DataCollection)
            .detail("Cities", 8)
            .errors(&errs);
        assert_eq!(ev.errors.len(), MAX_LISTED_ERRORS + 1);
        assert_eq!(ev.errors.last().unwrap(), "... and 3 more");
        assert_eq!(ev.title(), "Data collection completed");
        assert!(ev.body().starts_with("Cities: 8\nErrors:\n- city 0"));
    }

    #[tokio::test]
    async fn failing_channel_does_not_stop_the_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mux = NotifierMux::new()
            .with(Failing)
            .with(Counting(hits.clone()));
        mux.notify(&AdminEvent::started(JobKind::EmailSending)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
