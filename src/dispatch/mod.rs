// src/dispatch/mod.rs
//! Dispatch pipeline: read a city's cached edition, check it is complete enough,
//! then mail it to the city's subscribers in paced batches (or hand it to the
//! broadcast provider).

pub mod broadcast;
pub mod mail;
pub mod render;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde::Serialize;

use crate::config::{DispatchConfig, DispatchMode};
use crate::error::{DeliveryError, StoreError};
use crate::notify::{AdminEvent, JobKind, NotifierMux};
use crate::pipeline::Aggregator;
use crate::scheduler::{JobOutcome, SingleFlight};
use crate::store::{CityRegistry, SubscriberRegistry};
use crate::types::{
    normalize_city_name, Brief, CacheEntry, DataType, EventItem, NewsItem, SportsDigest,
    Subscriber, WeatherSnapshot,
};

pub use broadcast::{BeehiivClient, BroadcastClient, BroadcastPost};
pub use mail::{MailSender, OutgoingMail, SmtpMailer};

/// One city's cached content for one day, decoded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Edition {
    pub city: String,
    pub date: Option<NaiveDate>,
    pub weather: Option<WeatherSnapshot>,
    pub brief: Option<Brief>,
    pub news: Option<Vec<NewsItem>>,
    pub events: Option<Vec<EventItem>>,
    pub sports: Option<SportsDigest>,
}

impl Edition {
    /// Unreadable payloads are dropped and count as missing.
    pub fn from_entries(city: &str, date: NaiveDate, entries: &[CacheEntry]) -> Self {
        let mut ed = Edition {
            city: city.to_string(),
            date: Some(date),
            ..Edition::default()
        };
        for e in entries {
            let res = match e.kind {
                DataType::Weather => e.decode().map(|v| ed.weather = Some(v)),
                DataType::Brief => e.decode().map(|v| ed.brief = Some(v)),
                DataType::News => e.decode().map(|v| ed.news = Some(v)),
                DataType::Events => e.decode().map(|v| ed.events = Some(v)),
                DataType::Sports => e.decode().map(|v| ed.sports = Some(v)),
            };
            if let Err(err) = res {
                tracing::warn!(target: "dispatch", city, kind = %e.kind, error = %err, "cached payload unreadable");
            }
        }
        ed
    }

    /// Present means usable in a newsletter, not merely cached.
    pub fn has(&self, kind: DataType) -> bool {
        match kind {
            DataType::Weather => self.weather.is_some(),
            DataType::Brief => self.brief.as_ref().is_some_and(|b| !b.brief.is_empty()),
            DataType::News => self.news.as_ref().is_some_and(|n| !n.is_empty()),
            DataType::Events => self.events.as_ref().is_some_and(|e| !e.is_empty()),
            DataType::Sports => self.sports.as_ref().is_some_and(|s| s.has_content()),
        }
    }
}

/// Quorum over the four newsletter sections.
#[derive(Debug, Clone, Copy)]
pub struct QuorumPolicy {
    pub max_missing: usize,
}

impl QuorumPolicy {
    pub const SECTIONS: [DataType; 4] = [
        DataType::Weather,
        DataType::Brief,
        DataType::Events,
        DataType::Sports,
    ];

    pub fn new(max_missing: usize) -> Self {
        Self { max_missing }
    }

    pub fn missing(&self, ed: &Edition) -> Vec<DataType> {
        Self::SECTIONS
            .into_iter()
            .filter(|k| !ed.has(*k))
            .collect()
    }

    pub fn is_sufficient(&self, ed: &Edition) -> bool {
        self.missing(ed).len() <= self.max_missing
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CityDispatch {
    pub city: String,
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
    /// Set when the city was skipped for lack of content.
    pub skipped: Option<String>,
    /// A collection run was triggered to fill gaps.
    pub repaired: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub date: Option<NaiveDate>,
    pub mode: Option<DispatchMode>,
    pub total_recipients: usize,
    pub sent: usize,
    pub failed: usize,
    pub cities_processed: usize,
    pub cities_skipped: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatchSummary {
    fn absorb(&mut self, c: &CityDispatch) {
        self.total_recipients += c.recipients;
        self.sent += c.sent;
        self.failed += c.failed;
        if c.skipped.is_some() {
            self.cities_skipped += 1;
        } else {
            self.cities_processed += 1;
        }
        self.errors.extend(c.errors.iter().cloned());
    }
}

/// Quorum still unmet after the repair attempt.
#[derive(Debug)]
struct Insufficient {
    missing: Vec<DataType>,
}

impl Insufficient {
    fn describe(&self) -> String {
        let names: Vec<&str> = self.missing.iter().map(|k| k.as_str()).collect();
        format!("insufficient data, missing {}", names.join(", "))
    }
}

pub struct Dispatcher {
    aggregator: Arc<Aggregator>,
    subscribers: Arc<dyn SubscriberRegistry>,
    cities: Arc<dyn CityRegistry>,
    mailer: Option<Arc<dyn MailSender>>,
    broadcaster: Option<Arc<dyn BroadcastClient>>,
    notifier: Arc<NotifierMux>,
    cfg: DispatchConfig,
    quorum: QuorumPolicy,
    flight: SingleFlight,
    last: Mutex<Option<DispatchSummary>>,
}

impl Dispatcher {
    pub fn new(
        aggregator: Arc<Aggregator>,
        subscribers: Arc<dyn SubscriberRegistry>,
        cities: Arc<dyn CityRegistry>,
        notifier: Arc<NotifierMux>,
        cfg: DispatchConfig,
    ) -> Self {
        let quorum = QuorumPolicy::new(cfg.max_missing_categories);
        Self {
            aggregator,
            subscribers,
            cities,
            mailer: None,
            broadcaster: None,
            notifier,
            cfg,
            quorum,
            flight: SingleFlight::new(),
            last: Mutex::new(None),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn MailSender>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_broadcaster(mut self, b: Arc<dyn BroadcastClient>) -> Self {
        self.broadcaster = Some(b);
        self
    }

    pub fn quorum(&self) -> QuorumPolicy {
        self.quorum
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn last_summary(&self) -> Option<DispatchSummary> {
        self.last.lock().ok().and_then(|g| g.clone())
    }

    pub async fn load_edition(&self, city: &str, date: NaiveDate) -> Result<Edition, StoreError> {
        let entries = self.aggregator.cache().entries_for(city, date).await?;
        Ok(Edition::from_entries(city, date, &entries))
    }

    /// Edition for the city, with exactly one collection attempt if the quorum
    /// is not met at first. That attempt refetches the missing sections even
    /// when they are cached empty. The flag reports whether it was made.
    async fn sufficient_edition(
        &self,
        city: &str,
        date: NaiveDate,
    ) -> Result<(Edition, bool), Insufficient> {
        let edition = self.read_or_empty(city, date).await;
        let missing = self.quorum.missing(&edition);
        if missing.len() <= self.quorum.max_missing {
            return Ok((edition, false));
        }

        let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        tracing::warn!(target: "dispatch", city, missing = ?names, "edition incomplete, collecting once");
        counter!("dispatch_repairs_total").increment(1);
        if let Err(e) = self.aggregator.refresh(city, date, &missing).await {
            tracing::warn!(target: "dispatch", city, error = %e, "repair collection failed");
        }

        let edition = self.read_or_empty(city, date).await;
        let missing = self.quorum.missing(&edition);
        if missing.len() <= self.quorum.max_missing {
            Ok((edition, true))
        } else {
            Err(Insufficient { missing })
        }
    }

    async fn read_or_empty(&self, city: &str, date: NaiveDate) -> Edition {
        self.load_edition(city, date).await.unwrap_or_else(|e| {
            tracing::warn!(target: "dispatch", city, error = %e, "cache read failed");
            Edition {
                city: city.to_string(),
                date: Some(date),
                ..Edition::default()
            }
        })
    }

    /// Mail the city's edition to its subscribers.
    pub async fn send_for_city(&self, city: &str, date: NaiveDate) -> Result<CityDispatch, StoreError> {
        let city = normalize_city_name(city);
        let recipients = self.subscribers.list_by_city(&city).await?;
        Ok(self.send_to(&city, date, &recipients).await)
    }

    async fn send_to(&self, city: &str, date: NaiveDate, recipients: &[Subscriber]) -> CityDispatch {
        let mut out = CityDispatch {
            city: city.to_string(),
            recipients: recipients.len(),
            ..CityDispatch::default()
        };
        if recipients.is_empty() {
            return out;
        }

        let edition = match self.sufficient_edition(city, date).await {
            Ok((ed, repaired)) => {
                out.repaired = repaired;
                ed
            }
            Err(insufficient) => {
                let reason = insufficient.describe();
                tracing::warn!(target: "dispatch", city, recipients = recipients.len(), reason = %reason, "skipping city");
                counter!("dispatch_emails_failed_total").increment(recipients.len() as u64);
                out.failed = recipients.len();
                out.repaired = true;
                out.errors.push(format!("{city}: {reason}"));
                out.skipped = Some(reason);
                return out;
            }
        };

        let mail = OutgoingMail {
            to: String::new(),
            subject: render::subject(&self.cfg.subject_prefix, city, date),
            html: render::render_html(&edition),
            text: render::render_text(&edition),
        };

        let batch_size = self.cfg.batch_size.max(1);
        for (i, batch) in recipients.chunks(batch_size).enumerate() {
            if i > 0 && self.cfg.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.batch_delay_ms)).await;
            }
            let sends = batch.iter().map(|s| {
                let mail = OutgoingMail {
                    to: s.email.clone(),
                    ..mail.clone()
                };
                async move { (s, self.deliver(&mail).await) }
            });
            for (sub, res) in futures::future::join_all(sends).await {
                match res {
                    Ok(()) => {
                        out.sent += 1;
                        counter!("dispatch_emails_sent_total").increment(1);
                    }
                    Err(e) => {
                        out.failed += 1;
                        counter!("dispatch_emails_failed_total").increment(1);
                        tracing::warn!(target: "dispatch", city, email = %sub.email, error = %e, "send failed");
                        out.errors.push(format!("{}: {e}", sub.email));
                    }
                }
            }
        }

        tracing::info!(target: "dispatch", city, sent = out.sent, failed = out.failed, "city dispatched");
        out
    }

    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        match &self.mailer {
            Some(m) => m.send(mail).await,
            None => Err(DeliveryError::Configuration("no mail transport".into())),
        }
    }

    /// The guarded daily job. Mail mode walks subscribers grouped by city;
    /// broadcast mode schedules one post per active city.
    pub async fn run_daily_dispatch(&self, date: NaiveDate) -> JobOutcome<DispatchSummary> {
        let Some(_guard) = self.flight.try_start() else {
            tracing::warn!(target: "dispatch", %date, "dispatch already running, ignoring trigger");
            return JobOutcome::AlreadyRunning;
        };
        let started = Instant::now();
        self.notifier
            .notify(
                &AdminEvent::started(JobKind::EmailSending)
                    .detail("Date", date)
                    .detail("Mode", format!("{:?}", self.cfg.mode).to_lowercase()),
            )
            .await;

        let mut summary = match self.cfg.mode {
            DispatchMode::Mail => self.mail_all(date).await,
            DispatchMode::Broadcast => self.broadcast_all(date).await,
        };
        summary.date = Some(date);
        summary.mode = Some(self.cfg.mode);
        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary.finished_at = Some(Utc::now());

        tracing::info!(
            target: "dispatch",
            %date,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.cities_skipped,
            "dispatch done"
        );
        self.notifier
            .notify(
                &AdminEvent::completed(JobKind::EmailSending)
                    .detail("Recipients", summary.total_recipients)
                    .detail("Sent", summary.sent)
                    .detail("Failed", summary.failed)
                    .detail("Cities skipped", summary.cities_skipped)
                    .detail("Duration", format!("{:.1}s", summary.duration_ms as f64 / 1000.0))
                    .errors(&summary.errors),
            )
            .await;

        if let Ok(mut last) = self.last.lock() {
            *last = Some(summary.clone());
        }
        JobOutcome::Completed(summary)
    }

    async fn mail_all(&self, date: NaiveDate) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let subscribers = match self.subscribers.list_all().await {
            Ok(s) => s,
            Err(e) => {
                summary.errors.push(format!("subscriber registry: {e}"));
                return summary;
            }
        };

        let mut by_city: BTreeMap<String, Vec<Subscriber>> = BTreeMap::new();
        for s in subscribers {
            by_city
                .entry(normalize_city_name(&s.city))
                .or_default()
                .push(s);
        }
        tracing::info!(target: "dispatch", cities = by_city.len(), "mailing subscribers");

        for (city, recipients) in &by_city {
            let c = self.send_to(city, date, recipients).await;
            summary.absorb(&c);
        }
        summary
    }

    async fn broadcast_all(&self, date: NaiveDate) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let Some(client) = self.broadcaster.clone() else {
            summary.errors.push("broadcast provider is not configured".into());
            return summary;
        };
        let cities = match self.cities.list_active().await {
            Ok(c) => c,
            Err(e) => {
                summary.errors.push(format!("city registry: {e}"));
                return summary;
            }
        };

        let scheduled_at = Utc::now() + chrono::Duration::minutes(self.cfg.broadcast_lead_minutes);
        for (i, city) in cities.iter().enumerate() {
            if i > 0 && self.cfg.broadcast_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.broadcast_delay_ms)).await;
            }
            let name = normalize_city_name(&city.display_name);
            // An empty segment list would address the whole publication.
            let Some(segment) = city.publication_id.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
                tracing::error!(target: "dispatch", city = %name, "no publication id, broadcast skipped");
                summary.cities_skipped += 1;
                summary.errors.push(format!("{name}: no publication id"));
                continue;
            };
            let edition = match self.sufficient_edition(&name, date).await {
                Ok((ed, _)) => ed,
                Err(insufficient) => {
                    summary.cities_skipped += 1;
                    summary.errors.push(format!("{name}: {}", insufficient.describe()));
                    continue;
                }
            };

            let subject = render::subject(&self.cfg.subject_prefix, &name, date);
            let post = BroadcastPost {
                title: subject.clone(),
                email_subject: subject,
                html: render::render_html(&edition),
                segment_ids: vec![segment.to_string()],
                scheduled_at,
            };
            match client.create_post(&post).await {
                Ok(id) => {
                    summary.cities_processed += 1;
                    summary.sent += 1;
                    tracing::info!(target: "dispatch", city = %name, post = %id, at = %scheduled_at, "broadcast scheduled");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(target: "dispatch", city = %name, error = %e, "broadcast failed");
                    summary.errors.push(format!("{name}: {e}"));
                }
            }
        }
        summary
    }
}
