// src/app.rs
//! Wiring shared by the server and the operator CLI.

use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;

use crate::api::AppState;
use crate::classify::build_classifier;
use crate::config::{AppConfig, DispatchMode};
use crate::dispatch::{BeehiivClient, BroadcastClient, Dispatcher, MailSender, SmtpMailer};
use crate::fleet::FleetCollector;
use crate::gateway::{HttpGateway, Upstream, UpstreamKeys};
use crate::normalize::Normalizer;
use crate::notify::NotifierMux;
use crate::pipeline::Aggregator;
use crate::scheduler::spawn_daily;
use crate::store::Stores;

/// Collaborators that differ between production and tests.
pub struct Parts {
    pub stores: Stores,
    pub upstream: Arc<dyn Upstream>,
    pub notifier: NotifierMux,
    pub mailer: Option<Arc<dyn MailSender>>,
    pub broadcaster: Option<Arc<dyn BroadcastClient>>,
}

pub struct Services {
    pub config: AppConfig,
    pub stores: Stores,
    pub aggregator: Arc<Aggregator>,
    pub fleet: Arc<FleetCollector>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Services {
    /// Production wiring: configured store, HTTP gateway, env-configured channels.
    pub fn from_env(config: AppConfig) -> anyhow::Result<Self> {
        let stores = Stores::from_config(&config.store)?;
        let upstream: Arc<dyn Upstream> = Arc::new(HttpGateway::new(
            config.gateway.clone(),
            UpstreamKeys::from_env(),
        )?);

        let mailer: Option<Arc<dyn MailSender>> = match SmtpMailer::from_env()? {
            Some(m) => Some(Arc::new(m)),
            None => {
                if config.dispatch.mode == DispatchMode::Mail {
                    tracing::warn!("SMTP_HOST not set; newsletter mail will fail per recipient");
                }
                None
            }
        };
        let broadcaster: Option<Arc<dyn BroadcastClient>> = match BeehiivClient::from_env() {
            Some(client) => Some(Arc::new(client?)),
            None => None,
        };

        Self::assemble(
            config,
            Parts {
                stores,
                upstream,
                notifier: NotifierMux::from_env(),
                mailer,
                broadcaster,
            },
        )
    }

    pub fn assemble(config: AppConfig, parts: Parts) -> anyhow::Result<Self> {
        let classifier = build_classifier(&config.classifier)?;
        tracing::info!(classifier = classifier.name(), "classifier ready");
        let normalizer = Arc::new(Normalizer::new(
            classifier,
            config.normalizer.clone(),
            config.classifier.concurrency,
        ));
        let aggregator = Arc::new(
            Aggregator::new(parts.upstream, normalizer, parts.stores.cache.clone())
                .with_max_age_hours(config.pipeline.cache_max_age_hours)
                .with_units(config.gateway.units.clone()),
        );

        let notifier = Arc::new(parts.notifier);
        let fleet = Arc::new(FleetCollector::new(
            aggregator.clone(),
            parts.stores.cities.clone(),
            parts.stores.subscribers.clone(),
            notifier.clone(),
        ));

        let mut dispatcher = Dispatcher::new(
            aggregator.clone(),
            parts.stores.subscribers.clone(),
            parts.stores.cities.clone(),
            notifier,
            config.dispatch.clone(),
        );
        if let Some(m) = parts.mailer {
            dispatcher = dispatcher.with_mailer(m);
        }
        if let Some(b) = parts.broadcaster {
            dispatcher = dispatcher.with_broadcaster(b);
        }

        Ok(Self {
            config,
            stores: parts.stores,
            aggregator,
            fleet,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn api_state(&self) -> AppState {
        AppState {
            fleet: self.fleet.clone(),
            dispatcher: self.dispatcher.clone(),
            stores: self.stores.clone(),
            collection_day_offset: self.config.schedule.collection_day_offset,
        }
    }

    /// Start the daily collection and dispatch loops. Empty when disabled.
    pub fn spawn_schedules(&self) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let sched = &self.config.schedule;
        if !sched.enabled {
            tracing::info!(target: "scheduler", "schedules disabled");
            return Ok(Vec::new());
        }

        let fleet = self.fleet.clone();
        let offset = sched.collection_day_offset;
        let collect = spawn_daily("collection", sched.collection_time()?, move |fired| {
            let fleet = fleet.clone();
            async move {
                let date = fired.date_naive() + Duration::days(offset);
                fleet.run_daily_collection(date).await;
            }
        });

        let dispatcher = self.dispatcher.clone();
        let dispatch = spawn_daily("dispatch", sched.dispatch_time()?, move |fired| {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher.run_daily_dispatch(fired.date_naive()).await;
            }
        });

        Ok(vec![collect, dispatch])
    }
}
