// src/gateway/http.rs
use std::time::Duration;

use metrics::counter;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::{RawWeather, SearchRequest, Throttle, Upstream};
use crate::config::GatewayConfig;
use crate::error::UpstreamError;

const SEARCH: &str = "search";
const WEATHER: &str = "weather";
const EVENTS: &str = "eventbrite";

/// Upstream credentials. Absent keys surface as `UpstreamError::Configuration` on use.
#[derive(Debug, Clone, Default)]
pub struct UpstreamKeys {
    pub search: Option<String>,
    pub weather: Option<String>,
    pub events: Option<String>,
}

impl UpstreamKeys {
    pub fn from_env() -> Self {
        fn non_empty(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            search: non_empty("SERPAPI_KEY"),
            weather: non_empty("OPENWEATHERMAP_KEY"),
            events: non_empty("EVENTBRITE_API_KEY"),
        }
    }
}

pub struct HttpGateway {
    http: Client,
    cfg: GatewayConfig,
    keys: UpstreamKeys,
    timeout: Duration,
    retry_delay: Duration,
    throttle: Throttle,
}

impl HttpGateway {
    pub fn new(cfg: GatewayConfig, keys: UpstreamKeys) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("city-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            timeout: Duration::from_secs(cfg.timeout_secs),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            throttle: Throttle::new(Duration::from_millis(cfg.search_delay_ms)),
            cfg,
            keys,
        })
    }

    /// Override the per-request timeout (sub-second values are handy in tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn key<'a>(key: &'a Option<String>, upstream: &'static str) -> Result<&'a str, UpstreamError> {
        key.as_deref().ok_or(UpstreamError::Configuration(upstream))
    }

    /// Send with bounded retries. Only timeouts and connection failures are retried;
    /// any HTTP status outside 2xx is returned at once.
    async fn get_json<F>(&self, upstream: &'static str, build: F) -> Result<Value, UpstreamError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("upstream_requests_total", "upstream" => upstream).increment(1);

            match build().timeout(self.timeout).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if !status.is_success() {
                        tracing::warn!(upstream, status = status.as_u16(), "upstream rejected request");
                        return Err(UpstreamError::Rejected {
                            upstream,
                            status: status.as_u16(),
                        });
                    }
                    return rsp.json::<Value>().await.map_err(|e| UpstreamError::Decode {
                        upstream,
                        message: e.to_string(),
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt <= self.cfg.max_retries {
                        counter!("upstream_retries_total", "upstream" => upstream).increment(1);
                        tracing::warn!(upstream, attempt, error = %e, "transient upstream failure, retrying");
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    return Err(UpstreamError::Transient {
                        upstream,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(UpstreamError::Request {
                        upstream,
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Upstream for HttpGateway {
    async fn search(&self, req: &SearchRequest) -> Result<Value, UpstreamError> {
        let key = Self::key(&self.keys.search, "SerpAPI")?;

        let mut params: Vec<(&str, String)> = vec![
            ("engine", req.engine.as_str().to_string()),
            ("q", req.query.clone()),
            ("api_key", key.to_string()),
            ("hl", self.cfg.language.clone()),
            ("gl", self.cfg.country.clone()),
        ];
        if let Some(n) = req.num {
            params.push(("num", n.to_string()));
        }
        if let Some(loc) = &req.location {
            params.push(("location", loc.clone()));
        }

        self.throttle.wait().await;
        tracing::debug!(engine = req.engine.as_str(), query = %req.query, "search request");
        self.get_json(SEARCH, || self.http.get(&self.cfg.search_base_url).query(&params))
            .await
    }

    async fn weather(&self, city: &str) -> Result<RawWeather, UpstreamError> {
        let key = Self::key(&self.keys.weather, "OpenWeatherMap")?;
        let base = self.cfg.weather_base_url.trim_end_matches('/');
        let params = [
            ("q", city.to_string()),
            ("appid", key.to_string()),
            ("units", self.cfg.units.clone()),
            ("lang", self.cfg.language.clone()),
        ];
        let current_url = format!("{base}/weather");
        let forecast_url = format!("{base}/forecast");

        let (current, forecast) = tokio::try_join!(
            self.get_json(WEATHER, || self.http.get(&current_url).query(&params)),
            self.get_json(WEATHER, || self.http.get(&forecast_url).query(&params)),
        )?;
        Ok(RawWeather { current, forecast })
    }

    async fn secondary_events(&self, city: &str) -> Result<Value, UpstreamError> {
        let key = Self::key(&self.keys.events, "Eventbrite")?;
        let url = format!(
            "{}/events/search/",
            self.cfg.events_base_url.trim_end_matches('/')
        );
        let params = [
            ("location.address", city.to_string()),
            ("expand", "venue".to_string()),
        ];
        self.get_json(EVENTS, || {
            self.http.get(&url).bearer_auth(key).query(&params)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
