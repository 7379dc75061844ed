// src/store/supabase.rs
//! Hosted store over PostgREST. Tables: `city_data`, `cities`, `users`.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CacheStore, CityRegistry, SubscriberRegistry};
use crate::error::StoreError;
use crate::types::{CacheEntry, City, DataType, Subscriber};

const CACHE_TABLE: &str = "city_data";
const CITY_TABLE: &str = "cities";
const USER_TABLE: &str = "users";

pub struct SupabaseStore {
    http: Client,
    base: String,
    key: String,
    upsert: bool,
}

#[derive(Debug, Deserialize)]
struct CityRow {
    city_slug: String,
    city_name: String,
    #[serde(default = "yes")]
    is_active: bool,
    #[serde(default)]
    beehiiv_publication_id: Option<String>,
    #[serde(default)]
    state_name: Option<String>,
}

fn yes() -> bool {
    true
}

impl From<CityRow> for City {
    fn from(r: CityRow) -> Self {
        City {
            slug: r.city_slug,
            display_name: r.city_name,
            is_active: r.is_active,
            publication_id: r.beehiiv_publication_id,
            state_name: r.state_name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    #[serde(default, skip_serializing)]
    id: Option<serde_json::Value>,
    email: String,
    city: String,
    #[serde(default, skip_serializing)]
    created_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for Subscriber {
    fn from(r: UserRow) -> Self {
        let id = match r.id {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Subscriber {
            id,
            email: r.email,
            city: r.city,
            created_at: r.created_at.unwrap_or_else(Utc::now),
        }
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl SupabaseStore {
    pub fn new(base_url: &str, key: &str, upsert: bool) -> Result<Self, StoreError> {
        if base_url.trim().is_empty() || key.trim().is_empty() {
            return Err(StoreError::Configuration(
                "SUPABASE_URL and SUPABASE_ANON_KEY are required".into(),
            ));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(backend)?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            key: key.to_string(),
            upsert,
        })
    }

    pub fn from_env(upsert: bool) -> Result<Self, StoreError> {
        let url = std::env::var("SUPABASE_URL").unwrap_or_default();
        let key = std::env::var("SUPABASE_ANON_KEY").unwrap_or_default();
        Self::new(&url, &key, upsert)
    }

    fn req(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{table}", self.base))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn ok(rsp: Result<Response, reqwest::Error>) -> Result<Response, StoreError> {
        let rsp = rsp.map_err(backend)?;
        let status = rsp.status();
        if status.is_success() {
            return Ok(rsp);
        }
        let body = rsp.text().await.unwrap_or_default();
        Err(StoreError::Backend(format!(
            "status {}: {}",
            status.as_u16(),
            body.chars().take(200).collect::<String>()
        )))
    }

    /// DELETE with `Prefer: return=representation`, counting returned rows.
    async fn delete_counting(&self, table: &str, filters: &[(&str, String)]) -> Result<u64, StoreError> {
        let rsp = Self::ok(
            self.req(reqwest::Method::DELETE, table)
                .header("Prefer", "return=representation")
                .query(filters)
                .send()
                .await,
        )
        .await?;
        let rows: Vec<serde_json::Value> = rsp.json().await.map_err(backend)?;
        Ok(rows.len() as u64)
    }

    fn key_filters(city: &str, date: NaiveDate, kind: DataType) -> Vec<(&'static str, String)> {
        vec![
            ("city", format!("eq.{city}")),
            ("date", format!("eq.{date}")),
            ("type", format!("eq.{}", kind.as_str())),
        ]
    }
}

#[async_trait::async_trait]
impl CacheStore for SupabaseStore {
    async fn get(
        &self,
        city: &str,
        date: NaiveDate,
        kind: DataType,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let mut q = Self::key_filters(city, date, kind);
        q.push(("select", "*".into()));
        q.push(("order", "created_at.desc".into()));
        q.push(("limit", "1".into()));
        let rsp = Self::ok(self.req(reqwest::Method::GET, CACHE_TABLE).query(&q).send().await).await?;
        let mut rows: Vec<CacheEntry> = rsp.json().await.map_err(backend)?;
        Ok(rows.pop())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError> {
        if self.upsert {
            Self::ok(
                self.req(reqwest::Method::POST, CACHE_TABLE)
                    .query(&[("on_conflict", "city,date,type")])
                    .header("Prefer", "resolution=merge-duplicates")
                    .json(&entry)
                    .send()
                    .await,
            )
            .await?;
            return Ok(());
        }
        // Not atomic: a crash in between leaves a miss, never a duplicate.
        let filters = Self::key_filters(&entry.city, entry.date, entry.kind);
        Self::ok(
            self.req(reqwest::Method::DELETE, CACHE_TABLE)
                .query(&filters)
                .send()
                .await,
        )
        .await?;
        Self::ok(
            self.req(reqwest::Method::POST, CACHE_TABLE)
                .json(&entry)
                .send()
                .await,
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, city: Option<&str>, kind: Option<DataType>) -> Result<u64, StoreError> {
        let mut filters: Vec<(&str, String)> = Vec::new();
        if let Some(c) = city {
            filters.push(("city", format!("eq.{c}")));
        }
        if let Some(k) = kind {
            filters.push(("type", format!("eq.{}", k.as_str())));
        }
        if filters.is_empty() {
            // PostgREST refuses unfiltered deletes.
            filters.push(("city", "not.is.null".into()));
        }
        self.delete_counting(CACHE_TABLE, &filters).await
    }

    async fn entries_for(&self, city: &str, date: NaiveDate) -> Result<Vec<CacheEntry>, StoreError> {
        let q = [
            ("city", format!("eq.{city}")),
            ("date", format!("eq.{date}")),
            ("select", "*".to_string()),
        ];
        let rsp = Self::ok(self.req(reqwest::Method::GET, CACHE_TABLE).query(&q).send().await).await?;
        rsp.json().await.map_err(backend)
    }
}

#[async_trait::async_trait]
impl CityRegistry for SupabaseStore {
    async fn list_active(&self) -> Result<Vec<City>, StoreError> {
        let q = [("is_active", "eq.true"), ("select", "*"), ("order", "city_name.asc")];
        let rsp = Self::ok(self.req(reqwest::Method::GET, CITY_TABLE).query(&q).send().await).await?;
        let rows: Vec<CityRow> = rsp.json().await.map_err(backend)?;
        Ok(rows.into_iter().map(City::from).collect())
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<City>, StoreError> {
        let q = [("city_slug", format!("eq.{slug}")), ("select", "*".into())];
        let rsp = Self::ok(self.req(reqwest::Method::GET, CITY_TABLE).query(&q).send().await).await?;
        let rows: Vec<CityRow> = rsp.json().await.map_err(backend)?;
        Ok(rows.into_iter().next().map(City::from))
    }
}

#[async_trait::async_trait]
impl SubscriberRegistry for SupabaseStore {
    async fn subscribe(&self, email: &str, city: &str) -> Result<Subscriber, StoreError> {
        let email = email.trim().to_lowercase();
        let q = [
            ("email", format!("eq.{email}")),
            ("city", format!("eq.{city}")),
            ("select", "*".into()),
        ];
        let rsp = Self::ok(self.req(reqwest::Method::GET, USER_TABLE).query(&q).send().await).await?;
        let existing: Vec<UserRow> = rsp.json().await.map_err(backend)?;
        if let Some(row) = existing.into_iter().next() {
            return Ok(row.into());
        }

        let row = UserRow {
            id: None,
            email,
            city: city.to_string(),
            created_at: None,
        };
        let rsp = Self::ok(
            self.req(reqwest::Method::POST, USER_TABLE)
                .header("Prefer", "return=representation")
                .json(&row)
                .send()
                .await,
        )
        .await?;
        let mut created: Vec<UserRow> = rsp.json().await.map_err(backend)?;
        created
            .pop()
            .map(Subscriber::from)
            .ok_or_else(|| StoreError::Backend("insert returned no row".into()))
    }

    async fn list_by_city(&self, city: &str) -> Result<Vec<Subscriber>, StoreError> {
        let q = [("city", format!("eq.{city}")), ("select", "*".into())];
        let rsp = Self::ok(self.req(reqwest::Method::GET, USER_TABLE).query(&q).send().await).await?;
        let rows: Vec<UserRow> = rsp.json().await.map_err(backend)?;
        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        let q = [("select", "*"), ("order", "created_at.asc")];
        let rsp = Self::ok(self.req(reqwest::Method::GET, USER_TABLE).query(&q).send().await).await?;
        let rows: Vec<UserRow> = rsp.json().await.map_err(backend)?;
        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    async fn delete_by_id(&self, id: &str) -> Result<u64, StoreError> {
        self.delete_counting(USER_TABLE, &[("id", format!("eq.{id}"))]).await
    }

    async fn delete_by_city(&self, city: &str) -> Result<u64, StoreError> {
        self.delete_counting(USER_TABLE, &[("city", format!("eq.{city}"))]).await
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        self.delete_counting(USER_TABLE, &[("email", "not.is.null".into())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_is_a_configuration_error() {
        assert!(matches!(
            SupabaseStore::new("", "", false),
            Err(StoreError::Configuration(_))
        ));
        let s = SupabaseStore::new("https://p.supabase.co/", "anon", true).unwrap();
        assert_eq!(s.base, "https://p.supabase.co/rest/v1");
    }

    #[test]
    fn city_rows_map_to_cities() {
        let row: CityRow = serde_json::from_value(serde_json::json!({
            "city_slug": "austin", "city_name": "Austin", "beehiiv_publication_id": "pub_1"
        }))
        .unwrap();
        let c = City::from(row);
        assert!(c.is_active);
        assert_eq!(c.publication_id.as_deref(), Some("pub_1"));
    }
}
