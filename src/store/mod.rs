// src/store/mod.rs
//! Storage collaborators: the per-(city, date, type) cache, the city registry and
//! the subscriber registry. Two backends: in-process memory and a hosted
//! PostgREST (Supabase) database.

pub mod memory;
pub mod seed;
pub mod supabase;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::types::{CacheEntry, City, DataType, Subscriber};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(
        &self,
        city: &str,
        date: NaiveDate,
        kind: DataType,
    ) -> Result<Option<CacheEntry>, StoreError>;

    /// Replace the live row for the entry's key. Afterwards exactly one row exists.
    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Delete by city and/or type; `None` is a wildcard. Returns rows removed.
    async fn clear(&self, city: Option<&str>, kind: Option<DataType>) -> Result<u64, StoreError>;

    /// Every live row for one city and day.
    async fn entries_for(&self, city: &str, date: NaiveDate) -> Result<Vec<CacheEntry>, StoreError>;
}

#[async_trait::async_trait]
pub trait CityRegistry: Send + Sync {
    async fn list_active(&self) -> Result<Vec<City>, StoreError>;
    async fn by_slug(&self, slug: &str) -> Result<Option<City>, StoreError>;
}

#[async_trait::async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Idempotent per (email, city).
    async fn subscribe(&self, email: &str, city: &str) -> Result<Subscriber, StoreError>;
    async fn list_by_city(&self, city: &str) -> Result<Vec<Subscriber>, StoreError>;
    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError>;
    async fn delete_by_id(&self, id: &str) -> Result<u64, StoreError>;
    async fn delete_by_city(&self, city: &str) -> Result<u64, StoreError>;
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Distinct subscriber cities, in first-seen order.
    async fn cities(&self) -> Result<Vec<String>, StoreError> {
        let mut out: Vec<String> = Vec::new();
        for s in self.list_all().await? {
            if !out.contains(&s.city) {
                out.push(s.city);
            }
        }
        Ok(out)
    }
}

/// All three collaborators, shared.
#[derive(Clone)]
pub struct Stores {
    pub cache: Arc<dyn CacheStore>,
    pub cities: Arc<dyn CityRegistry>,
    pub subscribers: Arc<dyn SubscriberRegistry>,
}

impl Stores {
    pub fn from_one<S>(store: Arc<S>) -> Self
    where
        S: CacheStore + CityRegistry + SubscriberRegistry + 'static,
    {
        Self {
            cache: store.clone(),
            cities: store.clone(),
            subscribers: store,
        }
    }

    /// Build the configured backend. Memory seeds its city registry from `cities_path`.
    pub fn from_config(cfg: &StoreConfig) -> anyhow::Result<Self> {
        match cfg.backend {
            StoreBackend::Memory => {
                let cities = seed::load_cities_default(&cfg.cities_path)?;
                tracing::info!(cities = cities.len(), "using in-memory store");
                Ok(Self::from_one(Arc::new(MemoryStore::with_cities(cities))))
            }
            StoreBackend::Supabase => {
                let store = SupabaseStore::from_env(cfg.upsert)?;
                tracing::info!(upsert = cfg.upsert, "using supabase store");
                Ok(Self::from_one(Arc::new(store)))
            }
        }
    }
}
