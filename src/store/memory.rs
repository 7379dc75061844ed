// src/store/memory.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{NaiveDate, Utc};

use super::{CacheStore, CityRegistry, SubscriberRegistry};
use crate::error::StoreError;
use crate::types::{CacheEntry, City, DataType, Subscriber};

/// Process-local store. Rows are kept as a plain list so duplicate live rows would
/// be observable; `put` removes and inserts under one lock.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<CacheEntry>>,
    cities: RwLock<Vec<City>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cities(cities: Vec<City>) -> Self {
        Self {
            cities: RwLock::new(cities),
            ..Self::default()
        }
    }

    /// Number of rows stored for one key (test/diagnostic helper).
    pub fn row_count(&self, city: &str, date: NaiveDate, kind: DataType) -> usize {
        self.rows
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.city == city && r.date == date && r.kind == kind)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn add_city(&self, city: City) -> Result<(), StoreError> {
        let mut cities = self.cities.write().map_err(poisoned)?;
        cities.retain(|c| c.slug != city.slug);
        cities.push(city);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(
        &self,
        city: &str,
        date: NaiveDate,
        kind: DataType,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows
            .iter()
            .rev()
            .find(|r| r.city == city && r.date == date && r.kind == kind)
            .cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        rows.retain(|r| !(r.city == entry.city && r.date == entry.date && r.kind == entry.kind));
        rows.push(entry);
        Ok(())
    }

    async fn clear(&self, city: Option<&str>, kind: Option<DataType>) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let before = rows.len();
        rows.retain(|r| {
            let city_hit = city.map_or(true, |c| r.city == c);
            let kind_hit = kind.map_or(true, |k| r.kind == k);
            !(city_hit && kind_hit)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn entries_for(&self, city: &str, date: NaiveDate) -> Result<Vec<CacheEntry>, StoreError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows
            .iter()
            .filter(|r| r.city == city && r.date == date)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl CityRegistry for MemoryStore {
    async fn list_active(&self) -> Result<Vec<City>, StoreError> {
        let cities = self.cities.read().map_err(poisoned)?;
        Ok(cities.iter().filter(|c| c.is_active).cloned().collect())
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<City>, StoreError> {
        let cities = self.cities.read().map_err(poisoned)?;
        Ok(cities.iter().find(|c| c.slug == slug).cloned())
    }
}

#[async_trait::async_trait]
impl SubscriberRegistry for MemoryStore {
    async fn subscribe(&self, email: &str, city: &str) -> Result<Subscriber, StoreError> {
        let mut subs = self.subscribers.lock().map_err(poisoned)?;
        let email = email.trim().to_lowercase();
        if let Some(existing) = subs.iter().find(|s| s.email == email && s.city == city) {
            return Ok(existing.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let sub = Subscriber {
            id: format!("sub-{id}"),
            email,
            city: city.to_string(),
            created_at: Utc::now(),
        };
        subs.push(sub.clone());
        Ok(sub)
    }

    async fn list_by_city(&self, city: &str) -> Result<Vec<Subscriber>, StoreError> {
        let subs = self.subscribers.lock().map_err(poisoned)?;
        Ok(subs.iter().filter(|s| s.city == city).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.subscribers.lock().map_err(poisoned)?.clone())
    }

    async fn delete_by_id(&self, id: &str) -> Result<u64, StoreError> {
        let mut subs = self.subscribers.lock().map_err(poisoned)?;
        let before = subs.len();
        subs.retain(|s| s.id != id);
        Ok((before - subs.len()) as u64)
    }

    async fn delete_by_city(&self, city: &str) -> Result<u64, StoreError> {
        let mut subs = self.subscribers.lock().map_err(poisoned)?;
        let before = subs.len();
        subs.retain(|s| s.city != city);
        Ok((before - subs.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut subs = self.subscribers.lock().map_err(poisoned)?;
        let n = subs.len() as u64;
        subs.clear();
        Ok(n)
    }
}
