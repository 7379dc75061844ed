// tests/dispatch_quorum.rs
//
// Dispatch over cached editions:
// - an incomplete edition triggers exactly one repair collection, which
//   refetches missing sections even when they are cached empty
// - still incomplete after repair: every recipient fails, nothing is sent
// - complete editions go out in batches; one bad address does not stop the rest
// - broadcast mode schedules one post per active city with a publication id

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;

use city_digest::config::DispatchMode;
use city_digest::dispatch::{BroadcastClient, BroadcastPost};
use city_digest::error::DeliveryError;
use city_digest::notify::NotifierMux;
use city_digest::store::{CacheStore, MemoryStore, Stores, SubscriberRegistry};
use city_digest::types::City;
use city_digest::{CacheEntry, DataType, Parts, Services};
use common::{day, harness, harness_with, test_config, FakeMailer, FakeUpstream};

fn weather_entry(city: &str) -> CacheEntry {
    CacheEntry::new(
        city,
        day(),
        DataType::Weather,
        json!({
            "date": "2026-10-19", "condition": "Clear sky", "high": 81, "low": 62,
            "windDirection": "S", "windMin": 8, "windMax": 13, "unit": "F"
        }),
    )
}

fn brief_entry(city: &str) -> CacheEntry {
    CacheEntry::new(
        city,
        day(),
        DataType::Brief,
        json!({ "brief": [{ "title": "Library launches free coding classes" }] }),
    )
}

#[tokio::test]
async fn unmet_quorum_repairs_once_then_fails_every_recipient() {
    let upstream = FakeUpstream::new();
    upstream.fail(DataType::Events);
    upstream.fail(DataType::Sports);
    let h = harness_with(test_config(), upstream, FakeMailer::default());
    assert_eq!(h.services.dispatcher.quorum().max_missing, 1);

    let cache = &h.services.stores.cache;
    cache.put(weather_entry("Austin")).await.unwrap();
    cache.put(brief_entry("Austin")).await.unwrap();
    let subs = &h.services.stores.subscribers;
    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        subs.subscribe(email, "Austin").await.unwrap();
    }

    let out = h
        .services
        .dispatcher
        .send_for_city("austin", day())
        .await
        .expect("registry readable");

    assert_eq!(out.recipients, 3);
    assert_eq!(out.failed, 3);
    assert_eq!(out.sent, 0);
    assert!(out.repaired);
    let reason = out.skipped.expect("city skipped");
    assert!(reason.contains("events") && reason.contains("sports"), "{reason}");
    assert!(h.mailer.recipients().is_empty(), "no mail for an incomplete edition");

    // One repair: events tried once on each engine, sports once, weather reused.
    assert_eq!(h.upstream.calls(DataType::Events), 2);
    assert_eq!(h.upstream.calls(DataType::Sports), 1);
    assert_eq!(h.upstream.calls(DataType::Weather), 0);
}

#[tokio::test]
async fn repair_that_fills_the_gaps_lets_the_city_through() {
    let h = harness();
    h.services.stores.cache.put(weather_entry("Austin")).await.unwrap();
    h.services
        .stores
        .subscribers
        .subscribe("a@example.com", "Austin")
        .await
        .unwrap();

    let out = h.services.dispatcher.send_for_city("Austin", day()).await.unwrap();
    assert!(out.skipped.is_none());
    assert!(out.repaired);
    assert_eq!(out.sent, 1);
    assert_eq!(h.upstream.calls(DataType::Weather), 0);

    let sent = h.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent[0].subject, "Your daily digest: Austin, Monday, October 19");
    assert!(sent[0].html.contains("Jazz on the Green"));
    assert!(sent[0].text.contains("Riverside park reopens"));
}

#[tokio::test]
async fn repair_refetches_sections_cached_empty() {
    let h = harness();
    let cache = &h.services.stores.cache;
    cache.put(weather_entry("Austin")).await.unwrap();
    cache.put(brief_entry("Austin")).await.unwrap();
    cache
        .put(CacheEntry::new("Austin", day(), DataType::News, json!([])))
        .await
        .unwrap();
    cache
        .put(CacheEntry::new("Austin", day(), DataType::Events, json!([])))
        .await
        .unwrap();
    cache
        .put(CacheEntry::new(
            "Austin",
            day(),
            DataType::Sports,
            json!({ "sports": [], "upcomingMatches": {}, "summary": "", "matches": [], "readMoreLink": "" }),
        ))
        .await
        .unwrap();
    h.services
        .stores
        .subscribers
        .subscribe("a@example.com", "Austin")
        .await
        .unwrap();

    let out = h.services.dispatcher.send_for_city("Austin", day()).await.unwrap();
    assert!(out.skipped.is_none(), "{:?}", out.skipped);
    assert!(out.repaired);
    assert_eq!(out.sent, 1);

    // Only the two empty sections go upstream again.
    assert_eq!(h.upstream.calls(DataType::Events), 1);
    assert_eq!(h.upstream.calls(DataType::Sports), 1);
    assert_eq!(h.upstream.calls(DataType::Weather), 0);
    assert_eq!(h.upstream.calls(DataType::News), 0);
    assert_eq!(h.store.row_count("Austin", day(), DataType::Events), 1);
    assert_eq!(h.store.row_count("Austin", day(), DataType::Sports), 1);

    let ed = h.services.dispatcher.load_edition("Austin", day()).await.unwrap();
    assert!(ed.has(DataType::Events) && ed.has(DataType::Sports));
}

#[tokio::test]
async fn sufficient_edition_is_sent_in_batches() {
    let mut cfg = test_config();
    cfg.dispatch.batch_size = 2;
    let h = harness_with(
        cfg,
        FakeUpstream::new(),
        FakeMailer::rejecting(&["bounce@example.com"]),
    );
    h.services
        .aggregator
        .collect_and_cache("Austin", day())
        .await
        .unwrap();
    let calls = h.upstream.total_calls();

    let subs = &h.services.stores.subscribers;
    for email in [
        "a@example.com",
        "b@example.com",
        "bounce@example.com",
        "d@example.com",
        "e@example.com",
    ] {
        subs.subscribe(email, "Austin").await.unwrap();
    }

    let out = h.services.dispatcher.send_for_city("Austin", day()).await.unwrap();
    assert_eq!(out.recipients, 5);
    assert_eq!(out.sent, 4);
    assert_eq!(out.failed, 1);
    assert!(!out.repaired);
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].starts_with("bounce@example.com"));
    assert_eq!(h.upstream.total_calls(), calls, "complete edition needs no repair");

    let mut got = h.mailer.recipients();
    got.sort();
    assert_eq!(
        got,
        vec!["a@example.com", "b@example.com", "d@example.com", "e@example.com"]
    );
}

#[tokio::test]
async fn daily_dispatch_groups_subscribers_by_city() {
    let h = harness();
    let subs = &h.services.stores.subscribers;
    subs.subscribe("a@example.com", "Austin").await.unwrap();
    subs.subscribe("b@example.com", "Austin").await.unwrap();
    subs.subscribe("c@example.com", "Denver").await.unwrap();

    let summary = h
        .services
        .dispatcher
        .run_daily_dispatch(day())
        .await
        .completed()
        .unwrap();
    assert_eq!(summary.mode, Some(DispatchMode::Mail));
    assert_eq!(summary.total_recipients, 3);
    assert_eq!(summary.sent, 3);
    assert_eq!(summary.cities_processed, 2);
    assert_eq!(summary.cities_skipped, 0);
    assert!(h.services.dispatcher.last_summary().is_some());
}

#[derive(Default)]
struct RecordingBroadcaster {
    posts: Mutex<Vec<BroadcastPost>>,
}

#[async_trait::async_trait]
impl BroadcastClient for RecordingBroadcaster {
    async fn create_post(&self, post: &BroadcastPost) -> Result<String, DeliveryError> {
        let mut posts = self.posts.lock().unwrap();
        posts.push(post.clone());
        Ok(format!("post_{}", posts.len()))
    }
}

#[tokio::test]
async fn broadcast_mode_posts_once_per_active_city() {
    let mut cfg = test_config();
    cfg.dispatch.mode = DispatchMode::Broadcast;

    let store = Arc::new(MemoryStore::with_cities(vec![
        City {
            slug: "austin".into(),
            display_name: "Austin".into(),
            is_active: true,
            publication_id: Some("seg_austin".into()),
            state_name: Some("Texas".into()),
        },
        City {
            slug: "houston".into(),
            display_name: "Houston".into(),
            is_active: true,
            publication_id: None,
            state_name: Some("Texas".into()),
        },
        City {
            slug: "denver".into(),
            display_name: "Denver".into(),
            is_active: false,
            publication_id: None,
            state_name: None,
        },
    ]));
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let upstream = Arc::new(FakeUpstream::new());
    let services = Services::assemble(
        cfg,
        Parts {
            stores: Stores::from_one(store.clone()),
            upstream: upstream.clone(),
            notifier: NotifierMux::new(),
            mailer: None,
            broadcaster: Some(broadcaster.clone()),
        },
    )
    .unwrap();

    let summary = services
        .dispatcher
        .run_daily_dispatch(day())
        .await
        .completed()
        .unwrap();
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.cities_processed, 1);
    // Without a segment the post would reach the whole publication.
    assert_eq!(summary.cities_skipped, 1);
    assert!(summary.errors.iter().any(|e| e == "Houston: no publication id"));

    let posts = broadcaster.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].segment_ids, vec!["seg_austin".to_string()]);
    assert!(posts[0].email_subject.contains("Austin"));
    assert!(posts[0].scheduled_at > chrono::Utc::now());
}
