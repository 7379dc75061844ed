// tests/fleet_single_flight.rs
//
// The daily jobs are single-flight: a trigger while a run is in progress is
// ignored and leaves the running job's counts untouched.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use city_digest::scheduler::JobOutcome;
use city_digest::store::SubscriberRegistry;
use city_digest::DataType;
use common::{day, harness, harness_with, test_config, FakeMailer, FakeUpstream};

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn overlapping_collection_trigger_is_ignored() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        test_config(),
        FakeUpstream::gated(gate.clone()),
        FakeMailer::default(),
    );
    let subs = &h.services.stores.subscribers;
    subs.subscribe("a@example.com", "Austin").await.unwrap();
    subs.subscribe("b@example.com", "Denver").await.unwrap();

    let fleet = h.services.fleet.clone();
    let first = tokio::spawn(async move { fleet.run_daily_collection(day()).await });

    // Wait until the first run is parked inside upstream calls.
    let upstream = h.upstream.clone();
    wait_until(|| upstream.calls(DataType::Weather) == 2).await;
    assert!(h.services.fleet.is_running());

    let second = h.services.fleet.run_daily_collection(day()).await;
    assert!(matches!(second, JobOutcome::AlreadyRunning));
    assert!(h.services.fleet.is_running(), "ignored trigger must not release the guard");

    gate.add_permits(1_000);
    let summary = first
        .await
        .expect("join")
        .completed()
        .expect("first run completes");
    assert_eq!(summary.cities, 2);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 0);
    // Exactly one run's worth of upstream traffic.
    assert_eq!(h.upstream.calls(DataType::Weather), 2);

    assert!(!h.services.fleet.is_running());
    let last = h.services.fleet.last_summary().expect("summary recorded");
    assert_eq!(last.successful, 2);
}

#[tokio::test]
async fn guard_is_released_between_runs() {
    let h = common::harness();
    h.services
        .stores
        .subscribers
        .subscribe("a@example.com", "Austin")
        .await
        .unwrap();

    let first = h.services.fleet.run_daily_collection(day()).await;
    assert!(first.completed().is_some());
    let second = h.services.fleet.run_daily_collection(day()).await;
    let summary = second.completed().expect("sequential runs both proceed");
    assert_eq!(summary.successful, 1);
    // Second run was a pure cache hit.
    assert_eq!(h.upstream.calls(DataType::Weather), 1);
}

#[tokio::test]
async fn overlapping_dispatch_trigger_is_ignored() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        test_config(),
        FakeUpstream::gated(gate.clone()),
        FakeMailer::default(),
    );
    h.services
        .stores
        .subscribers
        .subscribe("a@example.com", "Austin")
        .await
        .unwrap();

    // Nothing cached: dispatch parks inside its repair collection.
    let dispatcher = h.services.dispatcher.clone();
    let first = tokio::spawn(async move { dispatcher.run_daily_dispatch(day()).await });
    let upstream = h.upstream.clone();
    wait_until(|| upstream.calls(DataType::Weather) == 1).await;

    let second = h.services.dispatcher.run_daily_dispatch(day()).await;
    assert!(matches!(second, JobOutcome::AlreadyRunning));

    gate.add_permits(1_000);
    let summary = first.await.unwrap().completed().unwrap();
    assert_eq!(summary.total_recipients, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(h.mailer.recipients(), vec!["a@example.com".to_string()]);
}

fn assert_send<T: Send>(_: T) {}

// Jobs are handed to tokio::spawn and JoinSet, which require Send futures.
#[tokio::test]
async fn job_futures_are_send() {
    let h = harness();
    assert_send(h.services.aggregator.collect_and_cache("Austin", day()));
    assert_send(h.services.fleet.run_daily_collection(day()));
    assert_send(h.services.dispatcher.send_for_city("Austin", day()));
    assert_send(h.services.dispatcher.run_daily_dispatch(day()));
}
