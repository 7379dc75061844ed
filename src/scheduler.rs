// src/scheduler.rs
//! Daily triggers and the process-wide single-flight guards that keep two runs
//! of the same job from overlapping.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;

/// At most one holder at a time. Scoped to this process only.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Releases the flag on drop, including on panic or early return.
#[must_use = "the job is only guarded while the guard is alive"]
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if a run is already in flight.
    pub fn try_start(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Result of asking a guarded job to run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "summary", rename_all = "snake_case")]
pub enum JobOutcome<T> {
    Completed(T),
    AlreadyRunning,
}

impl<T> JobOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            JobOutcome::Completed(t) => Some(t),
            JobOutcome::AlreadyRunning => None,
        }
    }
}

/// Next instant strictly after `now` whose UTC wall clock reads `at`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Run `job` every day at `at` (UTC). `job` receives the fire time.
pub fn spawn_daily<F, Fut>(name: &'static str, at: NaiveTime, job: F) -> JoinHandle<()>
where
    F: Fn(DateTime<Utc>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let fire = next_fire(now, at);
            let wait = (fire - now).to_std().unwrap_or_default();
            tracing::info!(target: "scheduler", job = name, next = %fire, "scheduled");
            tokio::time::sleep(wait).await;

            counter!("scheduler_ticks_total", "job" => name).increment(1);
            tracing::info!(target: "scheduler", job = name, "firing");
            job(fire).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn single_flight_rejects_overlap_and_resets_on_drop() {
        let sf = SingleFlight::new();
        let g = sf.try_start().expect("first run starts");
        assert!(sf.is_running());
        assert!(sf.try_start().is_none());
        drop(g);
        assert!(!sf.is_running());
        assert!(sf.try_start().is_some());
    }

    #[test]
    fn guard_is_released_when_the_holder_panics() {
        let sf = SingleFlight::new();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = sf.try_start().unwrap();
            panic!("job blew up");
        }));
        assert!(r.is_err());
        assert!(!sf.is_running());
    }

    #[test]
    fn next_fire_rolls_to_tomorrow_once_passed() {
        let at = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(
            next_fire(morning, at),
            Utc.with_ymd_and_hms(2026, 10, 18, 16, 0, 0).unwrap()
        );
        let exactly = Utc.with_ymd_and_hms(2026, 10, 18, 16, 0, 0).unwrap();
        assert_eq!(
            next_fire(exactly, at),
            Utc.with_ymd_and_hms(2026, 10, 19, 16, 0, 0).unwrap()
        );
    }
}
