//! Keeps a displayed value fresh: periodic refresh, at most one fetch in
//! flight, last-known-good data served through failures.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::models::poll::PollWithVotes;
use crate::error::Error;

/// Shape check applied to a fetched value before it replaces the current one.
pub trait WellFormed {
    fn is_well_formed(&self) -> bool;
}

impl WellFormed for PollWithVotes {
    fn is_well_formed(&self) -> bool {
        !self.id.is_nil()
    }
}

impl<T: WellFormed> WellFormed for Vec<T> {
    fn is_well_formed(&self) -> bool {
        self.iter().all(WellFormed::is_well_formed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    KeptMalformed,
    Failed,
    Skipped,
}

struct State<T> {
    last_good: Option<T>,
    error: Option<String>,
}

pub struct Refresher<T> {
    state: Mutex<State<T>>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> Default for Refresher<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State { last_good: None, error: None }),
            in_flight: AtomicBool::new(false),
        }
    }
}

impl<T: Clone + WellFormed> Refresher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<T> {
        self.state().last_good.clone()
    }

    /// Set only when nothing has ever loaded successfully.
    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stores a value obtained outside the refresh cycle, e.g. the poll
    /// returned by a vote.
    pub fn replace(&self, value: T) {
        let mut state = self.state();
        state.last_good = Some(value);
        state.error = None;
    }

    pub async fn refresh<F, Fut>(&self, fetch: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("refresh skipped, a fetch is already in flight");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);
        match fetch().await {
            Ok(value) if value.is_well_formed() => {
                self.replace(value);
                RefreshOutcome::Updated
            }
            Ok(_) => {
                warn!("refresh returned malformed data, keeping last known good value");
                RefreshOutcome::KeptMalformed
            }
            Err(e) => {
                let mut state = self.state();
                if state.last_good.is_none() {
                    state.error = Some(e.to_string());
                }
                warn!("refresh failed: {}", e);
                RefreshOutcome::Failed
            }
        }
    }
}

/// Handle of a periodic refresh. Dropping it stops the schedule.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn stop(self) {}
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Refreshes immediately, then every `period`, on the current actix runtime.
pub fn spawn_refresh<T, F, Fut>(refresher: Arc<Refresher<T>>, period: Duration, mut fetch: F) -> RefreshTask
where
    T: Clone + WellFormed + 'static,
    F: FnMut() -> Fut + 'static,
    Fut: Future<Output = Result<T, Error>> + 'static,
{
    let handle = actix_web::rt::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            refresher.refresh(&mut fetch).await;
        }
    });
    RefreshTask { handle }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::models::poll::PollOption;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn poll(id: Uuid) -> PollWithVotes {
        PollWithVotes {
            id,
            title: "Weekend".into(),
            question: "Hike or beach?".into(),
            description: String::new(),
            options: vec![PollOption::new("Hike"), PollOption::new("Beach")],
            created_at: Utc::now(),
            ends_at: Utc::now(),
            secret_voting: false,
            is_active: true,
            created_by: Uuid::new_v4(),
            creator_name: String::new(),
            creator_avatar: String::new(),
            image_url: None,
            votes: vec![],
            is_private: false,
        }
    }

    #[tokio::test]
    async fn test_first_load_failure_is_visible() {
        let r: Refresher<Vec<PollWithVotes>> = Refresher::new();
        let out = r.refresh(|| async { Err(Error::TooManyRequests) }).await;
        assert_eq!(out, RefreshOutcome::Failed);
        assert!(r.current().is_none());
        assert!(r.error().is_some());
    }

    #[tokio::test]
    async fn test_later_failures_keep_last_good() {
        let r = Refresher::new();
        let first = vec![poll(Uuid::new_v4())];
        let loaded = first.clone();
        assert_eq!(r.refresh(|| async move { Ok(loaded) }).await, RefreshOutcome::Updated);
        assert_eq!(r.refresh(|| async { Err(Error::Timeout) }).await, RefreshOutcome::Failed);
        assert_eq!(r.current(), Some(first));
        assert!(r.error().is_none());
    }

    #[tokio::test]
    async fn test_malformed_data_is_ignored() {
        let r = Refresher::new();
        let good = poll(Uuid::new_v4());
        r.replace(good.clone());
        let out = r.refresh(|| async { Ok(poll(Uuid::nil())) }).await;
        assert_eq!(out, RefreshOutcome::KeptMalformed);
        assert_eq!(r.current(), Some(good));
    }

    #[tokio::test]
    async fn test_success_clears_first_load_error() {
        let r = Refresher::new();
        r.refresh(|| async { Err(Error::Timeout) }).await;
        assert!(r.error().is_some());
        r.refresh(|| async { Ok(poll(Uuid::new_v4())) }).await;
        assert!(r.error().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_skipped() {
        let r = Refresher::new();
        let slow = r.refresh(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(poll(Uuid::new_v4()))
        });
        let fast = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(r.is_in_flight());
            r.refresh(|| async { Ok(poll(Uuid::new_v4())) }).await
        };
        let (a, b) = tokio::join!(slow, fast);
        assert_eq!(a, RefreshOutcome::Updated);
        assert_eq!(b, RefreshOutcome::Skipped);
        assert!(!r.is_in_flight());
    }

    #[actix_web::test]
    async fn test_periodic_refresh_stops_on_drop() {
        let refresher = Arc::new(Refresher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = spawn_refresh(refresher.clone(), Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(poll(Uuid::new_v4())) }
        });
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(refresher.current().is_some());

        task.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopped_at = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), stopped_at);
    }
}
