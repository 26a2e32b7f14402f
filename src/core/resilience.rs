//! Retry with backoff, a read-through response cache and a sliding-window
//! rate limiter for calls into external services.
//!
//! [`Resilience`] is constructed once at startup and shared; both maps are
//! behind mutexes so it can be used from every worker.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use tokio::time::{sleep, timeout, Instant};

use crate::error::Error;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RateLimit {
    pub key: String,
    pub limit: usize,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSpec {
    pub key: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit: Option<RateLimit>,
    pub cache: Option<CacheSpec>,
    pub timeout: Option<Duration>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            rate_limit: None,
            cache: None,
            timeout: None,
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn rate_limit(mut self, key: impl Into<String>, limit: usize, window: Duration) -> Self {
        self.rate_limit = Some(RateLimit {
            key: key.into(),
            limit,
            window,
        });
        self
    }

    pub fn cache(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(CacheSpec { key: key.into(), ttl });
        self
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CacheEntry {
    value: Box<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// TTL cache keyed by operation and argument. Values of any cloneable type
/// can be stored; a lookup with the wrong type is a miss.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = lock(&self.entries);
        let expired = entries.get(key)?.expires_at <= Instant::now();
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).and_then(|e| e.value.downcast_ref::<T>()).cloned()
    }

    pub fn put<T: Clone + Send + Sync + 'static>(&self, key: impl Into<String>, value: T, ttl: Duration) {
        lock(&self.entries).insert(
            key.into(),
            CacheEntry {
                value: Box::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        lock(&self.entries).retain(|k, _| !k.starts_with(prefix));
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Sliding-window request counter. A call is only recorded when it is
/// admitted.
#[derive(Default)]
pub struct RateLimiter {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut hits = lock(&self.hits);
        let recent = hits.entry(key.to_owned()).or_default();
        while let Some(first) = recent.front() {
            if now.duration_since(*first) >= window {
                recent.pop_front();
            } else {
                break;
            }
        }
        if recent.len() < limit {
            recent.push_back(now);
            return true;
        }
        false
    }

    pub fn clear(&self) {
        lock(&self.hits).clear();
    }
}

#[derive(Default)]
pub struct Resilience {
    cache: ResponseCache,
    limiter: RateLimiter,
    timeout: Option<Duration>,
}

impl Resilience {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `timeout` to every attempt that does not set its own.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn clear(&self) {
        self.cache.clear();
        self.limiter.clear();
    }

    /// Runs `operation` under `options`.
    ///
    /// A live cache entry is returned without calling `operation`. The rate
    /// limiter only refuses a call when it is saturated and the call is
    /// cacheable; otherwise it just logs. Only [`Error::is_rate_limited`]
    /// failures are retried, sleeping with doubling, jittered delays.
    pub async fn run<T, F, Fut>(&self, options: &RetryOptions, mut operation: F) -> Result<T, Error>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if let Some(spec) = &options.cache {
            if let Some(hit) = self.cache.get::<T>(&spec.key) {
                debug!("cache hit for {}", spec.key);
                return Ok(hit);
            }
        }
        if let Some(rl) = &options.rate_limit {
            if !self.limiter.check(&rl.key, rl.limit, rl.window) {
                warn!("rate limit exceeded for {}", rl.key);
                if options.cache.is_some() {
                    return Err(Error::RateLimitExceeded);
                }
            }
        }
        let mut delay = options.initial_delay;
        let mut attempt = 0;
        loop {
            let result = match options.timeout.or(self.timeout) {
                Some(limit) => timeout(limit, operation()).await.unwrap_or_else(|_| Err(Error::Timeout)),
                None => operation().await,
            };
            match result {
                Ok(value) => {
                    if let Some(spec) = &options.cache {
                        self.cache.put(spec.key.clone(), value.clone(), spec.ttl);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_rate_limited() && attempt < options.retries => {
                    attempt += 1;
                    let wait = jitter(delay);
                    warn!("rate limit hit on attempt {}/{}, retrying in {:?}", attempt, options.retries + 1, wait);
                    sleep(wait).await;
                    delay = (delay * 2).min(options.max_delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    delay.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    fn ten_seconds() -> Duration {
        Duration::from_secs(10)
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let res = Resilience::new();
        let calls = Cell::new(0);
        let out = res
            .run(&RetryOptions::new().retries(3), || {
                calls.set(calls.get() + 1);
                async { Err::<u32, _>(Error::NotFound("poll".into())) }
            })
            .await;
        assert!(matches!(out, Err(Error::NotFound(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_errors_exhaust_retries() {
        let res = Resilience::new();
        let calls = Cell::new(0);
        let out = res
            .run(&RetryOptions::new().retries(2), || {
                calls.set(calls.get() + 1);
                async { Err::<u32, _>(Error::TooManyRequests) }
            })
            .await;
        assert!(matches!(out, Err(Error::TooManyRequests)));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_with_jitter() {
        let res = Resilience::new();
        let started = Instant::now();
        let _ = res
            .run(&RetryOptions::new().retries(2), || async { Err::<u32, _>(Error::TooManyRequests) })
            .await;
        // 500ms then 1000ms, each within 20%
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1200), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1800), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let res = Resilience::new();
        let started = Instant::now();
        let opts = RetryOptions::new().retries(3).delays(Duration::from_millis(500), Duration::from_millis(600));
        let _ = res.run(&opts, || async { Err::<u32, _>(Error::TooManyRequests) }).await;
        // 500 + 600 + 600, each within 20%
        assert!(started.elapsed() <= Duration::from_millis(2040));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let res = Resilience::new();
        let calls = Cell::new(0);
        let out = res
            .run(&RetryOptions::new().retries(3), || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(Error::TooManyRequests)
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), 99);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_short_circuits() {
        let res = Resilience::new();
        res.cache().put("poll_1", 7u32, ten_seconds());
        let calls = Cell::new(0);
        let out = res
            .run(&RetryOptions::new().cache("poll_1", ten_seconds()), || {
                calls.set(calls.get() + 1);
                async { Ok(1u32) }
            })
            .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_populates_cache_until_ttl() {
        let res = Resilience::new();
        let opts = RetryOptions::new().cache("votes_1", Duration::from_secs(30));
        let calls = Cell::new(0);
        for _ in 0..3 {
            let out = res
                .run(&opts, || {
                    calls.set(calls.get() + 1);
                    async { Ok(vec![1u32, 2]) }
                })
                .await;
            assert_eq!(out.unwrap(), vec![1, 2]);
        }
        assert_eq!(calls.get(), 1);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(res.cache().get::<Vec<u32>>("votes_1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let res = Resilience::new();
        let opts = RetryOptions::new().retries(0).cache("poll_2", ten_seconds());
        let _ = res.run(&opts, || async { Err::<u32, _>(Error::NotFound("poll".into())) }).await;
        assert!(res.cache().get::<u32>("poll_2").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_limiter_refuses_uncached_cacheable_call() {
        let res = Resilience::new();
        let calls = Cell::new(0);
        let opts = RetryOptions::new().rate_limit("getPoll_1", 2, ten_seconds()).cache("poll_1", ten_seconds());
        for _ in 0..2 {
            res.cache().invalidate("poll_1");
            res.run(&opts, || {
                calls.set(calls.get() + 1);
                async { Ok(1u32) }
            })
            .await
            .unwrap();
        }
        res.cache().invalidate("poll_1");
        let out = res
            .run(&opts, || {
                calls.set(calls.get() + 1);
                async { Ok(1u32) }
            })
            .await;
        assert!(matches!(out, Err(Error::RateLimitExceeded)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_limiter_is_advisory_without_cache() {
        let res = Resilience::new();
        let opts = RetryOptions::new().rate_limit("addVote", 1, ten_seconds());
        assert!(res.run(&opts, || async { Ok(1u32) }).await.is_ok());
        assert!(res.run(&opts, || async { Ok(2u32) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_window_slides() {
        let limiter = RateLimiter::default();
        assert!(limiter.check("k", 2, ten_seconds()));
        assert!(limiter.check("k", 2, ten_seconds()));
        assert!(!limiter.check("k", 2, ten_seconds()));
        assert!(limiter.check("other", 2, ten_seconds()));
        tokio::time::advance(ten_seconds()).await;
        assert!(limiter.check("k", 2, ten_seconds()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let res = Resilience::new();
        let calls = Cell::new(0);
        let opts = RetryOptions::new().timeout(Some(Duration::from_secs(1)));
        let out = res
            .run(&opts, || {
                calls.set(calls.get() + 1);
                async {
                    sleep(Duration::from_secs(5)).await;
                    Ok(1u32)
                }
            })
            .await;
        assert!(matches!(out, Err(Error::Timeout)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies() {
        let res = Resilience::with_timeout(Duration::from_millis(100));
        let out = res
            .run(&RetryOptions::new(), || async {
                sleep(Duration::from_secs(1)).await;
                Ok(1u32)
            })
            .await;
        assert!(matches!(out, Err(Error::Timeout)));
    }

    #[test]
    fn test_cache_type_mismatch_is_a_miss() {
        let cache = ResponseCache::default();
        cache.put("k", 1u32, ten_seconds());
        assert!(cache.get::<String>("k").is_none());
        assert_eq!(cache.get::<u32>("k"), Some(1));
        cache.invalidate_prefix("k");
        assert!(cache.get::<u32>("k").is_none());
    }
}
