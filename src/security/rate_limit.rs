//! Per-client rate limiting with idle eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::RateLimitConfig;
use crate::http::response;
use crate::observability::metrics;
use crate::security::headers::client_key;
use crate::security::token_bucket::TokenBucket;

/// Rate state for one caller.
#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Registry of token buckets keyed by caller identity.
///
/// One mutex covers both per-entry read-modify-write and map insertion or
/// eviction. Nothing that blocks runs while it is held.
#[derive(Debug)]
pub struct ClientLimiterRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    enabled: bool,
    capacity: f64,
    refill_rate: f64,
    sweep_interval: Duration,
    idle_timeout: Duration,
    trust_proxy_headers: bool,
}

impl ClientLimiterRegistry {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            enabled: config.enabled,
            capacity: f64::from(config.burst),
            refill_rate: config.requests_per_second,
            sweep_interval: config.sweep_interval(),
            idle_timeout: config.idle_timeout(),
            trust_proxy_headers: config.trust_proxy_headers,
        }
    }

    // Every mutation under the lock is a plain assignment, so a poisoned
    // map is still consistent.
    fn clients(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn trusts_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    /// Decide whether `key` may make a request now.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub(crate) fn allow_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.clients();
        let entry = clients
            .entry(key.to_owned())
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::new(self.capacity, self.refill_rate, now),
                last_seen: now,
            });

        entry.last_seen = now;
        entry.bucket.try_acquire(now)
    }

    /// Drop every client idle for longer than the idle timeout.
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_timeout);
        let remaining = clients.len();
        drop(clients);

        metrics::set_tracked_clients(remaining);
        before - remaining
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.clients().contains_key(key)
    }

    /// Start the periodic idle sweep.
    ///
    /// The task holds only a weak reference and exits once the registry
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };

                let removed = registry.evict_idle();
                if removed > 0 {
                    tracing::debug!(removed, tracked = registry.len(), "Evicted idle clients");
                }
            }

            tracing::debug!("Rate limiter sweeper stopped");
        })
    }
}

/// Middleware admitting or rejecting each request by client key.
pub async fn rate_limit_middleware(
    State(registry): State<Arc<ClientLimiterRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    if !registry.is_enabled() {
        return next.run(request).await;
    }

    let key = match client_key(&request, registry.trusts_proxy_headers()) {
        Ok(key) => key,
        Err(e) => return response::server_error(&e),
    };

    if registry.allow(&key) {
        next.run(request).await
    } else {
        tracing::debug!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        response::rate_limit_exceeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(rps: f64, burst: u32) -> ClientLimiterRegistry {
        ClientLimiterRegistry::new(&RateLimitConfig {
            requests_per_second: rps,
            burst,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn burst_then_deny() {
        let limiter = registry(2.0, 4);
        let t0 = Instant::now();

        for _ in 0..4 {
            assert!(limiter.allow_at("client", t0));
        }
        assert!(!limiter.allow_at("client", t0));
    }

    #[test]
    fn one_token_after_half_second() {
        let limiter = registry(2.0, 4);
        let t0 = Instant::now();
        for _ in 0..4 {
            limiter.allow_at("client", t0);
        }
        assert!(!limiter.allow_at("client", t0));

        let t1 = t0 + Duration::from_millis(500);
        assert!(limiter.allow_at("client", t1));
        assert!(!limiter.allow_at("client", t1));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = registry(1.0, 1);
        let t0 = Instant::now();

        assert!(limiter.allow_at("a", t0));
        assert!(!limiter.allow_at("a", t0));
        assert!(limiter.allow_at("b", t0));
        assert!(!limiter.allow_at("b", t0));
    }

    #[test]
    fn disabled_admits_everything_without_state() {
        let limiter = ClientLimiterRegistry::new(&RateLimitConfig {
            enabled: false,
            burst: 1,
            ..RateLimitConfig::default()
        });

        for _ in 0..1_000 {
            assert!(limiter.allow("client"));
        }
        assert!(limiter.is_empty());
    }

    #[test]
    fn eviction_removes_idle_clients_only() {
        let limiter = registry(2.0, 4);
        let t0 = Instant::now();
        limiter.allow_at("idle", t0);
        limiter.allow_at("busy", t0);

        let t1 = t0 + Duration::from_secs(120);
        limiter.allow_at("busy", t1);

        let t2 = t0 + Duration::from_secs(181);
        assert_eq!(limiter.evict_idle_at(t2), 1);
        assert!(!limiter.contains("idle"));
        assert!(limiter.contains("busy"));
    }

    #[test]
    fn evicted_client_gets_fresh_burst() {
        let limiter = registry(0.001, 2);
        let t0 = Instant::now();
        assert!(limiter.allow_at("client", t0));
        assert!(limiter.allow_at("client", t0));
        assert!(!limiter.allow_at("client", t0));

        let t1 = t0 + Duration::from_secs(200);
        limiter.evict_idle_at(t1);
        assert!(limiter.is_empty());

        assert!(limiter.allow_at("client", t1));
        assert!(limiter.allow_at("client", t1));
    }

    #[test]
    fn denial_refreshes_last_seen() {
        let limiter = registry(0.001, 1);
        let t0 = Instant::now();
        assert!(limiter.allow_at("client", t0));

        let t1 = t0 + Duration::from_secs(170);
        assert!(!limiter.allow_at("client", t1));

        assert_eq!(limiter.evict_idle_at(t0 + Duration::from_secs(200)), 0);
        assert!(limiter.contains("client"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_periodically() {
        let limiter = Arc::new(ClientLimiterRegistry::new(&RateLimitConfig {
            sweep_interval_secs: 60,
            idle_timeout_secs: 180,
            ..RateLimitConfig::default()
        }));
        let sweeper = limiter.spawn_sweeper();

        assert!(limiter.allow("client"));
        assert_eq!(limiter.len(), 1);

        time::sleep(Duration::from_secs(150)).await;
        assert!(limiter.contains("client"));

        // Idle past 180s, removed by the sweep at 240s.
        time::sleep(Duration::from_secs(95)).await;
        assert!(!limiter.contains("client"));

        drop(limiter);
        time::sleep(Duration::from_secs(60)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_survives_huge_interval() {
        let limiter = Arc::new(ClientLimiterRegistry::new(&RateLimitConfig {
            sweep_interval_secs: u64::MAX,
            ..RateLimitConfig::default()
        }));
        let sweeper = limiter.spawn_sweeper();

        time::sleep(Duration::from_secs(3600)).await;
        assert!(!sweeper.is_finished());

        sweeper.abort();
        let err = sweeper.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
