//! Per-client request rate limiting.
//!
//! Each client (keyed by source IP) gets a continuous token bucket: tokens accumulate at
//! `rps` per second up to `burst`, and every admitted request spends one. Buckets are
//! created on first contact and evicted by a periodic sweep once a client has been silent
//! for longer than the idle timeout.
//!
//! All bucket state lives behind one mutex. Lookup, creation, refill and decrement for a
//! key happen inside a single critical section, so two concurrent requests from the same
//! client can never both spend the last token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;

/// Limiter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// When false, every request is admitted and no bucket state is kept.
    pub enabled: bool,
    /// Sustained requests per second per client.
    pub rps: f64,
    /// Bucket capacity: the largest burst a rested client may send at once.
    pub burst: u32,
    /// Buckets untouched for longer than this are dropped by [`RateLimiter::sweep`].
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            idle_timeout: Duration::from_secs(180), // 3 minutes
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    fn full(capacity: f64, now: DateTime<Utc>) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Adds the tokens earned since the last refill. A clock that went backwards earns
    /// nothing and does not move `last_refill` back.
    fn refill(&mut self, now: DateTime<Utc>, rps: f64, capacity: f64) {
        let elapsed = (now - self.last_refill)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * rps).min(capacity);
            self.last_refill = now;
        }
    }
}

/// Token-bucket admission controller shared by all request workers.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decides whether the client may make a request now, spending one token if so.
    pub fn allow(&self, client: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = self.clock.now();
        let capacity = f64::from(self.config.burst);

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(client.to_owned())
            .or_insert_with(|| Bucket::full(capacity, now));

        bucket.refill(now, self.config.rps, capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops buckets idle for longer than the configured timeout. Returns how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout;

        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            (now - bucket.last_refill)
                .to_std()
                .map(|idle| idle <= idle_timeout)
                .unwrap_or(true)
        });
        before - buckets.len()
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Starts the periodic sweep on the current tokio runtime.
    ///
    /// A single task owns the schedule, so sweeps never overlap. Abort the returned handle
    /// to stop it.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; there is nothing to sweep yet.
            ticker.tick().await;
            info!("Rate limiter sweeper started (every {:?})", every);
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(
                        "Evicted {} idle rate limit bucket(s), {} remaining",
                        removed,
                        limiter.tracked_clients()
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration as ChronoDuration;

    fn limiter(config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RateLimiter::new(config, clock.clone()), clock)
    }

    fn config(rps: f64, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            rps,
            burst,
            idle_timeout: Duration::from_secs(180),
        }
    }

    #[test]
    fn test_instant_burst_admits_exactly_capacity() {
        let (limiter, _clock) = limiter(config(2.0, 4));

        let admitted = (0..5).filter(|_| limiter.allow("10.0.0.1")).count();
        assert_eq!(admitted, 4);

        // Still empty until time passes.
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn test_refill_restores_tokens_over_time() {
        let (limiter, clock) = limiter(config(2.0, 4));
        for _ in 0..4 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));

        // Half a second at 2 rps earns exactly one token.
        clock.advance(ChronoDuration::milliseconds(500));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        // A long pause refills only up to capacity.
        clock.advance(ChronoDuration::seconds(60));
        let admitted = (0..10).filter(|_| limiter.allow("10.0.0.1")).count();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn test_steady_rate_within_limit_is_never_rejected() {
        let (limiter, clock) = limiter(config(2.0, 4));

        // Open with a full burst, then keep to the sustained rate.
        for _ in 0..4 {
            assert!(limiter.allow("10.0.0.1"));
        }
        for step in 0..200 {
            clock.advance(ChronoDuration::milliseconds(500));
            assert!(limiter.allow("10.0.0.1"), "rejected at step {}", step);
        }

        // Bursts separated by enough rest to refill are also fine.
        for _ in 0..20 {
            clock.advance(ChronoDuration::seconds(2));
            for _ in 0..4 {
                assert!(limiter.allow("10.0.0.1"));
            }
        }
    }

    #[test]
    fn test_clients_have_independent_buckets() {
        let (limiter, _clock) = limiter(config(1.0, 2));

        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_clock_moving_backwards_adds_no_tokens() {
        let (limiter, clock) = limiter(config(2.0, 1));
        assert!(limiter.allow("10.0.0.1"));

        clock.advance(ChronoDuration::seconds(-30));
        assert!(!limiter.allow("10.0.0.1"));

        // Catching up to the original instant still earns nothing.
        clock.advance(ChronoDuration::seconds(30));
        assert!(!limiter.allow("10.0.0.1"));

        clock.advance(ChronoDuration::milliseconds(500));
        assert!(limiter.allow("10.0.0.1"));
    }

    #[test]
    fn test_sweep_evicts_idle_clients_and_they_restart_full() {
        let (limiter, clock) = limiter(config(2.0, 3));

        for _ in 0..3 {
            assert!(limiter.allow("10.0.0.1"));
        }
        clock.advance(ChronoDuration::seconds(100));
        assert!(limiter.allow("10.0.0.2"));

        // 10.0.0.1 has now been idle 181s, 10.0.0.2 only 81s.
        clock.advance(ChronoDuration::seconds(81));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);

        let admitted = (0..4).filter(|_| limiter.allow("10.0.0.1")).count();
        assert_eq!(admitted, 3);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_sweep_keeps_recently_seen_clients() {
        let (limiter, clock) = limiter(config(2.0, 4));
        assert!(limiter.allow("10.0.0.1"));

        clock.advance(ChronoDuration::seconds(180));
        assert_eq!(limiter.sweep(), 0);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_disabled_limiter_keeps_no_state() {
        let (limiter, _clock) = limiter(RateLimitConfig {
            enabled: false,
            ..config(1.0, 1)
        });

        for i in 0..10_000 {
            assert!(limiter.allow(&format!("10.0.{}.{}", i / 256, i % 256)));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_concurrent_requests_never_overspend() {
        let (limiter, _clock) = limiter(config(0.5, 50));
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..25).filter(|_| limiter.allow("10.0.0.1")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_evicts_on_schedule() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig {
                idle_timeout: Duration::from_secs(5),
                ..config(2.0, 4)
            },
            clock.clone(),
        ));
        assert!(limiter.allow("10.0.0.1"));

        let sweeper = limiter.spawn_sweeper(Duration::from_secs(60));
        clock.advance(ChronoDuration::seconds(10));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        sweeper.abort();
    }
}
