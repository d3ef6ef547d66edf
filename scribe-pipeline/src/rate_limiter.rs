use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Master switch; when false every request is admitted
    pub enabled: bool,
    /// Burst capacity per client identity
    pub capacity: f64,
    /// Tokens restored per second; 0 means the bucket never refills
    pub refill_rate: f64,
    /// Buckets idle longer than this are eligible for eviction
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 60.0,
            refill_rate: 1.0,
            idle_timeout: Duration::from_secs(900),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.enabled && self.capacity < 1.0 {
            return Err(PipelineError::Config(
                "rate limit capacity must be >= 1".to_string(),
            ));
        }
        if self.refill_rate < 0.0 {
            return Err(PipelineError::Config(
                "rate limit refill_rate must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(capacity: f64) -> Self {
        let now = Instant::now();
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }
}

/// Housekeeping sweep threshold; below this the map is left alone.
const EVICTION_SWEEP_THRESHOLD: usize = 10_000;

/// Token-bucket admission control keyed by client identity.
///
/// Buckets are created lazily on a client's first request and guarded by their
/// own mutex, so acquires from distinct clients never serialize on a shared
/// lock. Idle buckets are swept once the map grows past a housekeeping
/// threshold.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Admit or reject one request from `client_identity`.
    ///
    /// Refills the client's bucket from elapsed time, then spends one token.
    /// A rejection carries a retry-after hint when the refill rate permits
    /// computing one.
    pub fn try_acquire(&self, client_identity: &str) -> PipelineResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        self.sweep_idle();

        let bucket = self
            .buckets
            .entry(client_identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(self.config.capacity))))
            .clone();

        let mut bucket = bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            debug!(
                client = client_identity,
                remaining = bucket.tokens,
                "request admitted"
            );
            Ok(())
        } else {
            let retry_after = (self.config.refill_rate > 0.0).then(|| {
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.config.refill_rate)
            });
            warn!(
                client = client_identity,
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "rate limit exceeded"
            );
            Err(PipelineError::RateLimited { retry_after })
        }
    }

    /// Number of tracked client buckets (for monitoring).
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    fn sweep_idle(&self) {
        if self.buckets.len() <= EVICTION_SWEEP_THRESHOLD {
            return;
        }
        let idle_timeout = self.config.idle_timeout;
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.lock().last_seen) < idle_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: f64, refill_rate: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            capacity,
            refill_rate,
            idle_timeout: Duration::from_secs(900),
        })
    }

    #[test]
    fn test_burst_capacity_without_refill() {
        let rl = limiter(2.0, 0.0);

        assert!(rl.try_acquire("client-a").is_ok());
        assert!(rl.try_acquire("client-a").is_ok());
        // Third call inside the window is rejected
        let err = rl.try_acquire("client-a").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let rl = limiter(1.0, 50.0);

        assert!(rl.try_acquire("client-a").is_ok());
        assert!(rl.try_acquire("client-a").is_err());

        std::thread::sleep(Duration::from_millis(40));
        assert!(rl.try_acquire("client-a").is_ok());
    }

    #[test]
    fn test_distinct_clients_do_not_interfere() {
        let rl = limiter(1.0, 0.0);

        assert!(rl.try_acquire("client-a").is_ok());
        assert!(rl.try_acquire("client-a").is_err());

        // A different identity has its own bucket
        assert!(rl.try_acquire("client-b").is_ok());
        assert_eq!(rl.tracked_clients(), 2);
    }

    #[test]
    fn test_disabled_limiter_always_admits() {
        let rl = RateLimiter::new(RateLimitConfig {
            enabled: false,
            capacity: 1.0,
            refill_rate: 0.0,
            ..Default::default()
        });

        for _ in 0..100 {
            assert!(rl.try_acquire("client-a").is_ok());
        }
        assert_eq!(rl.tracked_clients(), 0);
    }

    #[test]
    fn test_retry_after_hint_present_with_refill() {
        let rl = limiter(1.0, 2.0);

        assert!(rl.try_acquire("client-a").is_ok());
        match rl.try_acquire("client-a") {
            Err(PipelineError::RateLimited {
                retry_after: Some(hint),
            }) => {
                // One token at 2 tokens/sec is about half a second away
                assert!(hint <= Duration::from_millis(600));
            }
            other => panic!("expected rate limited with hint, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_acquires_spend_exact_tokens() {
        use std::sync::Arc;

        let rl = Arc::new(limiter(50.0, 0.0));
        let admitted: u32 = (0..8)
            .map(|_| {
                let rl = Arc::clone(&rl);
                std::thread::spawn(move || {
                    let mut ok = 0u32;
                    for _ in 0..10 {
                        if rl.try_acquire("client-a").is_ok() {
                            ok += 1;
                        }
                    }
                    ok
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();

        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_config_validation() {
        let bad = RateLimitConfig {
            enabled: true,
            capacity: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let disabled = RateLimitConfig {
            enabled: false,
            capacity: 0.0,
            ..Default::default()
        };
        assert!(disabled.validate().is_ok());
    }
}
